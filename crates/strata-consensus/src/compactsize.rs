use crate::error::{ConsensusError, ErrorCode};
use crate::wire_read::Reader;

pub fn read_compact_size(r: &mut Reader<'_>) -> Result<(u64, usize), ConsensusError> {
    let start = r.offset();
    let tag = r.read_u8()?;

    let (v, minimal_ok) = match tag {
        0x00..=0xfc => (tag as u64, true),
        0xfd => {
            let v = r.read_u16_le()? as u64;
            (v, v >= 0xfd)
        }
        0xfe => {
            let v = r.read_u32_le()? as u64;
            (v, v > 0xffff)
        }
        0xff => {
            let v = r.read_u64_le()?;
            (v, v > 0xffff_ffff)
        }
    };

    if !minimal_ok {
        return Err(ConsensusError::new(
            ErrorCode::ParseNonMinimal,
            "non-minimal CompactSize",
        ));
    }

    Ok((v, r.offset() - start))
}

pub fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        out.push(n as u8);
    } else if n <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&n.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_boundaries() {
        for n in [0u64, 1, 0xfc, 0xfd, 0xffff, 0x1_0000, 0xffff_ffff, 0x1_0000_0000, u64::MAX] {
            let mut buf = Vec::new();
            write_compact_size(&mut buf, n);
            let mut r = Reader::new(&buf);
            let (decoded, used) = read_compact_size(&mut r).unwrap();
            assert_eq!(decoded, n);
            assert_eq!(used, buf.len());
        }
    }

    #[test]
    fn rejects_non_minimal() {
        assert!(read_compact_size(&mut Reader::new(&[0xfd, 0x01, 0x00])).is_err());
        assert!(read_compact_size(&mut Reader::new(&[0xfe, 0xff, 0x00, 0x00, 0x00])).is_err());
        assert!(read_compact_size(&mut Reader::new(&[
            0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00
        ]))
        .is_err());
    }
}
