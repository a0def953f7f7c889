//! Fixed-point decimal codec for satoshi amounts, transcribed from `utilmoneystr.cpp`'s literal
//! trim/parse loops rather than a "cleaner" reimplementation, since the trim loop's behavior
//! (never emitting a bare `"1."`) depends on its exact guard.

pub const COIN_SATOSHIS: i64 = 100_000_000;
const CENT_SATOSHIS: i64 = COIN_SATOSHIS / 100;

pub fn format_money(amount: i64) -> String {
    let n_abs = if amount < 0 { -amount } else { amount };
    let quotient = n_abs / COIN_SATOSHIS;
    let remainder = n_abs % COIN_SATOSHIS;
    let mut s = format!("{}.{:08}", quotient, remainder);

    let bytes = s.as_bytes();
    let mut i = bytes.len() as i64 - 1;
    let mut trim = 0usize;
    while i >= 2 && bytes[i as usize] == b'0' && bytes[(i - 2) as usize].is_ascii_digit() {
        trim += 1;
        i -= 1;
    }
    if trim > 0 {
        let new_len = s.len() - trim;
        s.truncate(new_len);
    }

    if amount < 0 {
        s.insert(0, '-');
    }
    s
}

/// Leading whitespace is skipped; trailing whitespace is allowed; anything else out of grammar
/// (a stray sign, extra dots, non-digit) rejects. Rejects more than 10 whole digits (63-bit
/// overflow guard) or a fractional part exceeding `COIN_SATOSHIS`.
pub fn parse_money(input: &str) -> Option<i64> {
    let bytes = input.as_bytes();
    let mut p = 0usize;
    while p < bytes.len() && (bytes[p] as char).is_whitespace() {
        p += 1;
    }

    let mut whole = String::new();
    let mut units: i64 = 0;

    while p < bytes.len() {
        let c = bytes[p] as char;
        if c == '.' {
            p += 1;
            let mut mult: i64 = 10 * CENT_SATOSHIS;
            while p < bytes.len() && (bytes[p] as char).is_ascii_digit() && mult > 0 {
                units += mult * (bytes[p] - b'0') as i64;
                p += 1;
                mult /= 10;
            }
            break;
        }
        if c.is_whitespace() {
            break;
        }
        if !c.is_ascii_digit() {
            return None;
        }
        whole.push(c);
        p += 1;
    }

    while p < bytes.len() {
        if !(bytes[p] as char).is_whitespace() {
            return None;
        }
        p += 1;
    }

    if whole.len() > 10 {
        return None;
    }
    if units < 0 || units > COIN_SATOSHIS {
        return None;
    }

    let whole_val: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    Some(whole_val * COIN_SATOSHIS + units)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn format_parse_roundtrips_for_any_valid_amount(amount in 0i64..=9_999_999_999 * COIN_SATOSHIS) {
            let formatted = format_money(amount);
            prop_assert_eq!(parse_money(&formatted), Some(amount));
        }
    }
}
