use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    /// Byte stream ended before the expected field was fully read.
    ParseTruncated,
    /// A length-prefixed field (e.g. a coin's script) declared more bytes than the stream holds.
    ParseOverlong,
    /// A CompactSize/varint was encoded using more bytes than its value requires.
    ParseNonMinimal,
    /// A compressed-script special type tag this crate does not reconstruct (pubkey templates).
    ParseUnsupportedScriptType,
    /// The backing view reported a failed `batch_write`.
    BackendWriteFailed,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ParseTruncated => "PARSE_TRUNCATED",
            ErrorCode::ParseOverlong => "PARSE_OVERLONG",
            ErrorCode::ParseNonMinimal => "PARSE_NON_MINIMAL",
            ErrorCode::ParseUnsupportedScriptType => "PARSE_UNSUPPORTED_SCRIPT_TYPE",
            ErrorCode::BackendWriteFailed => "BACKEND_WRITE_FAILED",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusError {
    pub code: ErrorCode,
    pub msg: &'static str,
}

impl ConsensusError {
    pub fn new(code: ErrorCode, msg: &'static str) -> Self {
        Self { code, msg }
    }
}

impl fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.msg.is_empty() {
            write!(f, "{}", self.code.as_str())
        } else {
            write!(f, "{}: {}", self.code.as_str(), self.msg)
        }
    }
}

impl std::error::Error for ConsensusError {}
