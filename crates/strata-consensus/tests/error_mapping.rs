use strata_consensus::{ConsensusError, ErrorCode};

#[test]
fn error_code_as_str_covers_all_variants() {
    // Intentionally list every variant: this keeps ErrorCode::as_str() coverage high and
    // guards against accidental renames/typos.
    let cases: &[(ErrorCode, &str)] = &[
        (ErrorCode::ParseTruncated, "PARSE_TRUNCATED"),
        (ErrorCode::ParseOverlong, "PARSE_OVERLONG"),
        (ErrorCode::ParseNonMinimal, "PARSE_NON_MINIMAL"),
        (
            ErrorCode::ParseUnsupportedScriptType,
            "PARSE_UNSUPPORTED_SCRIPT_TYPE",
        ),
        (ErrorCode::BackendWriteFailed, "BACKEND_WRITE_FAILED"),
    ];

    for (code, want) in cases {
        assert_eq!(code.as_str(), *want);
    }
}

#[test]
fn consensus_error_display() {
    let e = ConsensusError::new(ErrorCode::ParseTruncated, "");
    assert_eq!(e.to_string(), "PARSE_TRUNCATED");
    let e2 = ConsensusError::new(ErrorCode::ParseTruncated, "bad");
    assert_eq!(e2.to_string(), "PARSE_TRUNCATED: bad");
}
