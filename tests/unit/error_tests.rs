use dropgate::AppError;

#[test]
fn display_prefixes_identify_the_domain() {
    assert_eq!(
        AppError::Validation("bad path".into()).to_string(),
        "validation: bad path"
    );
    assert_eq!(
        AppError::Expired("acme".into()).to_string(),
        "expired: acme"
    );
    assert_eq!(
        AppError::TransferAborted("451".into()).to_string(),
        "transfer aborted: 451"
    );
    assert_eq!(AppError::MissingChunk(4).to_string(), "missing chunk 4");
}

#[test]
fn incomplete_upload_reports_counts() {
    let err = AppError::IncompleteUpload {
        received: 3,
        expected: 5,
    };
    assert_eq!(err.to_string(), "incomplete upload: 3 of 5 chunks received");
}

#[test]
fn integrity_failure_reports_both_sides() {
    let err = AppError::IntegrityFailure {
        local_checksum: "aaa".into(),
        remote_checksum: "bbb".into(),
        local_size: 10,
        remote_size: 9,
    };
    let message = err.to_string();
    assert!(message.contains("aaa"));
    assert!(message.contains("bbb"));
    assert!(message.contains("10 bytes"));
    assert!(message.contains("9 bytes"));
}

#[test]
fn io_errors_convert_with_context() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(_)));
    assert!(err.to_string().contains("gone"));
}

#[test]
fn toml_errors_convert_to_config() {
    let parse_err = toml::from_str::<toml::Value>("not = = valid").unwrap_err();
    let err: AppError = parse_err.into();
    assert!(matches!(err, AppError::Config(_)));
}
