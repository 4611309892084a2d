use std::path::PathBuf;

use rota::error::{exit_codes, Error, ErrorKind, JsonError};

#[test]
fn exit_codes_map_correctly() {
    let user = Error::Validation("bad".to_string());
    assert_eq!(user.exit_code(), exit_codes::USER_ERROR);

    let missing = Error::not_found("template", "abc");
    assert_eq!(missing.exit_code(), exit_codes::USER_ERROR);

    let blocked = Error::Authorization("nope".to_string());
    assert_eq!(blocked.exit_code(), exit_codes::BLOCKED);

    let lock = Error::LockFailed(PathBuf::from(".rota/ledger.lock"));
    assert_eq!(lock.exit_code(), exit_codes::OPERATION_FAILED);
    assert!(lock.is_retryable());
    assert!(!blocked.is_retryable());
}

#[test]
fn json_error_carries_details() {
    let err = Error::Ineligible {
        template: "Autoclave".to_string(),
        period: "2024-04".to_string(),
        required: 2,
        available: 1,
    };
    let json = JsonError::from(&err);
    assert_eq!(json.code, exit_codes::BLOCKED);
    assert_eq!(json.kind, ErrorKind::Ineligibility);
    assert!(json.error.contains("need 2, found 1"));
    let details = json.details.expect("details");
    assert_eq!(details["available"], 1);
}

#[test]
fn not_found_names_the_kind() {
    let err = Error::not_found("request", "deadbeef");
    assert_eq!(err.to_string(), "request not found: deadbeef");
    let json = serde_json::to_value(JsonError::from(&err)).expect("serialize");
    assert_eq!(json["kind"], "not_found");
    assert_eq!(json["details"]["kind"], "request");
}
