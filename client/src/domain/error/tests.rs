//! Tests for domain error construction and gateway error mapping.

use super::*;
use rstest::{fixture, rstest};
use serde_json::json;

#[fixture]
fn rejected_insert() -> GatewayError {
    GatewayError::backend("23503", "insert or update on table \"rides\" violates foreign key")
}

#[rstest]
fn invalid_request_constructor_sets_code() {
    let err = Error::invalid_request("bad");
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
}

#[rstest]
fn try_new_rejects_empty_messages() {
    let result = Error::try_new(ErrorCode::InvalidRequest, "   ");
    assert!(matches!(result, Err(ErrorValidationError::EmptyMessage)));
}

#[rstest]
fn new_substitutes_a_readable_message_for_blank_input() {
    let err = Error::new(ErrorCode::ServiceUnavailable, "");
    assert_eq!(err.message(), "backend unavailable");
}

#[rstest]
fn backend_rejections_keep_the_gateway_message_and_code(rejected_insert: GatewayError) {
    let err = Error::from(rejected_insert);

    assert_eq!(err.code(), ErrorCode::GatewayRejected);
    assert_eq!(
        err.message(),
        "insert or update on table \"rides\" violates foreign key"
    );
    assert_eq!(err.details(), Some(&json!({ "gatewayCode": "23503" })));
}

#[rstest]
#[case::transport(GatewayError::transport("connection reset"), ErrorCode::ServiceUnavailable)]
#[case::timeout(GatewayError::timeout("deadline elapsed"), ErrorCode::ServiceUnavailable)]
#[case::decode(GatewayError::decode("missing field `date`"), ErrorCode::InternalError)]
fn gateway_failures_map_to_expected_codes(#[case] source: GatewayError, #[case] expected: ErrorCode) {
    assert_eq!(Error::from(source).code(), expected);
}

#[rstest]
fn serialises_with_camel_case_and_omits_missing_details() {
    let value = serde_json::to_value(Error::profile_incomplete("add your name")).expect("serialise");
    assert_eq!(
        value,
        json!({ "code": "profile_incomplete", "message": "add your name" })
    );
}
