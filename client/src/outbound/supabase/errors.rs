//! Mapping of reqwest failures and error responses onto gateway errors.

use reqwest::StatusCode;

use super::dto::{AuthErrorDto, PostgrestErrorDto};
use crate::domain::ports::GatewayError;

pub(super) fn map_transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::timeout(error.to_string())
    } else if error.is_decode() {
        GatewayError::decode(error.to_string())
    } else {
        GatewayError::transport(error.to_string())
    }
}

/// Error response from the row API.
///
/// Structured bodies keep the backend code so callers can recognise the
/// "no rows" signal and constraint failures.
pub(super) fn map_rest_status(status: StatusCode, body: &[u8]) -> GatewayError {
    if let Ok(dto) = serde_json::from_slice::<PostgrestErrorDto>(body) {
        let code = dto.code.unwrap_or_else(|| status_code(status));
        return GatewayError::backend(code, dto.message);
    }
    map_unstructured_status(status, body)
}

/// Error response from the auth API.
pub(super) fn map_auth_status(status: StatusCode, body: &[u8]) -> GatewayError {
    let dto = serde_json::from_slice::<AuthErrorDto>(body).unwrap_or_default();
    match dto.message() {
        Some(message) => GatewayError::backend(
            dto.code().map_or_else(|| status_code(status), str::to_owned),
            message,
        ),
        None => map_unstructured_status(status, body),
    }
}

fn map_unstructured_status(status: StatusCode, body: &[u8]) -> GatewayError {
    let body_preview = body_preview(body);
    let message = if body_preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {}", status.as_u16(), body_preview)
    };

    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => GatewayError::timeout(message),
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => {
            GatewayError::transport(message)
        }
        _ => GatewayError::backend(status_code(status), message),
    }
}

fn status_code(status: StatusCode) -> String {
    format!("HTTP{}", status.as_u16())
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    //! Coverage for the non-network error mapping helpers.

    use super::*;
    use rstest::rstest;

    #[rstest]
    fn structured_rest_errors_keep_the_backend_code() {
        let body = br#"{"code":"PGRST116","details":"The result contains 0 rows","hint":null,"message":"JSON object requested, multiple (or no) rows returned"}"#;

        let error = map_rest_status(StatusCode::NOT_ACCEPTABLE, body);

        assert!(error.is_no_rows());
        assert_eq!(
            error.to_string(),
            "JSON object requested, multiple (or no) rows returned"
        );
    }

    #[rstest]
    fn structured_rest_errors_without_code_use_the_status() {
        let error = map_rest_status(StatusCode::FORBIDDEN, br#"{"message":"denied"}"#);
        assert!(matches!(
            error,
            GatewayError::Backend { ref code, ref message } if code == "HTTP403" && message == "denied"
        ));
    }

    #[rstest]
    #[case::request_timeout(StatusCode::REQUEST_TIMEOUT, "Timeout")]
    #[case::gateway_timeout(StatusCode::GATEWAY_TIMEOUT, "Timeout")]
    #[case::bad_gateway(StatusCode::BAD_GATEWAY, "Transport")]
    #[case::unavailable(StatusCode::SERVICE_UNAVAILABLE, "Transport")]
    #[case::server_error(StatusCode::INTERNAL_SERVER_ERROR, "Backend")]
    #[case::bad_request(StatusCode::BAD_REQUEST, "Backend")]
    fn maps_unstructured_statuses(#[case] status: StatusCode, #[case] expected: &str) {
        let error = map_rest_status(status, b"<html>upstream unavailable</html>");
        let matched = match expected {
            "Timeout" => matches!(error, GatewayError::Timeout { .. }),
            "Transport" => matches!(error, GatewayError::Transport { .. }),
            "Backend" => matches!(error, GatewayError::Backend { .. }),
            _ => panic!("unsupported test expectation: {expected}"),
        };
        assert!(matched, "{status} should map to {expected}, got {error:?}");
    }

    #[rstest]
    fn auth_errors_read_either_message_field() {
        let legacy = map_auth_status(
            StatusCode::BAD_REQUEST,
            br#"{"error":"invalid_grant","error_description":"Invalid ID token"}"#,
        );
        assert!(matches!(
            legacy,
            GatewayError::Backend { ref code, ref message }
                if code == "invalid_grant" && message == "Invalid ID token"
        ));

        let current = map_auth_status(
            StatusCode::BAD_REQUEST,
            br#"{"code":400,"error_code":"bad_jwt","msg":"invalid JWT"}"#,
        );
        assert!(matches!(
            current,
            GatewayError::Backend { ref code, ref message }
                if code == "bad_jwt" && message == "invalid JWT"
        ));
    }

    #[rstest]
    fn long_bodies_are_truncated_in_previews() {
        let body = "x ".repeat(200);
        let preview = body_preview(body.as_bytes());
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 163);
    }
}
