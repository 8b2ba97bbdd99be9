use reqwest::StatusCode;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;

/// The uniform result of every client operation.
///
/// Non-2xx statuses are reported here with `ok == false` rather than as errors.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// True iff `status` is in the 2xx range.
    pub ok: bool,
    pub status: StatusCode,
    /// JSON payload for JSON content types, text for anything else,
    /// `Value::Null` when the body is empty or cannot be decoded.
    pub data: Value,
    pub headers: HeaderMap,
}

impl ApiResponse {
    /// Reads the whole body of `response`. Failing to read it is a transport
    /// error; failing to decode it is not.
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.bytes().await?;
        let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());

        Ok(ApiResponse {
            ok: status.is_success(),
            status,
            data: decode_payload(status, content_type, &bytes),
            headers,
        })
    }

    /// 401 or 422: the API's way of saying the session is missing or expired.
    pub fn is_auth_failure(&self) -> bool {
        is_auth_failure(self.status)
    }

    /// Deserializes the payload into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

pub(crate) fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::UNPROCESSABLE_ENTITY
}

fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

pub(crate) fn decode_payload(status: StatusCode, content_type: Option<&str>, body: &[u8]) -> Value {
    if status == StatusCode::NO_CONTENT || body.is_empty() {
        return Value::Null;
    }
    match content_type {
        Some(ct) if is_json_content_type(ct) => serde_json::from_slice(body).unwrap_or(Value::Null),
        _ => Value::String(String::from_utf8_lossy(body).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn no_content_is_null() {
        assert_eq!(
            decode_payload(StatusCode::NO_CONTENT, Some("application/json"), b""),
            Value::Null
        );
        assert_eq!(decode_payload(StatusCode::OK, None, b""), Value::Null);
    }

    #[test]
    fn json_with_charset_is_decoded() {
        let data = decode_payload(
            StatusCode::OK,
            Some("application/json; charset=utf-8"),
            br#"{"leads": 12}"#,
        );
        assert_eq!(data, json!({"leads": 12}));
    }

    #[test]
    fn vendor_json_is_decoded() {
        let data = decode_payload(
            StatusCode::OK,
            Some("application/problem+json"),
            br#"{"detail": "bad thread"}"#,
        );
        assert_eq!(data["detail"], "bad thread");
    }

    #[test]
    fn malformed_json_degrades_to_null() {
        let data = decode_payload(StatusCode::BAD_GATEWAY, Some("application/json"), b"<html>");
        assert_eq!(data, Value::Null);
    }

    #[test]
    fn other_content_types_are_text() {
        let data = decode_payload(StatusCode::OK, Some("text/csv"), b"id,status\n1,new\n");
        assert_eq!(data, Value::String("id,status\n1,new\n".to_string()));
    }

    #[test]
    fn auth_failure_statuses() {
        assert!(is_auth_failure(StatusCode::UNAUTHORIZED));
        assert!(is_auth_failure(StatusCode::UNPROCESSABLE_ENTITY));
        assert!(!is_auth_failure(StatusCode::FORBIDDEN));
        assert!(!is_auth_failure(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn typed_payload() {
        #[derive(Deserialize)]
        struct Thread {
            id: u64,
            name: String,
        }
        let response = ApiResponse {
            ok: true,
            status: StatusCode::OK,
            data: json!({"id": 7, "name": "Avito / Moscow"}),
            headers: HeaderMap::new(),
        };
        let thread: Thread = response.json().unwrap();
        assert_eq!(thread.id, 7);
        assert_eq!(thread.name, "Avito / Moscow");
    }
}
