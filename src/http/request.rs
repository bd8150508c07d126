//! Request parsing helpers and per-request middleware.

use std::collections::HashMap;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::{HeaderMap, HeaderName, StatusCode},
    middleware::Next,
    response::Response,
};
use serde::de::DeserializeOwned;
use serde_json::error::Category;

use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::models::Validator;
use crate::observability::metrics;

/// Correlation header set on every request and echoed on the response.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Version the client last read, for conditional writes.
pub const X_EXPECTED_VERSION: HeaderName = HeaderName::from_static("x-expected-version");

/// JSON body extractor with client-readable error messages and strict
/// field checking.
pub struct JsonBody<T>(pub T);

impl<T> FromRequest<AppState> for JsonBody<T>
where
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let limit = state.config.limits.max_body_bytes;
        let bytes = Bytes::from_request(req, state).await.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ApiError::PayloadTooLarge(limit)
            } else {
                ApiError::BadRequest(rejection.body_text())
            }
        })?;
        decode_json(&bytes).map(JsonBody)
    }
}

/// Decode a single JSON value, translating serde errors into messages.
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest("body must not be empty".into()));
    }

    serde_json::from_slice(bytes).map_err(|err| {
        let message = err.to_string();
        let text = match err.classify() {
            Category::Syntax if message.starts_with("trailing characters") => {
                "body must contain a single JSON value".to_string()
            }
            Category::Syntax => format!(
                "body contains badly-formed JSON (at line {} column {})",
                err.line(),
                err.column()
            ),
            Category::Eof => "body contains badly-formed JSON".to_string(),
            Category::Data => match unknown_field(&message) {
                Some(field) => format!("body contains unknown key \"{field}\""),
                None => format!(
                    "body contains incorrect JSON value: {}",
                    strip_position(&message)
                ),
            },
            Category::Io => message,
        };
        ApiError::BadRequest(text)
    })
}

fn unknown_field(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("unknown field `")?;
    rest.split('`').next()
}

fn strip_position(message: &str) -> &str {
    message
        .rfind(" at line ")
        .map_or(message, |index| &message[..index])
}

/// Parse a path id. Anything that is not a positive integer is treated as a
/// missing resource.
pub fn parse_id(raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ApiError::NotFound),
    }
}

/// The optional `X-Expected-Version` header.
pub fn expected_version(headers: &HeaderMap) -> Result<Option<i32>, ApiError> {
    let Some(value) = headers.get(&X_EXPECTED_VERSION) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<i32>().ok())
        .filter(|version| *version >= 1)
        .map(Some)
        .ok_or_else(|| ApiError::BadRequest("X-Expected-Version header must be a positive integer".into()))
}

pub fn read_string(params: &HashMap<String, String>, key: &str, default: &str) -> String {
    match params.get(key) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => default.to_string(),
    }
}

pub fn read_csv(params: &HashMap<String, String>, key: &str) -> Vec<String> {
    match params.get(key) {
        Some(value) if !value.is_empty() => value.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

pub fn read_int(params: &HashMap<String, String>, key: &str, default: i64, v: &mut Validator) -> i64 {
    match params.get(key) {
        Some(value) if !value.is_empty() => value.parse().unwrap_or_else(|_| {
            v.add_error(key, "must be an integer value");
            default
        }),
        _ => default,
    }
}

/// Record request count and latency.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let response = next.run(request).await;
    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Input {
        #[allow(dead_code)]
        title: String,
    }

    fn message(result: Result<Input, ApiError>) -> String {
        match result {
            Err(ApiError::BadRequest(message)) => message,
            other => panic!("expected bad request, got {other:?}"),
        }
    }

    #[test]
    fn json_error_messages() {
        assert_eq!(message(decode_json(b"")), "body must not be empty");
        assert_eq!(message(decode_json(b"{\"title\": ")), "body contains badly-formed JSON");
        assert_eq!(
            message(decode_json(b"{\"title\": \"a\", \"rating\": 5}")),
            "body contains unknown key \"rating\""
        );
        assert_eq!(
            message(decode_json(b"{\"title\": \"a\"} {\"title\": \"b\"}")),
            "body must contain a single JSON value"
        );
        assert!(message(decode_json(b"{\"title\": 5}")).starts_with("body contains incorrect JSON value"));
        assert!(message(decode_json(b"{title}")).starts_with("body contains badly-formed JSON (at line 1"));
    }

    #[test]
    fn ids_must_be_positive() {
        assert_eq!(parse_id("42").unwrap(), 42);
        for bad in ["0", "-1", "abc", ""] {
            assert!(matches!(parse_id(bad), Err(ApiError::NotFound)));
        }
    }

    #[test]
    fn expected_version_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(expected_version(&headers).unwrap(), None);

        headers.insert(&X_EXPECTED_VERSION, HeaderValue::from_static("3"));
        assert_eq!(expected_version(&headers).unwrap(), Some(3));

        headers.insert(&X_EXPECTED_VERSION, HeaderValue::from_static("zero"));
        assert!(matches!(expected_version(&headers), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn query_readers() {
        let params: HashMap<String, String> = [
            ("genres".to_string(), "drama,comedy".to_string()),
            ("page".to_string(), "two".to_string()),
        ]
        .into_iter()
        .collect();

        let mut v = Validator::new();
        assert_eq!(read_csv(&params, "genres"), vec!["drama", "comedy"]);
        assert_eq!(read_string(&params, "sort", "id"), "id");
        assert_eq!(read_int(&params, "page", 1, &mut v), 1);
        assert_eq!(v.errors()["page"], "must be an integer value");
    }
}
