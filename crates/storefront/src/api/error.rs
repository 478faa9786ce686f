//! Normalization of BookSwap API errors.
//!
//! Different API endpoints report failures in different shapes. Everything is
//! folded into one [`ApiError`] record `{message, errors?, status?}`:
//!
//! | Body | Result |
//! |---|---|
//! | `{"message": "..."}` | `message` |
//! | `{"detail": "..."}` | `message` |
//! | `{"detail": [{"loc": [.., "title"], "msg": "..."}]}` | `errors.title` |
//! | `{"error": "..."}` / `{"error": {"message": "..."}}` | `message` |
//! | `{"errors": {"title": ["..."]}}` / `{"errors": {"title": "..."}}` | `errors` |
//! | `{"non_field_errors": ["..."]}` | `message` |
//! | `{"title": ["..."], "price": ["..."]}` | `errors` |
//! | plain text | `message` (if short and not HTML) |
//!
//! Transport failures (connect, timeout) have no status.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Field name → messages.
pub type FieldMessages = BTreeMap<String, Vec<String>>;

/// Keys that carry a message rather than a field error.
const MESSAGE_KEYS: &[&str] = &[
    "message",
    "detail",
    "error",
    "errors",
    "non_field_errors",
    "status",
    "status_code",
    "code",
    "success",
];

/// Longest plain-text body used verbatim as a message.
const MAX_TEXT_MESSAGE_LEN: usize = 200;

/// Coarse classification of an API failure by HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 401 - token missing, expired or revoked.
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 422, or 400 with field errors.
    Validation,
    /// 5xx
    Server,
    /// No response (connect failure, timeout).
    Network,
    /// The storefront failed on its own side (bad request path, client setup).
    Internal,
    /// Any other status.
    Other,
}

impl ErrorKind {
    /// Default user-facing message for this kind.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::Unauthorized => "Please sign in again",
            Self::Forbidden => "You don't have permission to do that",
            Self::NotFound => "Not found",
            Self::Validation => "Please correct the highlighted fields",
            Self::Server => "The book service is having trouble, please try again shortly",
            Self::Network => "Could not reach the book service",
            Self::Internal => "Something went wrong on our side, please try again",
            Self::Other => "Something went wrong",
        }
    }
}

/// Normalized API error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApiError {
    /// Human-readable message.
    pub message: String,
    /// Per-field validation messages, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldMessages>,
    /// HTTP status, `None` for transport failures and local errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Raised by the storefront itself rather than by talking to the API.
    #[serde(skip)]
    pub local: bool,
}

impl ApiError {
    /// Error for a request that never produced a response.
    #[must_use]
    pub fn network(err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "The book service took too long to respond".to_string()
        } else {
            ErrorKind::Network.default_message().to_string()
        };
        Self {
            message,
            errors: None,
            status: None,
            local: false,
        }
    }

    /// Error raised locally before or after talking to the API (bad URL,
    /// unparseable success body).
    #[must_use]
    pub fn local(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errors: None,
            status: None,
            local: true,
        }
    }

    /// Normalize a non-success response body.
    #[must_use]
    pub fn from_response(status: u16, body: &str) -> Self {
        let trimmed = body.trim();
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => normalize(Some(status), &value),
            Err(_) => {
                let message = (!trimmed.is_empty()
                    && !trimmed.starts_with('<')
                    && trimmed.chars().count() <= MAX_TEXT_MESSAGE_LEN)
                    .then(|| trimmed.to_string());
                finish(Some(status), message, None)
            }
        }
    }

    /// Classification by status.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self.status {
            None if self.local => ErrorKind::Internal,
            None => ErrorKind::Network,
            Some(401) => ErrorKind::Unauthorized,
            Some(403) => ErrorKind::Forbidden,
            Some(404) => ErrorKind::NotFound,
            Some(422) => ErrorKind::Validation,
            Some(400) if self.errors.is_some() => ErrorKind::Validation,
            Some(500..=599) => ErrorKind::Server,
            Some(_) => ErrorKind::Other,
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.kind() == ErrorKind::Unauthorized
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Message suitable for showing to the visitor.
    ///
    /// Validation and uncategorised errors carry the API's own wording; the
    /// other kinds use fixed strings so backend internals never leak.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::Other if !self.message.is_empty() => {
                self.message.clone()
            }
            kind => kind.default_message().to_string(),
        }
    }

    /// First message for each field, for rendering next to form inputs.
    #[must_use]
    pub fn first_field_errors(&self) -> BTreeMap<String, String> {
        self.errors
            .iter()
            .flatten()
            .filter_map(|(field, messages)| {
                messages.first().map(|m| (field.clone(), m.clone()))
            })
            .collect()
    }
}

/// Normalize any JSON error body.
#[must_use]
pub fn normalize(status: Option<u16>, body: &Value) -> ApiError {
    match body {
        Value::Object(map) => normalize_object(status, map),
        Value::String(s) => finish(status, non_empty(s), None),
        Value::Array(items) => {
            let messages = strings(body);
            if messages.is_empty() {
                let errors = detail_errors(items);
                finish(status, None, errors)
            } else {
                finish(status, Some(messages.join(" ")), None)
            }
        }
        _ => finish(status, None, None),
    }
}

fn normalize_object(status: Option<u16>, map: &Map<String, Value>) -> ApiError {
    let mut errors: FieldMessages = BTreeMap::new();

    // `errors` may hold a field map, a list, or a single string.
    let mut errors_message = None;
    match map.get("errors") {
        Some(Value::Object(fields)) => collect_fields(fields, &mut errors),
        Some(other @ (Value::Array(_) | Value::String(_))) => {
            let list = strings(other);
            errors_message = list.first().cloned();
        }
        _ => {}
    }

    // FastAPI-style `detail: [{loc, msg}]`.
    if let Some(Value::Array(items)) = map.get("detail")
        && let Some(detail) = detail_errors(items)
    {
        errors.extend(detail);
    }

    // DRF-style flat field map: every non-message key holds strings.
    let field_like: Vec<(&String, &Value)> = map
        .iter()
        .filter(|(key, _)| !MESSAGE_KEYS.contains(&key.as_str()))
        .collect();
    if !field_like.is_empty()
        && field_like
            .iter()
            .all(|(_, v)| matches!(v, Value::String(_) | Value::Array(_)) && !strings(v).is_empty())
    {
        for (field, value) in field_like {
            errors.insert(field.clone(), strings(value));
        }
    }

    let message = map
        .get("message")
        .and_then(Value::as_str)
        .and_then(non_empty)
        .or_else(|| map.get("detail").and_then(Value::as_str).and_then(non_empty))
        .or_else(|| match map.get("error") {
            Some(Value::String(s)) => non_empty(s),
            Some(Value::Object(inner)) => inner
                .get("message")
                .and_then(Value::as_str)
                .and_then(non_empty),
            _ => None,
        })
        .or_else(|| {
            map.get("non_field_errors")
                .map(strings)
                .and_then(|list| list.into_iter().next())
        })
        .or(errors_message);

    finish(status, message, (!errors.is_empty()).then_some(errors))
}

fn collect_fields(fields: &Map<String, Value>, into: &mut FieldMessages) {
    for (field, value) in fields {
        let messages = strings(value);
        if !messages.is_empty() {
            into.insert(field.clone(), messages);
        }
    }
}

/// `[{"loc": ["body", "price"], "msg": "..."}]` → `{"price": ["..."]}`.
fn detail_errors(items: &[Value]) -> Option<FieldMessages> {
    let mut out: FieldMessages = BTreeMap::new();
    for item in items {
        let Some(msg) = item.get("msg").and_then(Value::as_str) else {
            continue;
        };
        let field = item
            .get("loc")
            .and_then(Value::as_array)
            .and_then(|loc| loc.last())
            .and_then(Value::as_str)
            .unwrap_or("detail");
        out.entry(field.to_string()).or_default().push(msg.to_string());
    }
    (!out.is_empty()).then_some(out)
}

/// Strings held by a string or an array of strings.
fn strings(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => non_empty(s).into_iter().collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(non_empty)
            .collect(),
        _ => Vec::new(),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn finish(status: Option<u16>, message: Option<String>, errors: Option<FieldMessages>) -> ApiError {
    let mut error = ApiError {
        message: String::new(),
        errors,
        status,
        local: false,
    };
    error.message = message.unwrap_or_else(|| error.kind().default_message().to_string());
    error
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_message_key() {
        let err = ApiError::from_response(400, r#"{"message": "Book is no longer available"}"#);
        assert_eq!(err.message, "Book is no longer available");
        assert_eq!(err.status, Some(400));
        assert!(err.errors.is_none());
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(err.user_message(), "Book is no longer available");
    }

    #[test]
    fn test_detail_string() {
        let err = ApiError::from_response(401, r#"{"detail": "Token has expired"}"#);
        assert_eq!(err.message, "Token has expired");
        assert!(err.is_unauthorized());
        assert_eq!(err.user_message(), "Please sign in again");
    }

    #[test]
    fn test_error_string_and_object() {
        let err = normalize(Some(402), &json!({"error": "Card declined"}));
        assert_eq!(err.message, "Card declined");

        let err = normalize(Some(402), &json!({"error": {"message": "Insufficient funds", "code": "card_error"}}));
        assert_eq!(err.message, "Insufficient funds");
    }

    #[test]
    fn test_errors_field_map() {
        let err = normalize(
            Some(422),
            &json!({"message": "The given data was invalid.", "errors": {"title": ["Title is required"], "price": "Must be positive"}}),
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.message, "The given data was invalid.");
        let fields = err.first_field_errors();
        assert_eq!(fields.get("title").unwrap(), "Title is required");
        assert_eq!(fields.get("price").unwrap(), "Must be positive");
    }

    #[test]
    fn test_flat_field_map() {
        let err = normalize(Some(400), &json!({"email": ["This email is already registered."]}));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.errors.unwrap().get("email").unwrap(),
            &vec!["This email is already registered.".to_string()]
        );
        assert_eq!(err.message, ErrorKind::Validation.default_message());
    }

    #[test]
    fn test_non_field_errors() {
        let err = normalize(Some(400), &json!({"non_field_errors": ["Unable to log in with provided credentials."]}));
        assert_eq!(err.message, "Unable to log in with provided credentials.");
        assert!(err.errors.is_none());
    }

    #[test]
    fn test_detail_list() {
        let err = normalize(
            Some(422),
            &json!({"detail": [{"loc": ["body", "isbn"], "msg": "invalid isbn", "type": "value_error"}]}),
        );
        assert_eq!(err.first_field_errors().get("isbn").unwrap(), "invalid isbn");
    }

    #[test]
    fn test_mixed_object_is_not_a_field_map() {
        let err = normalize(Some(400), &json!({"message": "Bad", "trace_id": 42}));
        assert_eq!(err.message, "Bad");
        assert!(err.errors.is_none());
    }

    #[test]
    fn test_plain_text_and_html_bodies() {
        let err = ApiError::from_response(503, "upstream unavailable");
        assert_eq!(err.message, "upstream unavailable");
        assert_eq!(err.user_message(), ErrorKind::Server.default_message());

        let err = ApiError::from_response(502, "<html><body>Bad Gateway</body></html>");
        assert_eq!(err.message, ErrorKind::Server.default_message());

        let err = ApiError::from_response(404, "");
        assert_eq!(err.message, "Not found");
    }

    #[test]
    fn test_kind_by_status() {
        let kind = |status| ApiError::from_response(status, "{}").kind();
        assert_eq!(kind(401), ErrorKind::Unauthorized);
        assert_eq!(kind(403), ErrorKind::Forbidden);
        assert_eq!(kind(404), ErrorKind::NotFound);
        assert_eq!(kind(422), ErrorKind::Validation);
        assert_eq!(kind(400), ErrorKind::Other);
        assert_eq!(kind(500), ErrorKind::Server);
        assert_eq!(kind(503), ErrorKind::Server);
        assert_eq!(kind(409), ErrorKind::Other);
        assert_eq!(ApiError::local("boom").kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_local_error_is_not_reported_as_unreachable() {
        let err = ApiError::local("invalid API path 'books/%': relative URL without a base");
        assert_ne!(err.user_message(), ErrorKind::Network.default_message());
        assert_eq!(err.user_message(), ErrorKind::Internal.default_message());

        let value = serde_json::to_value(&err).unwrap();
        assert!(value.get("local").is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let err = ApiError::from_response(404, r#"{"detail": "No Book matches the given query."}"#);
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(
            value,
            json!({"message": "No Book matches the given query.", "status": 404})
        );
    }
}
