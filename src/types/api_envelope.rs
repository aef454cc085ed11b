use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// The `code` value that marks an envelope as successful.
pub const ENVELOPE_SUCCESS: i64 = 200;

/// The response envelope wrapping every non-streaming reply.
///
/// `code == 200` is the sole success discriminator; it is checked independently of
/// the HTTP status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Envelope status code.
    pub code: i64,

    /// Human-readable status message.
    #[serde(default)]
    pub message: String,

    /// Payload; absent on most error envelopes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    /// Additional error information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<ErrorDetails>,
}

impl<T> ApiEnvelope<T> {
    /// True when the envelope reports success.
    pub fn is_success(&self) -> bool {
        self.code == ENVELOPE_SUCCESS
    }

    /// Returns the payload of a successful envelope.
    pub fn into_data(self) -> Result<T> {
        if !self.is_success() {
            let status_code = u16::try_from(self.code).unwrap_or(0);
            return Err(Error::api(status_code, self.describe_error()));
        }
        self.data.ok_or_else(|| {
            Error::serialization("successful response envelope carried no data", None)
        })
    }

    /// The best human-readable description of a failed envelope.
    pub fn describe_error(&self) -> String {
        let details = self.errors.as_ref().and_then(ErrorDetails::joined);
        match (self.message.is_empty(), details) {
            (false, Some(details)) => format!("{}: {details}", self.message),
            (false, None) => self.message.clone(),
            (true, Some(details)) => details,
            (true, None) => format!("request failed with code {}", self.code),
        }
    }
}

/// The optional `errors` member of an envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Free-form details, either a single string or a list of strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Details>,

    /// Any other members the server attached.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ErrorDetails {
    /// The details joined into one line, if any were given.
    pub fn joined(&self) -> Option<String> {
        match self.details.as_ref()? {
            Details::One(detail) if !detail.is_empty() => Some(detail.clone()),
            Details::Many(details) if !details.is_empty() => Some(details.join("; ")),
            _ => None,
        }
    }
}

/// `errors.details` is either a string or a list of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Details {
    /// A single detail string.
    One(String),
    /// Several detail strings.
    Many(Vec<String>),
}

/// Extracts a human-readable message from an error response body.
///
/// The body is parsed best-effort: the `error`, `message` and `msg` members are tried
/// in that order, then `errors.details`. Anything unparseable falls back to a generic
/// statement built from the HTTP status.
pub fn error_message(status: u16, reason: Option<&str>, body: &[u8]) -> String {
    let fallback = || match reason {
        Some(reason) => format!("request failed: {status} {reason}"),
        None => format!("request failed: {status}"),
    };
    let Ok(Value::Object(object)) = serde_json::from_slice::<Value>(body) else {
        return fallback();
    };
    for key in ["error", "message", "msg"] {
        if let Some(Value::String(text)) = object.get(key) {
            if !text.is_empty() {
                return text.clone();
            }
        }
    }
    object
        .get("errors")
        .cloned()
        .and_then(|errors| serde_json::from_value::<ErrorDetails>(errors).ok())
        .and_then(|errors| errors.joined())
        .unwrap_or_else(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Refreshed {
        access_token: String,
    }

    #[test]
    fn success_envelope_yields_data() {
        let envelope: ApiEnvelope<Refreshed> = serde_json::from_value(json!({
            "code": 200,
            "message": "ok",
            "data": {"access_token": "new"}
        }))
        .unwrap();
        assert!(envelope.is_success());
        assert_eq!(
            envelope.into_data().unwrap(),
            Refreshed {
                access_token: "new".to_string()
            }
        );
    }

    #[test]
    fn error_envelope_without_data() {
        let envelope: ApiEnvelope<Refreshed> = serde_json::from_value(json!({
            "code": 400,
            "message": "missing fields",
            "errors": {"details": ["username", "password"]}
        }))
        .unwrap();
        let err = envelope.into_data().unwrap_err();
        assert_eq!(err.status_code(), Some(400));
        assert!(err.to_string().contains("missing fields: username; password"));
    }

    #[test]
    fn success_code_without_data_is_an_error() {
        let envelope: ApiEnvelope<Refreshed> =
            serde_json::from_value(json!({"code": 200, "message": "ok"})).unwrap();
        assert!(matches!(
            envelope.into_data(),
            Err(Error::Serialization { .. })
        ));
    }

    #[test]
    fn error_message_prefers_error_then_message() {
        let body = br#"{"error": "quota exceeded", "message": "ignored"}"#;
        assert_eq!(error_message(429, None, body), "quota exceeded");
        let body = br#"{"code": 404, "message": "conversation not found"}"#;
        assert_eq!(error_message(404, None, body), "conversation not found");
        let body = br#"{"msg": "Not enough segments"}"#;
        assert_eq!(error_message(422, None, body), "Not enough segments");
    }

    #[test]
    fn error_message_uses_details() {
        let body = br#"{"code": 400, "message": "", "errors": {"details": "bad email"}}"#;
        assert_eq!(error_message(400, None, body), "bad email");
    }

    #[test]
    fn error_message_falls_back_to_status() {
        assert_eq!(
            error_message(502, Some("Bad Gateway"), b"<html>oops</html>"),
            "request failed: 502 Bad Gateway"
        );
        assert_eq!(error_message(500, None, b""), "request failed: 500");
    }
}
