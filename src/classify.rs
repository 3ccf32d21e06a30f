//! Sorting upstream response bodies into images and error payloads.
//!
//! The inference endpoint answers with either raw image bytes or a JSON
//! object carrying an `error` field, and the status code does not reliably
//! tell the two apart. Only the body is inspected: anything that fails to
//! decode as UTF-8, fails to parse as JSON, or parses without an `error` key
//! is treated as an image.

use serde_json::Value;

/// Why the upstream refused to produce an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// The model is still loading; retrying after a short wait should work.
    Warming,
    /// Anything else the upstream reported.
    Generic,
}

/// The outcome of [classify].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpstreamResponse {
    /// Image bytes, passed through untouched.
    Image(Vec<u8>),
    /// An error payload from the upstream.
    Error {
        /// The upstream's error text
        message: String,
        /// Warming or generic
        kind: UpstreamErrorKind,
    },
}

/// Classifies a response body. Order matters: decode, then parse, then look for `error`.
pub fn classify(bytes: Vec<u8>) -> UpstreamResponse {
    let Ok(text) = std::str::from_utf8(&bytes) else {
        return UpstreamResponse::Image(bytes);
    };
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) else {
        return UpstreamResponse::Image(bytes);
    };
    let Some(error) = map.get("error") else {
        return UpstreamResponse::Image(bytes);
    };

    let message = match error {
        Value::String(message) => message.clone(),
        other => other.to_string(),
    };
    let kind = if message.contains("loading") {
        UpstreamErrorKind::Warming
    } else {
        UpstreamErrorKind::Generic
    };
    UpstreamResponse::Error { message, kind }
}
