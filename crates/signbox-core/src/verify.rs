//! Interpretation of signature-verification results.
//!
//! The verify endpoint answers in one of three shapes: an explicit valid
//! verdict, an explicit invalid verdict, or some kind of error. Errors are
//! presumed to mean the file carries no signature, but the cause is kept in
//! `VerdictKind` so a server fault can still be told apart from an unsigned
//! file.

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::api::{ApiError, ApiResponse};

pub const VERIFIED_MESSAGE: &str = "signature verified";
pub const INVALID_MESSAGE: &str = "signature invalid";
pub const UNSIGNED_MESSAGE: &str = "file is not signed";
pub const INDETERMINATE_MESSAGE: &str = "could not verify the file signature";

/// Raw result of a verify call, before interpretation.
#[derive(Debug, Clone)]
pub enum RawVerification {
    Response { status: StatusCode, body: Vec<u8> },
    Failed { message: String },
}

impl From<Result<ApiResponse, ApiError>> for RawVerification {
    fn from(result: Result<ApiResponse, ApiError>) -> Self {
        match result {
            Ok(response) => RawVerification::Response {
                status: response.status,
                body: response.body,
            },
            Err(e) => RawVerification::Failed {
                message: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", content = "status", rename_all = "snake_case")]
pub enum UnsignedCause {
    /// The server answered with a non-2xx status.
    ServerRejected(u16),
    /// No response was received.
    Transport,
    /// A 2xx body without a boolean `is_valid`.
    MissingVerdict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    Valid,
    Invalid,
    PresumedUnsigned(UnsignedCause),
    Indeterminate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub is_verified: bool,
    pub message: String,
    pub kind: VerdictKind,
}

impl Verdict {
    fn new(is_verified: bool, message: String, kind: VerdictKind) -> Self {
        Self {
            is_verified,
            message,
            kind,
        }
    }

    pub fn is_presumed_unsigned(&self) -> bool {
        matches!(self.kind, VerdictKind::PresumedUnsigned(_))
    }
}

/// Map a raw verify result to a verdict. Never fails.
pub fn interpret(raw: &RawVerification) -> Verdict {
    let (status, body) = match raw {
        RawVerification::Failed { message } => {
            return presumed_unsigned(UnsignedCause::Transport, None, Some(message));
        }
        RawVerification::Response { status, body } => (*status, body),
    };

    let object = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    };

    if !status.is_success() {
        return presumed_unsigned(
            UnsignedCause::ServerRejected(status.as_u16()),
            object.as_ref(),
            None,
        );
    }

    let Some(object) = object else {
        return Verdict::new(
            false,
            INDETERMINATE_MESSAGE.to_string(),
            VerdictKind::Indeterminate,
        );
    };

    match object.get("is_valid").and_then(Value::as_bool) {
        Some(true) => Verdict::new(
            true,
            text_field(&object, "message").unwrap_or_else(|| VERIFIED_MESSAGE.to_string()),
            VerdictKind::Valid,
        ),
        Some(false) => Verdict::new(
            false,
            text_field(&object, "message").unwrap_or_else(|| INVALID_MESSAGE.to_string()),
            VerdictKind::Invalid,
        ),
        None => presumed_unsigned(UnsignedCause::MissingVerdict, Some(&object), None),
    }
}

/// Error-shaped result. Message precedence: body `error`, body `message`,
/// the generic error message, then the fallback.
fn presumed_unsigned(
    cause: UnsignedCause,
    body: Option<&Map<String, Value>>,
    generic: Option<&String>,
) -> Verdict {
    let message = body
        .and_then(|b| text_field(b, "error").or_else(|| text_field(b, "message")))
        .or_else(|| generic.filter(|m| !m.is_empty()).cloned())
        .unwrap_or_else(|| UNSIGNED_MESSAGE.to_string());
    Verdict::new(false, message, VerdictKind::PresumedUnsigned(cause))
}

fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
