//! Dispatch header extractor.
//!
//! Reads the optional headers that shape a dispatch:
//! - `execution-mode: sync | async | background`
//! - `callback-url: <url>`

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use agentry_types::process::ExecutionMode;

use crate::http::error::AppError;

pub const EXECUTION_MODE_HEADER: &str = "execution-mode";
pub const CALLBACK_URL_HEADER: &str = "callback-url";

/// Execution preferences sent alongside a dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchHeaders {
    pub mode: Option<ExecutionMode>,
    pub callback_url: Option<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for DispatchHeaders {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let mode = match header(parts, EXECUTION_MODE_HEADER)? {
            Some(raw) => Some(raw.parse::<ExecutionMode>().map_err(AppError::Validation)?),
            None => None,
        };
        let callback_url = header(parts, CALLBACK_URL_HEADER)?;
        Ok(Self { mode, callback_url })
    }
}

/// A trimmed, non-empty header value.
fn header(parts: &Parts, name: &str) -> Result<Option<String>, AppError> {
    let Some(value) = parts.headers.get(name) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::Validation(format!("header '{name}' is not valid ASCII")))?
        .trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}
