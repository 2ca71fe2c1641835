//! # error
//!
//! Two error types:
//!
//! * [`ExchangeError`] — everything the exchange collaborator can fail with.
//!   The strategy loop classifies these and never lets one escape the cycle.
//! * [`AppError`] — returned by HTTP handlers. Axum's `IntoResponse` impl
//!   turns it into a structured JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// ─── Exchange ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Exchange unreachable, timed out, or the connection dropped.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status that is not an explicit order rejection.
    #[error("exchange HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The exchange declined the order (margin, minimum size, rate limit ...).
    #[error("order rejected: {reason}")]
    Rejected { reason: String },

    /// Response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ExchangeError {
    /// Transient errors skip the cycle and trigger backoff. Everything else
    /// is handled in-cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            ExchangeError::Network(_) => true,
            ExchangeError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ExchangeError::Decode(e.to_string())
        } else {
            ExchangeError::Network(e.to_string())
        }
    }
}

// ─── HTTP ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AppError {
    /// The request payload was syntactically correct but semantically invalid.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The strategy loop is gone (command channel closed).
    #[error("Strategy loop unavailable")]
    LoopUnavailable,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::LoopUnavailable => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
