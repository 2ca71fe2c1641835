//! # auth — API Key Middleware
//!
//! Guards the control and monitor endpoints with an `X-API-Key` header.
//!
//! ## Mode
//! - `API_KEY` unset (or empty) → **Allow All** (dev mode)
//! - `API_KEY` set → every request must carry `X-API-Key: <key>`
//!
//! `/health` and the static dashboard page at `/` are always open.
//!
//! ```bash
//! curl -X POST -H "X-API-Key: $API_KEY" http://localhost:3000/api/control/pause
//! ```

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

/// Key loaded once at startup. `None` means dev mode.
#[derive(Debug, Clone, Default)]
pub struct ApiKey(Option<Arc<str>>);

impl ApiKey {
    pub fn new(key: Option<String>) -> Self {
        Self(key.filter(|k| !k.is_empty()).map(Arc::from))
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("API_KEY").ok())
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }
}

pub async fn require_api_key(
    State(key): State<ApiKey>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = key.0.as_deref() else {
        return next.run(request).await;
    };

    let path = request.uri().path();
    if path == "/health" || path == "/" {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided == expected {
        next.run(request).await
    } else {
        warn!(path, "❌ Unauthorized request — invalid or missing X-API-Key");
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "ok":    false,
                "error": "Unauthorized: invalid or missing X-API-Key header",
            })),
        )
            .into_response()
    }
}
