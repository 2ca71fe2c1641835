//! # routes::control
//!
//! Operator controls. Commands are queued for the strategy loop and take
//! effect at the start of its next cycle.
//!
//! | Method | Path                          | Description                        |
//! |--------|-------------------------------|------------------------------------|
//! | POST   | `/api/control/pause`          | Stop grid adds and profit exits    |
//! | POST   | `/api/control/resume`         | Re-enable trading                  |
//! | POST   | `/api/control/force-close`    | Close everything at market         |

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::info;

use crate::error::AppError;
use crate::state::{ControlCommand, SharedState};

/// POST /api/control/:command
pub async fn post_control(
    State(state): State<SharedState>,
    Path(command): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let command: ControlCommand = command.parse()?;
    state.send_command(command).await?;

    info!(?command, "🎛️ Control command queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "ok":      true,
            "command": command,
            "message": "Queued for the next cycle",
        })),
    ))
}
