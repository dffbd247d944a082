//! Position catalogue handler.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::error::Result;
use crate::models::Position;
use crate::state::AppState;

/// `GET /positions` response.
#[derive(Debug, Serialize)]
pub struct PositionsResponse {
    pub success: bool,
    pub positions: Vec<Position>,
}

/// List all positions.
///
/// GET /api/v1/positions
///
/// # Errors
///
/// Returns 500 if the store fails.
pub async fn index(State(state): State<AppState>) -> Result<Json<PositionsResponse>> {
    let positions = state.positions().list().await?;
    Ok(Json(PositionsResponse {
        success: true,
        positions,
    }))
}
