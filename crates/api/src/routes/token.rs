//! Registration token issuance.

use axum::{Json, extract::State};
use serde::Serialize;
use tracing::info;

use crate::state::AppState;

/// `GET /token` response.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub success: bool,
    pub token: String,
}

/// Issue a single-use registration token.
///
/// GET /api/v1/token
pub async fn issue(State(state): State<AppState>) -> Json<TokenResponse> {
    let token = state.gate().issue().await;
    info!("Registration token issued");
    Json(TokenResponse {
        success: true,
        token,
    })
}
