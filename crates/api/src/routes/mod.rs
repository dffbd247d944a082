//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (user store ping)
//! GET  /storage/photos/:file   - Stored photos
//!
//! # API (prefix /api/v1)
//! GET  /positions              - Position catalogue
//! GET  /token                  - Issue a registration token
//! GET  /users                  - Paginated user list (?page=&count=)
//! GET  /users/:id              - User detail
//! POST /users                  - Register (bearer token, multipart or JSON)
//! PUT  /users/:id              - Partial update (bearer token)
//! POST /users/:id              - Partial update for multipart clients
//! ```

pub mod form;
pub mod health;
pub mod positions;
pub mod token;
pub mod users;

use axum::{
    Router,
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    routing::get,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use roster_core::PhotoPath;

use crate::middleware::request_id_middleware;
use crate::state::AppState;

/// Room for form fields and multipart framing on top of the photo ceiling.
const BODY_OVERHEAD: usize = 1024 * 1024;

/// Create the `/api/v1` routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/positions", get(positions::index))
        .route("/token", get(token::issue))
        .route("/users", get(users::index).post(users::create))
        .route(
            "/users/{id}",
            get(users::show).put(users::update).post(users::update),
        )
}

/// Assemble the full application: health checks, the API, stored photos
/// and the request tracing stack.
pub fn app(state: AppState) -> Router {
    let storage_root = state.config().storage.root.clone();
    let body_limit = state
        .config()
        .photo
        .max_bytes
        .saturating_add(BODY_OVERHEAD);

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/v1", api_routes())
        .nest_service(
            "/storage/photos",
            ServeDir::new(storage_root.join(PhotoPath::NAMESPACE)),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}
