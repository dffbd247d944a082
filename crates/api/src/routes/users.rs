//! User route handlers.

use axum::{
    Json,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, request::Parts},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use roster_core::{PageRequest, PageWindow, UserId};

use crate::error::{AppError, Result};
use crate::middleware::RegistrationToken;
use crate::models::{User, UserResource};
use crate::routes::form::UserForm;
use crate::services::users::ValidationErrors;
use crate::state::AppState;

// =============================================================================
// Extractors
// =============================================================================

/// `{id}` path segment parsed as a positive user ID.
///
/// Rejects with 400 so malformed IDs are told apart from unknown ones.
#[derive(Debug, Clone, Copy)]
pub struct UserIdParam(pub UserId);

impl<S> FromRequestParts<S> for UserIdParam
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        raw.parse()
            .map(Self)
            .map_err(|_| AppError::BadRequest("The user ID must be an integer.".to_string()))
    }
}

/// Raw pagination parameters; parsed by [`PageRequest::parse`].
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub count: Option<String>,
}

// =============================================================================
// Responses
// =============================================================================

/// Links to the neighbouring pages, `null` at either end.
#[derive(Debug, Serialize)]
pub struct PageLinks {
    pub next_url: Option<String>,
    pub prev_url: Option<String>,
}

/// `GET /users` response.
#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub success: bool,
    pub page: u32,
    pub total_pages: u64,
    pub total_users: u64,
    pub count: u32,
    pub links: PageLinks,
    pub users: Vec<UserResource>,
}

/// `GET /users/{id}` and update response.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub user: UserResource,
}

/// `POST /users` response.
#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub success: bool,
    pub user_id: UserId,
    pub message: &'static str,
    pub user: UserResource,
    pub token: String,
}

fn resource(state: &AppState, user: User) -> UserResource {
    let photos = state.photos();
    UserResource::new(user, |path| photos.url(path))
}

fn page_url(state: &AppState, page: u32, count: u32) -> String {
    format!(
        "{}/api/v1/users?page={page}&count={count}",
        state.config().base_url
    )
}

fn page_links(state: &AppState, window: &PageWindow) -> PageLinks {
    PageLinks {
        next_url: window
            .next_page()
            .map(|page| page_url(state, page, window.count)),
        prev_url: window
            .previous_page()
            .map(|page| page_url(state, page, window.count)),
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// List users ordered by ID.
///
/// GET /api/v1/users?page=1&count=5
///
/// # Errors
///
/// Returns 422 for an invalid `page` or `count`.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<UserListResponse>> {
    let request = PageRequest::parse(query.page.as_deref(), query.count.as_deref()).map_err(
        |errors| {
            let mut fields = ValidationErrors::default();
            for error in errors {
                fields.add(error.field(), error.to_string());
            }
            AppError::Validation(fields)
        },
    )?;

    let page = state.user_service().page(request).await?;
    let links = page_links(&state, &page.window);
    let users = page
        .users
        .into_iter()
        .map(|user| resource(&state, user))
        .collect();

    Ok(Json(UserListResponse {
        success: true,
        page: page.window.page,
        total_pages: page.window.total_pages,
        total_users: page.window.total,
        count: page.window.count,
        links,
        users,
    }))
}

/// Get one user.
///
/// GET /api/v1/users/{id}
///
/// # Errors
///
/// Returns 400 for a malformed ID and 404 for an unknown one.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    UserIdParam(id): UserIdParam,
) -> Result<Json<UserResponse>> {
    let user = state.user_service().get(id).await?;

    Ok(Json(UserResponse {
        success: true,
        message: None,
        user: resource(&state, user),
    }))
}

/// Register a user.
///
/// POST /api/v1/users (bearer registration token)
///
/// # Errors
///
/// Returns 401 without a live token, 422 for rejected fields and 500 when
/// the photo pipeline or the database fails.
#[instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    _token: RegistrationToken,
    UserForm(input): UserForm,
) -> Result<(StatusCode, Json<CreatedResponse>)> {
    let registration = state.user_service().register(input).await?;
    let user_id = registration.user.id;

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            success: true,
            user_id,
            message: "New user successfully registered",
            user: resource(&state, registration.user),
            token: registration.token,
        }),
    ))
}

/// Partially update a user. Absent fields keep their values.
///
/// PUT|POST /api/v1/users/{id} (bearer registration token)
///
/// # Errors
///
/// Returns 400 for a malformed ID, 401 without a live token, 404 for an
/// unknown user, 422 for rejected fields and 500 on pipeline failure.
#[instrument(skip_all, fields(user_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    UserIdParam(id): UserIdParam,
    _token: RegistrationToken,
    UserForm(input): UserForm,
) -> Result<Json<UserResponse>> {
    let user = state.user_service().update(id, input).await?;

    Ok(Json(UserResponse {
        success: true,
        message: Some("User successfully updated"),
        user: resource(&state, user),
    }))
}
