//! Database operations for the user directory.
//!
//! # Tables
//!
//! - `positions` - Static position catalogue
//! - `users` - Registered users (unique email, unique phone)
//! - `personal_access_tokens` - API tokens issued at registration (hash only)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p roster-cli -- migrate
//! ```
//!
//! Handlers never talk to `PgPool` directly; they go through the
//! [`UserStore`] and [`PositionStore`] traits so the orchestration can be
//! exercised against an in-memory store in tests.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use roster_core::{AccessTokenId, Email, PageRequest, Phone, PositionId, UserId};

use crate::models::{NewUser, Position, User, UserPatch};

#[cfg(test)]
pub mod memory;
pub mod positions;
pub mod users;

pub use positions::PgPositionStore;
pub use users::PgUserStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation on the named field (e.g. unique email).
    #[error("constraint violation on {field}")]
    Conflict {
        /// Request field the violated constraint guards.
        field: String,
    },
}

/// API access token to be stored alongside a new user.
#[derive(Debug, Clone)]
pub struct NewAccessToken {
    /// Token label.
    pub name: String,
    /// Hex SHA-256 of the secret part; the plaintext is never stored.
    pub token_hash: String,
}

/// Persistence seam for users.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Check that the backing store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;

    /// Get a user by ID.
    async fn find(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Get one page of users ordered by ID, plus the total user count.
    async fn list(&self, page: PageRequest) -> Result<(Vec<User>, u64), RepositoryError>;

    /// Whether `email` belongs to a user other than `except`.
    async fn email_taken(
        &self,
        email: &Email,
        except: Option<UserId>,
    ) -> Result<bool, RepositoryError>;

    /// Whether `phone` belongs to a user other than `except`.
    async fn phone_taken(
        &self,
        phone: &Phone,
        except: Option<UserId>,
    ) -> Result<bool, RepositoryError>;

    /// Insert a user and its access token atomically.
    ///
    /// Returns `RepositoryError::Conflict` if email or phone is already taken.
    async fn create(
        &self,
        user: NewUser,
        token: NewAccessToken,
    ) -> Result<(User, AccessTokenId), RepositoryError>;

    /// Apply a partial update and return the stored result.
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    async fn update(&self, id: UserId, patch: UserPatch) -> Result<User, RepositoryError>;
}

/// Read access to the position catalogue.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// All positions ordered by ID.
    async fn list(&self) -> Result<Vec<Position>, RepositoryError>;

    /// Get a position by ID.
    async fn find(&self, id: PositionId) -> Result<Option<Position>, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Translate constraint violations into `RepositoryError::Conflict`.
///
/// The field is derived from the constraint name (`users_email_key` -> `email`).
pub(crate) fn map_constraint_violation(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && (db_err.is_unique_violation() || db_err.is_foreign_key_violation())
    {
        let field = db_err
            .constraint()
            .and_then(field_for_constraint)
            .unwrap_or("unknown");
        return RepositoryError::Conflict {
            field: field.to_owned(),
        };
    }
    RepositoryError::Database(e)
}

fn field_for_constraint(constraint: &str) -> Option<&'static str> {
    match constraint {
        "users_email_key" => Some("email"),
        "users_phone_key" => Some("phone"),
        "users_position_id_fkey" => Some("position_id"),
        _ => None,
    }
}
