//! `PostgreSQL` position catalogue.

use async_trait::async_trait;
use sqlx::PgPool;

use roster_core::PositionId;

use super::{PositionStore, RepositoryError};
use crate::models::Position;

/// Position store backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PgPositionStore {
    pool: PgPool,
}

impl PgPositionStore {
    /// Create a new position store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PositionStore for PgPositionStore {
    async fn list(&self) -> Result<Vec<Position>, RepositoryError> {
        let positions = sqlx::query_as::<_, Position>("SELECT id, name FROM positions ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(positions)
    }

    async fn find(&self, id: PositionId) -> Result<Option<Position>, RepositoryError> {
        let position =
            sqlx::query_as::<_, Position>("SELECT id, name FROM positions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(position)
    }
}
