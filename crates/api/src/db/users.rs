//! `PostgreSQL` user store.

use async_trait::async_trait;
use sqlx::PgPool;

use roster_core::{AccessTokenId, Email, PageRequest, Phone, PhotoPath, PositionId, UserId};

use super::{NewAccessToken, RepositoryError, UserStore, map_constraint_violation};
use crate::models::{NewUser, User, UserPatch};

const SELECT_USER: &str = r"
    SELECT u.id, u.name, u.email, u.phone, u.position_id, p.name AS position,
           u.photo, u.password_hash, u.registration_timestamp
    FROM users u
    JOIN positions p ON p.id = u.position_id
";

/// Row shape shared by every user query.
#[derive(sqlx::FromRow)]
struct UserRow {
    id: i32,
    name: String,
    email: String,
    phone: String,
    position_id: i32,
    position: String,
    photo: Option<String>,
    password_hash: Option<String>,
    registration_timestamp: i64,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        let phone = Phone::parse(&row.phone).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid phone in database: {e}"))
        })?;
        let photo = row
            .photo
            .as_deref()
            .map(PhotoPath::parse)
            .transpose()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid photo path in database: {e}"))
            })?;

        Ok(Self {
            id: UserId::new(row.id),
            name: row.name,
            email,
            phone,
            position_id: PositionId::new(row.position_id),
            position: row.position,
            photo,
            password_hash: row.password_hash,
            registration_timestamp: row.registration_timestamp,
        })
    }
}

/// User store backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a new user store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!("{SELECT_USER} WHERE u.id = $1"))
            .bind(id.as_i32())
            .fetch_optional(&self.pool)
            .await?;

        row.map(User::try_from).transpose()
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.fetch(id).await
    }

    async fn list(&self, page: PageRequest) -> Result<(Vec<User>, u64), RepositoryError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let offset = i64::try_from(page.offset()).map_err(|_| {
            RepositoryError::DataCorruption("page offset out of range".to_owned())
        })?;

        let rows: Vec<UserRow> =
            sqlx::query_as(&format!("{SELECT_USER} ORDER BY u.id LIMIT $1 OFFSET $2"))
                .bind(i64::from(page.count()))
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;

        let users = rows
            .into_iter()
            .map(User::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let total = u64::try_from(total).map_err(|_| {
            RepositoryError::DataCorruption(format!("negative user count: {total}"))
        })?;

        Ok((users, total))
    }

    async fn email_taken(
        &self,
        email: &Email,
        except: Option<UserId>,
    ) -> Result<bool, RepositoryError> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 AND ($2::INT IS NULL OR id <> $2))",
        )
        .bind(email.as_str())
        .bind(except.map(|id| id.as_i32()))
        .fetch_one(&self.pool)
        .await?;

        Ok(taken)
    }

    async fn phone_taken(
        &self,
        phone: &Phone,
        except: Option<UserId>,
    ) -> Result<bool, RepositoryError> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE phone = $1 AND ($2::INT IS NULL OR id <> $2))",
        )
        .bind(phone.as_str())
        .bind(except.map(|id| id.as_i32()))
        .fetch_one(&self.pool)
        .await?;

        Ok(taken)
    }

    async fn create(
        &self,
        user: NewUser,
        token: NewAccessToken,
    ) -> Result<(User, AccessTokenId), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let user_id: i32 = sqlx::query_scalar(
            r"
            INSERT INTO users (name, email, phone, position_id, password_hash, photo, registration_timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            ",
        )
        .bind(&user.name)
        .bind(user.email.as_str())
        .bind(user.phone.as_str())
        .bind(user.position_id.as_i32())
        .bind(user.password_hash.as_deref())
        .bind(user.photo.as_ref().map(PhotoPath::as_str))
        .bind(user.registration_timestamp)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_constraint_violation)?;

        let token_id: i32 = sqlx::query_scalar(
            r"
            INSERT INTO personal_access_tokens (user_id, name, token_hash)
            VALUES ($1, $2, $3)
            RETURNING id
            ",
        )
        .bind(user_id)
        .bind(&token.name)
        .bind(&token.token_hash)
        .fetch_one(&mut *tx)
        .await?;

        let row: UserRow = sqlx::query_as(&format!("{SELECT_USER} WHERE u.id = $1"))
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((User::try_from(row)?, AccessTokenId::new(token_id)))
    }

    async fn update(&self, id: UserId, patch: UserPatch) -> Result<User, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE users SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                phone = COALESCE($4, phone),
                position_id = COALESCE($5, position_id),
                password_hash = COALESCE($6, password_hash),
                photo = COALESCE($7, photo),
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id.as_i32())
        .bind(patch.name.as_deref())
        .bind(patch.email.as_ref().map(Email::as_str))
        .bind(patch.phone.as_ref().map(Phone::as_str))
        .bind(patch.position_id.map(|p| p.as_i32()))
        .bind(patch.password_hash.as_deref())
        .bind(patch.photo.as_ref().map(PhotoPath::as_str))
        .execute(&self.pool)
        .await
        .map_err(map_constraint_violation)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        self.fetch(id).await?.ok_or(RepositoryError::NotFound)
    }
}
