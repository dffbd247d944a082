//! In-memory stores for tests.
//!
//! They enforce the same uniqueness and foreign-key rules as the `PostgreSQL`
//! schema so the orchestration sees identical failure modes.

#![allow(clippy::unwrap_used)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use roster_core::{AccessTokenId, Email, PageRequest, Phone, PositionId, UserId};

use super::{NewAccessToken, PositionStore, RepositoryError, UserStore};
use crate::models::{NewUser, Position, User, UserPatch};

/// Catalogue seeded by `roster seed positions`.
pub fn default_positions() -> Vec<Position> {
    ["Lawyer", "Content manager", "Security", "Designer"]
        .iter()
        .zip(1..)
        .map(|(name, id)| Position {
            id: PositionId::new(id),
            name: (*name).to_string(),
        })
        .collect()
}

/// Position catalogue held in memory.
pub struct MemoryPositionStore {
    positions: Vec<Position>,
}

impl MemoryPositionStore {
    pub fn new(positions: Vec<Position>) -> Self {
        Self { positions }
    }
}

impl Default for MemoryPositionStore {
    fn default() -> Self {
        Self::new(default_positions())
    }
}

#[async_trait]
impl PositionStore for MemoryPositionStore {
    async fn list(&self) -> Result<Vec<Position>, RepositoryError> {
        Ok(self.positions.clone())
    }

    async fn find(&self, id: PositionId) -> Result<Option<Position>, RepositoryError> {
        Ok(self.positions.iter().find(|p| p.id == id).cloned())
    }
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    tokens: Vec<(AccessTokenId, UserId, NewAccessToken)>,
    next_user_id: i32,
    next_token_id: i32,
}

/// User store held in memory.
pub struct MemoryUserStore {
    positions: Vec<Position>,
    tables: Mutex<Tables>,
    fail_writes: bool,
    stall_writes: AtomicBool,
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self {
            positions: default_positions(),
            tables: Mutex::new(Tables::default()),
            fail_writes: false,
            stall_writes: AtomicBool::new(false),
        }
    }
}

impl MemoryUserStore {
    /// A store whose `create` and `update` always fail with a database error.
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    /// Make every later `create` and `update` wait forever.
    pub fn stall_writes(&self) {
        self.stall_writes.store(true, Ordering::SeqCst);
    }

    async fn before_write(&self) -> Result<(), RepositoryError> {
        if self.stall_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_writes {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    /// Number of stored users.
    pub fn user_count(&self) -> usize {
        self.tables.lock().unwrap().users.len()
    }

    /// Stored token hash for `user_id`.
    pub fn token_hash_for(&self, user_id: UserId) -> Option<String> {
        self.tables
            .lock()
            .unwrap()
            .tokens
            .iter()
            .find(|(_, owner, _)| *owner == user_id)
            .map(|(_, _, token)| token.token_hash.clone())
    }

    fn position_name(&self, id: PositionId) -> Result<String, RepositoryError> {
        self.positions
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.name.clone())
            .ok_or_else(|| RepositoryError::Conflict {
                field: "position_id".to_owned(),
            })
    }

    fn check_unique(
        tables: &Tables,
        email: Option<&Email>,
        phone: Option<&Phone>,
        except: Option<UserId>,
    ) -> Result<(), RepositoryError> {
        for user in tables.users.iter().filter(|u| Some(u.id) != except) {
            if email.is_some_and(|e| *e == user.email) {
                return Err(RepositoryError::Conflict {
                    field: "email".to_owned(),
                });
            }
            if phone.is_some_and(|p| *p == user.phone) {
                return Err(RepositoryError::Conflict {
                    field: "phone".to_owned(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn find(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn list(&self, page: PageRequest) -> Result<(Vec<User>, u64), RepositoryError> {
        let tables = self.tables.lock().unwrap();
        let offset = usize::try_from(page.offset()).unwrap();
        let users = tables
            .users
            .iter()
            .skip(offset)
            .take(page.count() as usize)
            .cloned()
            .collect();
        Ok((users, tables.users.len() as u64))
    }

    async fn email_taken(
        &self,
        email: &Email,
        except: Option<UserId>,
    ) -> Result<bool, RepositoryError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .iter()
            .any(|u| u.email == *email && Some(u.id) != except))
    }

    async fn phone_taken(
        &self,
        phone: &Phone,
        except: Option<UserId>,
    ) -> Result<bool, RepositoryError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .iter()
            .any(|u| u.phone == *phone && Some(u.id) != except))
    }

    async fn create(
        &self,
        user: NewUser,
        token: NewAccessToken,
    ) -> Result<(User, AccessTokenId), RepositoryError> {
        self.before_write().await?;
        let position = self.position_name(user.position_id)?;

        let mut tables = self.tables.lock().unwrap();
        Self::check_unique(&tables, Some(&user.email), Some(&user.phone), None)?;

        tables.next_user_id += 1;
        tables.next_token_id += 1;
        let id = UserId::new(tables.next_user_id);
        let token_id = AccessTokenId::new(tables.next_token_id);

        let stored = User {
            id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            position_id: user.position_id,
            position,
            photo: user.photo,
            password_hash: user.password_hash,
            registration_timestamp: user.registration_timestamp,
        };
        tables.users.push(stored.clone());
        tables.tokens.push((token_id, id, token));

        Ok((stored, token_id))
    }

    async fn update(&self, id: UserId, patch: UserPatch) -> Result<User, RepositoryError> {
        self.before_write().await?;
        let position = patch
            .position_id
            .map(|position_id| self.position_name(position_id))
            .transpose()?;

        let mut tables = self.tables.lock().unwrap();
        Self::check_unique(&tables, patch.email.as_ref(), patch.phone.as_ref(), Some(id))?;

        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(RepositoryError::NotFound)?;
        patch.apply_to(user);
        if let Some(position) = position {
            user.position = position;
        }
        Ok(user.clone())
    }
}
