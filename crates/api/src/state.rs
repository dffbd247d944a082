//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::db::{PgPositionStore, PgUserStore, PositionStore, UserStore};
use crate::services::photo::{
    LocalDiskStorage, OptimizeError, PhotoPipeline, PhotoStorage, optimizer_from_config,
};
use crate::services::registration::RegistrationGate;
use crate::services::users::UserService;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the stores, the token gate, the photo pipeline and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    users: Arc<dyn UserStore>,
    positions: Arc<dyn PositionStore>,
    gate: RegistrationGate,
    photos: PhotoPipeline,
}

impl AppState {
    /// Create the production state: `PostgreSQL` stores, in-process token
    /// cache, local disk storage and the configured optimizer.
    ///
    /// # Errors
    ///
    /// Returns an error if the optimizer client cannot be built.
    pub fn new(config: ApiConfig, pool: PgPool) -> Result<Self, OptimizeError> {
        let optimizer = optimizer_from_config(&config.optimizer)?;
        let storage: Arc<dyn PhotoStorage> = Arc::new(LocalDiskStorage::new(
            config.storage.root.clone(),
            config.storage.public_url.clone(),
        ));
        let photos = PhotoPipeline::new(config.photo.clone(), optimizer, storage);
        let gate = RegistrationGate::in_memory(config.registration.token_ttl);

        Ok(Self::from_parts(
            config,
            Arc::new(PgUserStore::new(pool.clone())),
            Arc::new(PgPositionStore::new(pool)),
            gate,
            photos,
        ))
    }

    /// Assemble state from already built collaborators.
    #[must_use]
    pub fn from_parts(
        config: ApiConfig,
        users: Arc<dyn UserStore>,
        positions: Arc<dyn PositionStore>,
        gate: RegistrationGate,
        photos: PhotoPipeline,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                users,
                positions,
                gate,
                photos,
            }),
        }
    }

    /// Get a reference to the API configuration.
    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Get the user store.
    #[must_use]
    pub fn users(&self) -> &dyn UserStore {
        self.inner.users.as_ref()
    }

    /// Get the position catalogue.
    #[must_use]
    pub fn positions(&self) -> &dyn PositionStore {
        self.inner.positions.as_ref()
    }

    /// Get the registration token gate.
    #[must_use]
    pub fn gate(&self) -> &RegistrationGate {
        &self.inner.gate
    }

    /// Get the photo pipeline.
    #[must_use]
    pub fn photos(&self) -> &PhotoPipeline {
        &self.inner.photos
    }

    /// User operations bound to this state's stores.
    #[must_use]
    pub fn user_service(&self) -> UserService<'_> {
        UserService::new(self.users(), self.positions(), self.photos())
    }
}
