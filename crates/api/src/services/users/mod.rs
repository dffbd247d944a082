//! User registration and update orchestration.
//!
//! Each write runs the same sequence: format checks, store checks
//! (uniqueness, position), photo validation, then the photo pipeline, and
//! only then the database write. Nothing irreversible happens before every
//! check has passed. If the database write fails or the request is dropped
//! after a photo was stored, the new photo is deleted again; a replaced
//! photo is deleted only after the row pointing at its successor has been
//! saved.

mod validation;

pub use validation::{Mode, UserFields, UserInput, ValidationErrors, check_fields};

use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, instrument};

use roster_core::{PageRequest, PageWindow, UserId};

use crate::db::{NewAccessToken, PositionStore, RepositoryError, UserStore};
use crate::models::{NewUser, User, UserPatch};
use crate::services::photo::{PhotoCleanup, PhotoError, PhotoPipeline, ValidatedPhoto};

/// Name recorded for tokens issued at registration.
pub const ACCESS_TOKEN_NAME: &str = "auth_token";

/// Length of the random part of an access token.
pub const ACCESS_TOKEN_SECRET_LENGTH: usize = 40;

/// Errors that can occur during user operations.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("validation failed")]
    Validation(ValidationErrors),

    #[error("user {0} not found")]
    NotFound(UserId),

    #[error(transparent)]
    Photo(#[from] PhotoError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("password hashing failed")]
    PasswordHash,
}

/// Outcome of a successful registration.
#[derive(Debug)]
pub struct Registration {
    /// The stored user.
    pub user: User,
    /// Plaintext API token, `<token id>|<secret>`. Shown once.
    pub token: String,
}

/// One page of users.
#[derive(Debug)]
pub struct UserPage {
    pub users: Vec<User>,
    pub window: PageWindow,
}

/// User operations over the stores and the photo pipeline.
pub struct UserService<'a> {
    users: &'a dyn UserStore,
    positions: &'a dyn PositionStore,
    photos: &'a PhotoPipeline,
}

impl<'a> UserService<'a> {
    /// Create a new user service.
    #[must_use]
    pub const fn new(
        users: &'a dyn UserStore,
        positions: &'a dyn PositionStore,
        photos: &'a PhotoPipeline,
    ) -> Self {
        Self {
            users,
            positions,
            photos,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `UserError::NotFound` if no such user exists.
    pub async fn get(&self, id: UserId) -> Result<User, UserError> {
        self.users.find(id).await?.ok_or(UserError::NotFound(id))
    }

    /// Get one page of users ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `UserError::Repository` if the store fails.
    pub async fn page(&self, request: PageRequest) -> Result<UserPage, UserError> {
        let (users, total) = self.users.list(request).await?;
        Ok(UserPage {
            users,
            window: PageWindow::new(request, total),
        })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Register a new user, storing its photo and issuing an access token.
    ///
    /// # Errors
    ///
    /// Returns `UserError::Validation` if any field is rejected (including
    /// email or phone already taken), `UserError::Photo` if a pipeline stage
    /// fails, and `UserError::Repository` for other store failures. No row
    /// exists after any error.
    #[instrument(skip_all)]
    pub async fn register(&self, input: UserInput) -> Result<Registration, UserError> {
        let mut errors = ValidationErrors::default();
        let fields = check_fields(&input, Mode::Create, &mut errors);
        self.check_against_store(&fields, None, &mut errors).await?;

        let photo = match input.photo {
            Some(bytes) => self.inspect_photo(bytes, &mut errors).await?,
            None => {
                if self.photos.rules().required_on_create {
                    errors.add("photo", validation::required_message("photo"));
                }
                None
            }
        };

        let (Some(name), Some(email), Some(phone), Some(position_id)) =
            (fields.name, fields.email, fields.phone, fields.position_id)
        else {
            return Err(UserError::Validation(errors));
        };
        if !errors.is_empty() {
            return Err(UserError::Validation(errors));
        }

        let password_hash = fields.password.as_deref().map(hash_password).transpose()?;
        let (secret, token_hash) = generate_access_token();

        let stored_photo = match photo {
            Some(photo) => Some(self.photos.ingest(photo).await?),
            None => None,
        };
        let cleanup = stored_photo.clone().map(|path| self.photos.cleanup(path));

        let new_user = NewUser {
            name,
            email,
            phone,
            position_id,
            password_hash,
            photo: stored_photo.clone(),
            registration_timestamp: chrono::Utc::now().timestamp(),
        };
        let token = NewAccessToken {
            name: ACCESS_TOKEN_NAME.to_owned(),
            token_hash,
        };

        let (user, token_id) = match self.users.create(new_user, token).await {
            Ok(created) => created,
            Err(e) => {
                discard(cleanup).await;
                return Err(conflict_to_validation(e));
            }
        };
        keep(cleanup);

        info!(user_id = %user.id, "User registered");
        Ok(Registration {
            user,
            token: format!("{token_id}|{secret}"),
        })
    }

    /// Apply a partial update. Absent fields keep their stored values.
    ///
    /// # Errors
    ///
    /// Returns `UserError::NotFound` for an unknown ID, otherwise the same
    /// errors as [`Self::register`]. The stored user is unchanged after any
    /// error.
    #[instrument(skip_all, fields(user_id = %id))]
    pub async fn update(&self, id: UserId, input: UserInput) -> Result<User, UserError> {
        let current = self.get(id).await?;

        let mut errors = ValidationErrors::default();
        let fields = check_fields(&input, Mode::Update, &mut errors);
        self.check_against_store(&fields, Some(id), &mut errors).await?;

        let photo = match input.photo {
            Some(bytes) => self.inspect_photo(bytes, &mut errors).await?,
            None => None,
        };

        if !errors.is_empty() {
            return Err(UserError::Validation(errors));
        }

        let password_hash = fields.password.as_deref().map(hash_password).transpose()?;

        let stored_photo = match photo {
            Some(photo) => Some(self.photos.ingest(photo).await?),
            None => None,
        };
        let cleanup = stored_photo.clone().map(|path| self.photos.cleanup(path));

        let patch = UserPatch {
            name: fields.name,
            email: fields.email,
            phone: fields.phone,
            position_id: fields.position_id,
            password_hash,
            photo: stored_photo.clone(),
        };

        let updated = match self.users.update(id, patch).await {
            Ok(user) => user,
            Err(e) => {
                discard(cleanup).await;
                return Err(match e {
                    RepositoryError::NotFound => UserError::NotFound(id),
                    other => conflict_to_validation(other),
                });
            }
        };
        keep(cleanup);

        if stored_photo.is_some()
            && let Some(previous) = current.photo
            && Some(&previous) != stored_photo.as_ref()
        {
            self.photos.cleanup(previous).run().await;
        }

        info!("User updated");
        Ok(updated)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Uniqueness and position checks for fields that passed format checks.
    async fn check_against_store(
        &self,
        fields: &UserFields,
        except: Option<UserId>,
        errors: &mut ValidationErrors,
    ) -> Result<(), UserError> {
        if let Some(email) = &fields.email
            && self.users.email_taken(email, except).await?
        {
            errors.add("email", validation::taken_message("email"));
        }
        if let Some(phone) = &fields.phone
            && self.users.phone_taken(phone, except).await?
        {
            errors.add("phone", validation::taken_message("phone"));
        }
        if let Some(position_id) = fields.position_id
            && self.positions.find(position_id).await?.is_none()
        {
            errors.add("position_id", "The selected position id is invalid.");
        }
        Ok(())
    }

    /// Validate photo bytes, turning a rejection into a field error.
    async fn inspect_photo(
        &self,
        bytes: Vec<u8>,
        errors: &mut ValidationErrors,
    ) -> Result<Option<ValidatedPhoto>, UserError> {
        match self.photos.inspect(bytes).await {
            Ok(photo) => Ok(Some(photo)),
            Err(PhotoError::Invalid(rejection)) => {
                errors.add("photo", rejection.to_string());
                Ok(None)
            }
            Err(other) => Err(other.into()),
        }
    }
}

/// Delete a photo stored for a write that did not happen.
async fn discard(cleanup: Option<PhotoCleanup>) {
    if let Some(cleanup) = cleanup {
        cleanup.run().await;
    }
}

/// Keep a photo now that a committed row points at it.
fn keep(cleanup: Option<PhotoCleanup>) {
    if let Some(cleanup) = cleanup {
        cleanup.keep();
    }
}

/// Map a store-level uniqueness race onto the field that lost it.
fn conflict_to_validation(err: RepositoryError) -> UserError {
    match err {
        RepositoryError::Conflict { field } if field == "position_id" => {
            let mut errors = ValidationErrors::default();
            errors.add("position_id", "The selected position id is invalid.");
            UserError::Validation(errors)
        }
        RepositoryError::Conflict { field } if field == "email" || field == "phone" => {
            let mut errors = ValidationErrors::default();
            errors.add(&field, validation::taken_message(&field));
            UserError::Validation(errors)
        }
        other => UserError::Repository(other),
    }
}

/// Hash a password with Argon2id.
///
/// # Errors
///
/// Returns `UserError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, UserError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| UserError::PasswordHash)
}

/// Generate an access token secret and the hex SHA-256 that gets stored.
#[must_use]
pub fn generate_access_token() -> (String, String) {
    let secret: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ACCESS_TOKEN_SECRET_LENGTH)
        .map(char::from)
        .collect();
    let hash = hex::encode(Sha256::digest(secret.as_bytes()));
    (secret, hash)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use roster_core::{PositionId, UserId};

    use super::*;
    use crate::db::memory::MemoryUserStore;
    use crate::services::photo::PhotoStorage;
    use crate::test_support::{CopyOptimizer, FailingOptimizer, TestApp, jpeg_bytes};

    fn input(email: &str, phone: &str) -> UserInput {
        UserInput {
            name: Some("Oksana".to_string()),
            email: Some(email.to_string()),
            phone: Some(phone.to_string()),
            position_id: Some("1".to_string()),
            password: Some("password123".to_string()),
            photo: Some(jpeg_bytes(200, 200)),
        }
    }

    #[tokio::test]
    async fn test_register_stores_user_photo_and_token() {
        let (app, optimizer) = TestApp::new();
        let service = app.state.user_service();

        let registration = service
            .register(input("oksana@example.com", "+380501234567"))
            .await
            .unwrap();
        let user = registration.user;

        assert_eq!(user.id, UserId::new(1));
        assert_eq!(user.position, "Lawyer");
        assert!(user.password_hash.as_deref().unwrap().starts_with("$argon2id$"));
        assert!(user.registration_timestamp > 0);
        assert_eq!(optimizer.call_count(), 1);

        let photo = user.photo.unwrap();
        assert!(app.storage.exists(&photo).await.unwrap());
        assert_eq!(app.scratch_files(), 0);

        let (id, secret) = registration.token.split_once('|').unwrap();
        assert_eq!(id, "1");
        assert_eq!(secret.len(), ACCESS_TOKEN_SECRET_LENGTH);
        assert_eq!(
            app.users.token_hash_for(user.id).unwrap(),
            hex::encode(Sha256::digest(secret.as_bytes()))
        );
    }

    #[tokio::test]
    async fn test_duplicate_email_or_phone_is_rejected_without_side_effects() {
        let (app, optimizer) = TestApp::new();
        let service = app.state.user_service();
        service
            .register(input("first@example.com", "+380123456789"))
            .await
            .unwrap();

        let err = service
            .register(input("second@example.com", "+380123456789"))
            .await
            .unwrap_err();
        let UserError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(errors.messages("phone"), ["The phone has already been taken."]);

        let err = service
            .register(input("first@example.com", "+380999999999"))
            .await
            .unwrap_err();
        let UserError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(errors.messages("email"), ["The email has already been taken."]);

        assert_eq!(app.users.user_count(), 1);
        assert_eq!(app.stored_photos(), 1);
        assert_eq!(optimizer.call_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_fields_never_reach_the_optimizer() {
        let (app, optimizer) = TestApp::new();
        let service = app.state.user_service();

        let mut bad = input("oksana@example.com", "+380501234567");
        bad.position_id = Some("99".to_string());

        let err = service.register(bad).await.unwrap_err();
        let UserError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(
            errors.messages("position_id"),
            ["The selected position id is invalid."]
        );
        assert_eq!(optimizer.call_count(), 0);
        assert_eq!(app.stored_photos(), 0);
        assert!(!app.scratch_dir().exists());
    }

    #[tokio::test]
    async fn test_photo_rejections_are_field_errors() {
        let (app, optimizer) = TestApp::new();
        let service = app.state.user_service();

        let mut small = input("oksana@example.com", "+380501234567");
        small.photo = Some(jpeg_bytes(40, 40));
        let err = service.register(small).await.unwrap_err();
        let UserError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(
            errors.messages("photo"),
            ["The photo has invalid image dimensions."]
        );

        let mut missing = input("oksana@example.com", "+380501234567");
        missing.photo = None;
        let err = service.register(missing).await.unwrap_err();
        let UserError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(errors.messages("photo"), ["The photo field is required."]);
        assert_eq!(optimizer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_photo_optional_when_configured() {
        let app = TestApp::configured(
            Arc::new(CopyOptimizer::default()),
            Arc::new(MemoryUserStore::default()),
            |config| config.photo.required_on_create = false,
        );
        let mut no_photo = input("oksana@example.com", "+380501234567");
        no_photo.photo = None;

        let registration = app.state.user_service().register(no_photo).await.unwrap();
        assert!(registration.user.photo.is_none());
    }

    #[tokio::test]
    async fn test_optimizer_failure_creates_no_user() {
        let app = TestApp::with(Arc::new(FailingOptimizer), Arc::new(MemoryUserStore::default()));

        let err = app
            .state
            .user_service()
            .register(input("oksana@example.com", "+380501234567"))
            .await
            .unwrap_err();

        assert!(matches!(err, UserError::Photo(PhotoError::Optimization(_))));
        assert_eq!(app.users.user_count(), 0);
        assert_eq!(app.stored_photos(), 0);
        assert_eq!(app.scratch_files(), 0);
    }

    #[tokio::test]
    async fn test_failed_insert_removes_the_new_photo() {
        let app = TestApp::with(
            Arc::new(CopyOptimizer::default()),
            Arc::new(MemoryUserStore::failing_writes()),
        );

        let err = app
            .state
            .user_service()
            .register(input("oksana@example.com", "+380501234567"))
            .await
            .unwrap_err();

        assert!(matches!(err, UserError::Repository(_)));
        assert_eq!(app.stored_photos(), 0);
    }

    #[tokio::test]
    async fn test_dropped_registration_removes_the_new_photo() {
        let (app, optimizer) = TestApp::new();
        app.users.stall_writes();

        let service = app.state.user_service();
        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            service.register(input("oksana@example.com", "+380501234567")),
        )
        .await;

        assert!(outcome.is_err());
        assert_eq!(optimizer.call_count(), 1);
        assert_eq!(app.settled_photo_count(0).await, 0);
        assert_eq!(app.users.user_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_update_keeps_previous_photo_only() {
        let (app, _) = TestApp::new();
        let service = app.state.user_service();
        let created = service
            .register(input("oksana@example.com", "+380501234567"))
            .await
            .unwrap()
            .user;
        let old_photo = created.photo.clone().unwrap();
        app.users.stall_writes();

        let patch = UserInput {
            photo: Some(jpeg_bytes(100, 100)),
            ..UserInput::default()
        };
        let outcome =
            tokio::time::timeout(Duration::from_secs(2), service.update(created.id, patch)).await;

        assert!(outcome.is_err());
        assert_eq!(app.settled_photo_count(1).await, 1);
        assert!(app.storage.exists(&old_photo).await.unwrap());
    }

    #[tokio::test]
    async fn test_partial_update_keeps_other_fields() {
        let (app, optimizer) = TestApp::new();
        let service = app.state.user_service();
        let created = service
            .register(input("oksana@example.com", "+380501234567"))
            .await
            .unwrap()
            .user;

        let patch = UserInput {
            name: Some("Oksana P".to_string()),
            password: Some(String::new()),
            ..UserInput::default()
        };
        let updated = service.update(created.id, patch).await.unwrap();

        assert_eq!(updated.name, "Oksana P");
        assert_eq!(updated.email, created.email);
        assert_eq!(updated.phone, created.phone);
        assert_eq!(updated.photo, created.photo);
        assert_eq!(updated.password_hash, created.password_hash);
        assert_eq!(updated.registration_timestamp, created.registration_timestamp);
        assert_eq!(optimizer.call_count(), 1);
    }

    #[tokio::test]
    async fn test_update_may_keep_own_email_and_change_position() {
        let (app, _) = TestApp::new();
        let service = app.state.user_service();
        let created = service
            .register(input("oksana@example.com", "+380501234567"))
            .await
            .unwrap()
            .user;

        let patch = UserInput {
            email: Some("oksana@example.com".to_string()),
            position_id: Some("4".to_string()),
            ..UserInput::default()
        };
        let updated = service.update(created.id, patch).await.unwrap();

        assert_eq!(updated.position_id, PositionId::new(4));
        assert_eq!(updated.position, "Designer");
    }

    #[tokio::test]
    async fn test_photo_replacement_deletes_previous_after_save() {
        let (app, optimizer) = TestApp::new();
        let service = app.state.user_service();
        let created = service
            .register(input("oksana@example.com", "+380501234567"))
            .await
            .unwrap()
            .user;
        let old_photo = created.photo.clone().unwrap();

        let patch = UserInput {
            photo: Some(jpeg_bytes(90, 300)),
            ..UserInput::default()
        };
        let updated = service.update(created.id, patch).await.unwrap();
        let new_photo = updated.photo.unwrap();

        assert_ne!(new_photo, old_photo);
        assert!(app.storage.exists(&new_photo).await.unwrap());
        assert!(!app.storage.exists(&old_photo).await.unwrap());
        assert_eq!(app.stored_photos(), 1);
        assert_eq!(optimizer.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_replacement_keeps_previous_photo() {
        let (app, _) = TestApp::new();
        let created = app
            .state
            .user_service()
            .register(input("oksana@example.com", "+380501234567"))
            .await
            .unwrap()
            .user;
        let old_photo = created.photo.clone().unwrap();

        // Same stores, optimizer now failing
        let failing = crate::services::photo::PhotoPipeline::new(
            app.state.config().photo.clone(),
            Arc::new(FailingOptimizer),
            app.storage.clone(),
        );
        let service = UserService::new(app.state.users(), app.state.positions(), &failing);

        let patch = UserInput {
            photo: Some(jpeg_bytes(100, 100)),
            ..UserInput::default()
        };
        let err = service.update(created.id, patch).await.unwrap_err();

        assert!(matches!(err, UserError::Photo(_)));
        let stored = app.state.users().find(created.id).await.unwrap().unwrap();
        assert_eq!(stored.photo, Some(old_photo.clone()));
        assert!(app.storage.exists(&old_photo).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_unknown_user_is_not_found() {
        let (app, optimizer) = TestApp::new();
        let patch = UserInput {
            name: Some("Nobody".to_string()),
            photo: Some(jpeg_bytes(100, 100)),
            ..UserInput::default()
        };

        let err = app
            .state
            .user_service()
            .update(UserId::new(999), patch)
            .await
            .unwrap_err();

        assert!(matches!(err, UserError::NotFound(id) if id == UserId::new(999)));
        assert_eq!(optimizer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_update_rejects_phone_of_another_user() {
        let (app, _) = TestApp::new();
        let service = app.state.user_service();
        service
            .register(input("a@example.com", "+380500000001"))
            .await
            .unwrap();
        let second = service
            .register(input("b@example.com", "+380500000002"))
            .await
            .unwrap()
            .user;

        let patch = UserInput {
            phone: Some("+380500000001".to_string()),
            ..UserInput::default()
        };
        let err = service.update(second.id, patch).await.unwrap_err();

        assert!(matches!(err, UserError::Validation(ref e) if e.has("phone")));
    }

    #[tokio::test]
    async fn test_page_window() {
        let app = TestApp::configured(
            Arc::new(CopyOptimizer::default()),
            Arc::new(MemoryUserStore::default()),
            |config| config.photo.required_on_create = false,
        );
        let service = app.state.user_service();
        for i in 0..12 {
            let mut user = input(&format!("user{i}@example.com"), &format!("+3805000000{i:02}"));
            user.photo = None;
            service.register(user).await.unwrap();
        }

        let page = service.page(PageRequest::new(2, 5).unwrap()).await.unwrap();
        let ids: Vec<i32> = page.users.iter().map(|u| u.id.as_i32()).collect();

        assert_eq!(ids, vec![6, 7, 8, 9, 10]);
        assert_eq!(page.window.total, 12);
        assert_eq!(page.window.total_pages, 3);
    }

    #[test]
    fn test_access_token_hash_matches_secret() {
        let (secret, hash) = generate_access_token();
        assert_eq!(secret.len(), ACCESS_TOKEN_SECRET_LENGTH);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hex::encode(Sha256::digest(secret.as_bytes())));
    }
}
