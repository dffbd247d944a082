//! Seed commands.
//!
//! # Usage
//!
//! ```bash
//! roster seed positions
//! roster seed users --count 45 --photo assets/default.jpg
//! ```
//!
//! # Environment Variables
//!
//! - `API_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//! - `STORAGE_ROOT` - Photo storage root (default: storage/app/public)

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::{info, warn};

use roster_api::config::PhotoConfig;
use roster_api::db::{
    NewAccessToken, PgPositionStore, PgUserStore, PositionStore, RepositoryError, UserStore,
};
use roster_api::models::NewUser;
use roster_api::services::photo::{
    LocalDiskStorage, PhotoFormat, PhotoStorage, cover_thumbnail, validate_upload,
};
use roster_api::services::users::{ACCESS_TOKEN_NAME, generate_access_token, hash_password};
use roster_core::{Email, Phone, PhotoPath};

use super::{CommandError, database_url};

/// Position catalogue, inserted in this order so IDs are 1 to 4 on a
/// fresh database.
pub const POSITIONS: &[&str] = &["Lawyer", "Content manager", "Security", "Designer"];

/// Password given to every demo user.
pub const DEMO_PASSWORD: &str = "password123";

const FIRST_NAMES: &[&str] = &[
    "Olena", "Taras", "Iryna", "Andrii", "Oksana", "Dmytro", "Kateryna", "Mykola", "Yulia",
    "Serhii", "Natalia", "Bohdan", "Sofiia", "Oleh", "Mariia", "Vasyl",
];

const LAST_NAMES: &[&str] = &[
    "Shevchenko", "Kovalenko", "Bondarenko", "Tkachenko", "Kravchenko", "Melnyk", "Boiko",
    "Oliinyk", "Lysenko", "Moroz", "Savchenko", "Rudenko",
];

/// Mobile operator codes used for generated phone numbers.
const OPERATOR_CODES: &[&str] = &["50", "63", "66", "67", "68", "73", "93", "95", "96", "97"];

/// Generated identity of a demo user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoIdentity {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Generate `count` identities with distinct emails and phones.
pub fn demo_identities(rng: &mut impl Rng, count: usize) -> Vec<DemoIdentity> {
    let mut phones = HashSet::with_capacity(count);
    let mut identities = Vec::with_capacity(count);

    for index in 0..count {
        let first = FIRST_NAMES.choose(rng).copied().unwrap_or("Demo");
        let last = LAST_NAMES.choose(rng).copied().unwrap_or("User");

        let phone = loop {
            let code = OPERATOR_CODES.choose(rng).copied().unwrap_or("50");
            let candidate = format!("+380{code}{:07}", rng.random_range(0..10_000_000));
            if phones.insert(candidate.clone()) {
                break candidate;
            }
        };

        identities.push(DemoIdentity {
            name: format!("{first} {last}"),
            email: format!(
                "{}.{}{}@example.com",
                first.to_lowercase(),
                last.to_lowercase(),
                index + 1
            ),
            phone,
        });
    }

    identities
}

/// Insert the position catalogue, skipping names that already exist.
///
/// # Errors
///
/// Returns an error if the database is unreachable or an insert fails.
pub async fn positions() -> Result<(), CommandError> {
    let pool = roster_api::db::create_pool(&database_url()?).await?;

    let mut inserted = 0_u64;
    for name in POSITIONS {
        let result =
            sqlx::query("INSERT INTO positions (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                .bind(name)
                .execute(&pool)
                .await?;
        inserted += result.rows_affected();
    }

    info!(inserted, total = POSITIONS.len(), "Positions seeded");
    Ok(())
}

/// Normalize the seed photo once; every user gets a copy of the result.
async fn load_photo(path: &Path) -> Result<Vec<u8>, CommandError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| CommandError::Photo(format!("{}: {e}", path.display())))?;

    let rules = PhotoConfig {
        allowed_formats: vec![PhotoFormat::Jpeg, PhotoFormat::Png],
        max_bytes: usize::MAX,
        ..PhotoConfig::default()
    };

    tokio::task::spawn_blocking(move || {
        let photo =
            validate_upload(&bytes, &rules).map_err(|e| CommandError::Photo(e.to_string()))?;
        cover_thumbnail(&photo.image).map_err(|e| CommandError::Photo(e.to_string()))
    })
    .await
    .map_err(|e| CommandError::Photo(e.to_string()))?
}

/// Insert `count` demo users, each with its own copy of `photo`.
///
/// Users whose email or phone already exists are skipped.
///
/// # Errors
///
/// Returns an error if there are no positions, the photo is unusable, or
/// the database or storage fails.
pub async fn users(count: usize, photo: &Path) -> Result<(), CommandError> {
    let pool = roster_api::db::create_pool(&database_url()?).await?;
    let users = PgUserStore::new(pool.clone());
    let positions = PgPositionStore::new(pool).list().await?;
    if positions.is_empty() {
        return Err(CommandError::NoPositions);
    }

    let storage_root = std::env::var("STORAGE_ROOT")
        .map_or_else(|_| PathBuf::from("storage/app/public"), PathBuf::from);
    let storage = LocalDiskStorage::new(storage_root, String::new());

    let thumbnail = load_photo(photo).await?;
    let password_hash =
        hash_password(DEMO_PASSWORD).map_err(|e| CommandError::InvalidData(e.to_string()))?;

    let identities = demo_identities(&mut rand::rng(), count);
    let mut created = 0_usize;

    for identity in identities {
        let position_id = positions
            .choose(&mut rand::rng())
            .map(|p| p.id)
            .ok_or(CommandError::NoPositions)?;

        let photo_path = PhotoPath::generate();
        storage
            .put(&photo_path, &thumbnail)
            .await
            .map_err(|e| CommandError::Photo(e.to_string()))?;

        let new_user = NewUser {
            name: identity.name,
            email: Email::parse(&identity.email)
                .map_err(|e| CommandError::InvalidData(e.to_string()))?,
            phone: Phone::parse(&identity.phone)
                .map_err(|e| CommandError::InvalidData(e.to_string()))?,
            position_id,
            password_hash: Some(password_hash.clone()),
            photo: Some(photo_path.clone()),
            registration_timestamp: chrono::Utc::now().timestamp(),
        };
        let (_, token_hash) = generate_access_token();
        let token = NewAccessToken {
            name: ACCESS_TOKEN_NAME.to_owned(),
            token_hash,
        };

        match users.create(new_user, token).await {
            Ok((user, _)) => {
                created += 1;
                info!(user_id = %user.id, email = %user.email, "Seeded user");
            }
            Err(RepositoryError::Conflict { field }) => {
                warn!(%field, email = %identity.email, "Skipping user that already exists");
                if let Err(e) = storage.delete(&photo_path).await {
                    warn!(photo = %photo_path, error = %e, "Failed to delete unused photo");
                }
            }
            Err(e) => {
                let _ = storage.delete(&photo_path).await;
                return Err(e.into());
            }
        }
    }

    info!(created, requested = count, "Users seeded");
    Ok(())
}
