//! Photo ingestion pipeline.
//!
//! Turns an uploaded image into a stored 70x70 JPEG thumbnail:
//!
//! 1. **Validate** - size, encoding and dimensions ([`validate_upload`])
//! 2. **Normalize** - cover resize and JPEG re-encode at quality 90
//! 3. **Stage** - write to a uniquely named scratch file
//! 4. **Optimize** - hand the scratch file to the [`ImageOptimizer`]
//! 5. **Persist** - store the optimized bytes under `photos/<uuid>.jpg`
//!
//! Scratch files are owned by [`StagedFile`] guards, so every exit path
//! (success, optimizer failure, storage failure, cancellation) removes them.
//! Any stage failure aborts the upload; unoptimized bytes are never stored.
//! A stored photo that no row points at yet is held by a [`PhotoCleanup`]
//! guard until the write that references it commits.

mod command;
mod normalize;
mod optimizer;
mod staging;
mod storage;
mod tinify;
mod validate;

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use roster_core::PhotoPath;

use crate::config::PhotoConfig;

pub use command::CommandOptimizer;
pub use normalize::{JPEG_QUALITY, THUMBNAIL_SIZE, cover_thumbnail, is_thumbnail};
pub use optimizer::{ImageOptimizer, OptimizeError, from_config as optimizer_from_config};
pub use staging::{StagedFile, StagingArea};
pub use storage::{LocalDiskStorage, PhotoStorage, StorageError};
pub use tinify::TinifyOptimizer;
pub use validate::{PhotoFormat, PhotoRejection, ValidatedPhoto, validate_upload};

/// Errors from the photo pipeline, by stage.
#[derive(Debug, Error)]
pub enum PhotoError {
    /// The upload failed validation. Nothing was written.
    #[error("invalid photo: {0}")]
    Invalid(#[from] PhotoRejection),

    /// Decoding, resizing or encoding failed.
    #[error("image processing failed: {0}")]
    Processing(String),

    /// The scratch file could not be written.
    #[error("staging failed: {0}")]
    Staging(#[source] std::io::Error),

    /// The optimizer failed or returned unusable output.
    #[error("image optimization failed: {0}")]
    Optimization(#[from] OptimizeError),

    /// The optimized image could not be stored.
    #[error("photo storage failed: {0}")]
    Storage(#[from] StorageError),
}

impl PhotoError {
    /// Stage-specific message safe to show to clients.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Invalid(rejection) => rejection.to_string(),
            Self::Processing(_) | Self::Staging(_) => "Image processing failed".to_owned(),
            Self::Optimization(_) => "Image optimization failed".to_owned(),
            Self::Storage(_) => "Photo storage failed".to_owned(),
        }
    }
}

/// Validates, normalizes, optimizes and stores user photos.
#[derive(Clone)]
pub struct PhotoPipeline {
    rules: Arc<PhotoConfig>,
    staging: StagingArea,
    optimizer: Arc<dyn ImageOptimizer>,
    storage: Arc<dyn PhotoStorage>,
}

impl PhotoPipeline {
    /// Create a pipeline staging into `rules.temp_dir`.
    #[must_use]
    pub fn new(
        rules: PhotoConfig,
        optimizer: Arc<dyn ImageOptimizer>,
        storage: Arc<dyn PhotoStorage>,
    ) -> Self {
        let staging = StagingArea::new(rules.temp_dir.clone());
        Self {
            rules: Arc::new(rules),
            staging,
            optimizer,
            storage,
        }
    }

    /// Upload rules in force.
    #[must_use]
    pub fn rules(&self) -> &PhotoConfig {
        &self.rules
    }

    /// Public URL of a stored photo.
    #[must_use]
    pub fn url(&self, path: &PhotoPath) -> String {
        self.storage.url(path)
    }

    /// Validate an upload off the async runtime.
    ///
    /// # Errors
    ///
    /// Returns `PhotoError::Invalid` if the upload is rejected.
    pub async fn inspect(&self, bytes: Vec<u8>) -> Result<ValidatedPhoto, PhotoError> {
        let rules = Arc::clone(&self.rules);
        let validated = tokio::task::spawn_blocking(move || validate_upload(&bytes, &rules))
            .await
            .map_err(|e| PhotoError::Processing(e.to_string()))??;
        Ok(validated)
    }

    /// Run a validated photo through normalize, stage, optimize and persist.
    ///
    /// # Errors
    ///
    /// Returns the `PhotoError` of the first stage that fails. No scratch
    /// file survives the call either way.
    #[instrument(skip_all, fields(format = ?photo.format, upload_bytes = photo.byte_len))]
    pub async fn ingest(&self, photo: ValidatedPhoto) -> Result<PhotoPath, PhotoError> {
        let thumbnail = tokio::task::spawn_blocking(move || cover_thumbnail(&photo.image))
            .await
            .map_err(|e| PhotoError::Processing(e.to_string()))?
            .map_err(|e| PhotoError::Processing(e.to_string()))?;

        let staged = self
            .staging
            .stage(&thumbnail)
            .await
            .map_err(PhotoError::Staging)?;

        let optimized = self.optimizer.optimize(&staged).await?;
        drop(staged);

        if !is_thumbnail(&optimized) {
            return Err(OptimizeError::InvalidOutput.into());
        }

        let path = PhotoPath::generate();
        self.storage.put(&path, &optimized).await?;

        info!(
            photo = %path,
            thumbnail_bytes = thumbnail.len(),
            optimized_bytes = optimized.len(),
            "Photo stored"
        );
        Ok(path)
    }

    /// Guard `path` so it is deleted unless [`PhotoCleanup::keep`] is called.
    pub fn cleanup(&self, path: PhotoPath) -> PhotoCleanup {
        PhotoCleanup {
            pipeline: self.clone(),
            path: Some(path),
        }
    }

    /// Delete a stored photo if it still exists.
    ///
    /// Used for replaced photos and for compensating a failed database
    /// write. Failures are logged, never returned: the request outcome is
    /// already decided when this runs.
    pub async fn retire(&self, path: &PhotoPath) {
        let result = match self.storage.exists(path).await {
            Ok(true) => self.storage.delete(path).await,
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => info!(photo = %path, "Photo retired"),
            Err(e) => warn!(photo = %path, error = %e, "Failed to delete photo"),
        }
    }
}

/// A stored photo that is deleted again unless it is kept.
///
/// [`Self::run`] deletes it inline. Dropping the guard without calling
/// either method (a cancelled request) schedules the deletion on the runtime.
#[must_use = "dropping the guard deletes the photo"]
pub struct PhotoCleanup {
    pipeline: PhotoPipeline,
    path: Option<PhotoPath>,
}

impl PhotoCleanup {
    /// Keep the photo; a committed row now points at it.
    pub fn keep(mut self) {
        self.path = None;
    }

    /// Delete the photo now.
    pub async fn run(mut self) {
        if let Some(path) = &self.path {
            self.pipeline.retire(path).await;
        }
        self.path = None;
    }
}

impl Drop for PhotoCleanup {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pipeline = self.pipeline.clone();
                handle.spawn(async move { pipeline.retire(&path).await });
            }
            Err(_) => warn!(photo = %path, "No runtime left to delete abandoned photo"),
        }
    }
}
