//! External image optimizer seam.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::command::CommandOptimizer;
use super::normalize::THUMBNAIL_SIZE;
use super::staging::StagedFile;
use super::tinify::TinifyOptimizer;
use crate::config::OptimizerConfig;

/// Errors from an optimization attempt. Any of them fails the upload.
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("optimizer request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("optimizer rejected the image with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("optimizer response did not include a result")]
    MissingOutput,

    #[error("optimizer timed out after {0:?}")]
    Timeout(Duration),

    #[error("optimizer command failed: {0}")]
    Command(String),

    #[error("optimizer I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("optimizer output is not a {size}x{size} JPEG", size = THUMBNAIL_SIZE)]
    InvalidOutput,
}

/// Shrinks an already normalized JPEG without changing its dimensions.
#[async_trait]
pub trait ImageOptimizer: Send + Sync {
    /// Optimize the staged file and return the smaller encoding.
    async fn optimize(&self, source: &StagedFile) -> Result<Vec<u8>, OptimizeError>;
}

/// Build the optimizer selected in configuration.
///
/// # Errors
///
/// Returns `OptimizeError::Request` if the HTTP client cannot be built.
pub fn from_config(config: &OptimizerConfig) -> Result<Arc<dyn ImageOptimizer>, OptimizeError> {
    Ok(match config {
        OptimizerConfig::Tinify(tinify) => Arc::new(TinifyOptimizer::new(tinify)?),
        OptimizerConfig::Command(command) => Arc::new(CommandOptimizer::new(command.clone())),
    })
}
