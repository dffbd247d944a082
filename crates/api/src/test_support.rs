//! Fixtures shared by unit tests: generated images, fake optimizers and
//! storage, and a fully wired in-memory application.

#![allow(clippy::unwrap_used)]

use std::io::Cursor;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use secrecy::SecretString;

use roster_core::PhotoPath;

use crate::config::{
    ApiConfig, CommandConfig, OptimizerConfig, PhotoConfig, RegistrationConfig, StorageConfig,
};
use crate::db::memory::{MemoryPositionStore, MemoryUserStore};
use crate::services::photo::{
    ImageOptimizer, LocalDiskStorage, OptimizeError, PhotoPipeline, PhotoStorage, StagedFile,
    StorageError,
};
use crate::services::registration::RegistrationGate;
use crate::state::AppState;

pub const BASE_URL: &str = "http://localhost:8000";

// =============================================================================
// Images
// =============================================================================

fn gradient(width: u32, height: u32) -> DynamicImage {
    #[allow(clippy::cast_possible_truncation)]
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    });
    DynamicImage::ImageRgb8(image)
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

/// A `width`x`height` JPEG.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&gradient(width, height), ImageFormat::Jpeg)
}

/// A 200x100 JPEG, left half red and right half blue, carrying an EXIF
/// Orientation of 6: viewers show it as 100x200 with red on top.
pub fn sideways_jpeg() -> Vec<u8> {
    let image = RgbImage::from_fn(200, 100, |x, _| {
        if x < 100 {
            Rgb([255, 0, 0])
        } else {
            Rgb([0, 0, 255])
        }
    });
    let jpeg = encode(&DynamicImage::ImageRgb8(image), ImageFormat::Jpeg);

    // Big-endian TIFF with one IFD entry: tag 0x0112, SHORT, count 1, value 6
    let mut exif = b"Exif\0\0MM\0\x2a\0\0\0\x08".to_vec();
    exif.extend_from_slice(&[0x00, 0x01]);
    exif.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
    exif.extend_from_slice(&[0x00, 0x06, 0x00, 0x00]);
    exif.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

    let segment_len = u16::try_from(exif.len() + 2).unwrap();
    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(&exif);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// A `width`x`height` PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&gradient(width, height), ImageFormat::Png)
}

/// Default upload rules staging into `temp_dir`.
pub fn photo_rules(temp_dir: PathBuf) -> PhotoConfig {
    PhotoConfig {
        temp_dir,
        ..PhotoConfig::default()
    }
}

// =============================================================================
// Fake collaborators
// =============================================================================

/// Optimizer that returns the staged bytes (or fixed bytes) and counts calls.
#[derive(Default)]
pub struct CopyOptimizer {
    pub calls: AtomicUsize,
    output: Option<Vec<u8>>,
}

impl CopyOptimizer {
    pub fn returning(output: Vec<u8>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            output: Some(output),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageOptimizer for CopyOptimizer {
    async fn optimize(&self, source: &StagedFile) -> Result<Vec<u8>, OptimizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.output {
            Some(bytes) => Ok(bytes.clone()),
            None => Ok(tokio::fs::read(source.path()).await?),
        }
    }
}

/// Optimizer that always answers like a service rejecting the key.
pub struct FailingOptimizer;

#[async_trait]
impl ImageOptimizer for FailingOptimizer {
    async fn optimize(&self, _source: &StagedFile) -> Result<Vec<u8>, OptimizeError> {
        Err(OptimizeError::Rejected {
            status: 401,
            body: r#"{"error":"Unauthorized"}"#.to_string(),
        })
    }
}

/// Storage whose writes always fail.
pub struct FailingStorage;

#[async_trait]
impl PhotoStorage for FailingStorage {
    async fn put(&self, path: &PhotoPath, _bytes: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::Io {
            path: path.to_string(),
            source: std::io::Error::other("disk full"),
        })
    }

    async fn exists(&self, _path: &PhotoPath) -> Result<bool, StorageError> {
        Ok(false)
    }

    async fn delete(&self, _path: &PhotoPath) -> Result<(), StorageError> {
        Ok(())
    }

    fn url(&self, path: &PhotoPath) -> String {
        format!("{BASE_URL}/storage/{path}")
    }
}

// =============================================================================
// Wired application
// =============================================================================

/// Configuration rooted in `root`, using a `cp` optimizer command.
pub fn test_config(root: &Path) -> ApiConfig {
    ApiConfig {
        database_url: SecretString::from("postgres://localhost/roster_test"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 8000,
        base_url: BASE_URL.to_string(),
        storage: StorageConfig {
            root: root.join("public"),
            public_url: format!("{BASE_URL}/storage"),
        },
        photo: photo_rules(root.join("tmp")),
        registration: RegistrationConfig::default(),
        optimizer: OptimizerConfig::Command(CommandConfig {
            program: "cp".to_string(),
            args: vec!["{input}".to_string(), "{output}".to_string()],
            timeout: Duration::from_secs(5),
        }),
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// Application state over in-memory stores and a temporary directory.
pub struct TestApp {
    pub dir: tempfile::TempDir,
    pub state: AppState,
    pub users: Arc<MemoryUserStore>,
    pub storage: Arc<LocalDiskStorage>,
}

impl TestApp {
    /// Copying optimizer, working stores.
    pub fn new() -> (Self, Arc<CopyOptimizer>) {
        let optimizer = Arc::new(CopyOptimizer::default());
        let app = Self::with(optimizer.clone(), Arc::new(MemoryUserStore::default()));
        (app, optimizer)
    }

    /// Custom optimizer and user store.
    pub fn with(optimizer: Arc<dyn ImageOptimizer>, users: Arc<MemoryUserStore>) -> Self {
        Self::configured(optimizer, users, |_| {})
    }

    /// Custom optimizer and user store, with a chance to adjust configuration.
    pub fn configured(
        optimizer: Arc<dyn ImageOptimizer>,
        users: Arc<MemoryUserStore>,
        adjust: impl FnOnce(&mut ApiConfig),
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        adjust(&mut config);

        let storage = Arc::new(LocalDiskStorage::new(
            config.storage.root.clone(),
            config.storage.public_url.clone(),
        ));
        let photos = PhotoPipeline::new(
            config.photo.clone(),
            optimizer,
            storage.clone() as Arc<dyn PhotoStorage>,
        );
        let gate = RegistrationGate::in_memory(config.registration.token_ttl);

        let state = AppState::from_parts(
            config,
            users.clone(),
            Arc::new(MemoryPositionStore::default()),
            gate,
            photos,
        );

        Self {
            dir,
            state,
            users,
            storage,
        }
    }

    /// Scratch directory of the photo pipeline.
    pub fn scratch_dir(&self) -> PathBuf {
        self.state.config().photo.temp_dir.clone()
    }

    /// Number of leftover scratch files.
    pub fn scratch_files(&self) -> usize {
        std::fs::read_dir(self.scratch_dir()).map_or(0, Iterator::count)
    }

    /// Number of stored photos.
    pub fn stored_photos(&self) -> usize {
        std::fs::read_dir(self.state.config().storage.root.join("photos"))
            .map_or(0, Iterator::count)
    }

    /// Poll until `expected` photos are stored, giving background deletions
    /// time to land, and return the final count.
    pub async fn settled_photo_count(&self, expected: usize) -> usize {
        for _ in 0..200 {
            if self.stored_photos() == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.stored_photos()
    }
}

/// Poll until a deletion scheduled in the background has landed.
pub async fn wait_until_gone(storage: &LocalDiskStorage, path: &PhotoPath) -> bool {
    for _ in 0..200 {
        if !storage.exists(path).await.unwrap() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// =============================================================================
// Request bodies
// =============================================================================

/// Minimal `multipart/form-data` encoder for router tests.
pub struct MultipartBody {
    boundary: String,
    body: Vec<u8>,
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self {
            boundary: "roster-test-boundary".to_string(),
            body: Vec::new(),
        }
    }
}

impl MultipartBody {
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Returns the `Content-Type` header value and the encoded body.
    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", self.boundary),
            self.body,
        )
    }
}
