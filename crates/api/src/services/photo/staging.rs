//! Scoped temporary files for in-flight images.
//!
//! Every file handed out is owned by a [`StagedFile`] guard that deletes it
//! when dropped, so no exit path of the pipeline can leak scratch data.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// Directory holding per-request scratch files.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    /// Create a staging area rooted at `dir`. The directory is created lazily.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of the area.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` to a freshly named `<uuid>.jpg` file.
    ///
    /// The guard is created on the blocking thread that writes the file, so
    /// if the caller is dropped mid-write the guard outlives the write and
    /// still removes the file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created or the file
    /// cannot be written. A partially written file is removed.
    pub async fn stage(&self, bytes: &[u8]) -> io::Result<StagedFile> {
        let dir = self.dir.clone();
        let bytes = bytes.to_vec();

        let file = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir)?;
            let file = StagedFile::new(&dir);
            std::fs::write(file.path(), &bytes)?;
            debug!(path = %file.path().display(), bytes = bytes.len(), "Staged image");
            Ok::<_, io::Error>(file)
        })
        .await
        .map_err(io::Error::other)??;

        Ok(file)
    }
}

/// A scratch file that is removed when this guard is dropped.
///
/// The file itself need not exist yet: a guard can reserve a path for a
/// tool to write to.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(format!("{}.jpg", Uuid::new_v4())),
        }
    }

    /// Location of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reserve another uniquely named path in the same directory.
    #[must_use]
    pub fn sibling(&self) -> Self {
        Self::new(self.path.parent().unwrap_or_else(|| Path::new(".")))
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed staged file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove staged file"
            ),
        }
    }
}
