//! Photo storage path type.
//!
//! A [`PhotoPath`] is the logical key of a stored thumbnail, always of the form
//! `photos/<file name>.jpg`. It is what the `users.photo` column holds and what
//! the object storage layer is addressed with.

use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors that can occur when parsing a [`PhotoPath`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhotoPathError {
    /// The path is not under the `photos/` namespace.
    #[error("photo path must start with '{}'", PhotoPath::NAMESPACE)]
    WrongNamespace,
    /// The file name is empty, nested, or contains unsafe characters.
    #[error("photo file name is invalid")]
    InvalidFileName,
    /// The file does not carry the `.jpg` extension.
    #[error("photo file must have a .jpg extension")]
    NotJpeg,
}

/// Relative storage path of an optimized JPEG thumbnail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct PhotoPath(String);

impl PhotoPath {
    /// Storage namespace every photo lives under.
    pub const NAMESPACE: &'static str = "photos/";

    /// Extension of every stored thumbnail.
    pub const EXTENSION: &'static str = ".jpg";

    /// Generate a fresh, collision-resistant path (`photos/<uuid v4>.jpg`).
    #[must_use]
    pub fn generate() -> Self {
        Self(format!(
            "{}{}{}",
            Self::NAMESPACE,
            Uuid::new_v4(),
            Self::EXTENSION
        ))
    }

    /// Build the path for an already chosen file name such as `abc.jpg`.
    ///
    /// # Errors
    ///
    /// Returns a [`PhotoPathError`] if the file name is unsafe or not a JPEG.
    pub fn from_file_name(file_name: &str) -> Result<Self, PhotoPathError> {
        Self::parse(&format!("{}{file_name}", Self::NAMESPACE))
    }

    /// Parse a stored path.
    ///
    /// # Errors
    ///
    /// Returns a [`PhotoPathError`] if the path leaves the `photos/` namespace,
    /// nests directories, or does not end in `.jpg`.
    pub fn parse(s: &str) -> Result<Self, PhotoPathError> {
        let file_name = s
            .strip_prefix(Self::NAMESPACE)
            .ok_or(PhotoPathError::WrongNamespace)?;

        let stem = file_name
            .strip_suffix(Self::EXTENSION)
            .ok_or(PhotoPathError::NotJpeg)?;

        let safe = !stem.is_empty()
            && !stem.starts_with('.')
            && stem
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !safe {
            return Err(PhotoPathError::InvalidFileName);
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the full relative path (`photos/<file>.jpg`).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the file name without the namespace.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0
            .strip_prefix(Self::NAMESPACE)
            .unwrap_or(self.0.as_str())
    }
}

impl fmt::Display for PhotoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for PhotoPath {
    type Error = PhotoPathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhotoPath> for String {
    fn from(path: PhotoPath) -> Self {
        path.0
    }
}

impl AsRef<str> for PhotoPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
