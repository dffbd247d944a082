//! Core types for Roster.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod page;
pub mod phone;
pub mod photo;

pub use email::{Email, EmailError};
pub use id::*;
pub use page::{PageError, PageRequest, PageWindow};
pub use phone::{Phone, PhoneError};
pub use photo::{PhotoPath, PhotoPathError};
