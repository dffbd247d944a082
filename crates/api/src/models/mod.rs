//! Domain models for the user directory.
//!
//! These are validated domain objects; database row types live next to the
//! queries in [`crate::db`].

pub mod user;

pub use user::{NewUser, Position, User, UserPatch, UserResource};
