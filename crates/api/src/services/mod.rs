//! Business logic services.
//!
//! - [`registration`] - Single-use registration tokens
//! - [`photo`] - Validate, normalize, optimize and store user photos
//! - [`users`] - Registration and update orchestration

pub mod photo;
pub mod registration;
pub mod users;

pub use photo::{PhotoError, PhotoPipeline};
pub use registration::RegistrationGate;
pub use users::{UserError, UserService};
