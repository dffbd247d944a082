//! Roster Core - Shared types library.
//!
//! This crate provides the domain types used across all Roster components:
//! - `api` - The user-directory HTTP service
//! - `cli` - Command-line tools for migrations and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Validation of user-supplied identity fields lives
//! here so that the service and the seeder agree on what a valid record is.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, emails, phone numbers, photo paths and pagination

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
