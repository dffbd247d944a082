//! Roster API library.
//!
//! User directory service: token-gated registration, paginated listing and
//! partial updates, with every uploaded photo normalized to a 70x70 JPEG
//! and passed through an external optimizer before it is stored.
//!
//! The crate is a library so that the router can be exercised in tests
//! against in-memory stores; `main.rs` wires it to `PostgreSQL`.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;
