//! HTTP middleware and request guards.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Body limit (reject oversized uploads before buffering)
//!
//! Token gating is the [`RegistrationToken`] extractor. Handlers list it
//! after their path extractors, so a malformed ID never spends a token.

pub mod registration_token;
pub mod request_id;

pub use registration_token::RegistrationToken;
pub use request_id::request_id_middleware;
