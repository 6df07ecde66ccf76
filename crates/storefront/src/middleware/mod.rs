//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request tracing)
//! 3. Session layer (tower-sessions)
//! 4. Auth extractors (per handler)

pub mod auth;
pub mod session;

pub use auth::RequireAuth;
pub use session::create_session_layer;
