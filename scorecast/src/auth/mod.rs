//! Authentication for the prediction API.
//!
//! Every prediction request must pass two independent checks:
//!
//! 1. **Access token** - a JWT in `Authorization: Bearer <token>`, verified for signature and
//!    expiry against the configured `secret_key`.
//! 2. **API key** - a static key in the configured header (default `X-API-Key`) that must match
//!    one of `auth.api_keys`.
//!
//! Failing either check produces a bare 401 "Unauthorized"; the specific reason is only logged.
//!
//! Access tokens are issued by `POST /auth/token` in exchange for a username and password
//! listed in `auth.users`.
//!
//! # Modules
//!
//! - [`gate`]: the [`gate::Authenticated`] extractor combining both checks
//! - [`password`]: Argon2 password hashing and verification
//! - [`session`]: JWT creation and verification
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use scorecast::auth::gate::Authenticated;
//!
//! async fn protected_handler(Authenticated(claims): Authenticated) -> String {
//!     format!("Hello, {}!", claims.sub)
//! }
//! ```

pub mod gate;
pub mod password;
pub mod session;
