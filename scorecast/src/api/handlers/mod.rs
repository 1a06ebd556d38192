//! HTTP request handlers.
//!
//! - [`predictions`]: single and batch scoring behind the [`crate::auth::gate::Authenticated`] gate
//! - [`auth`]: access token issuance
//! - [`health`]: liveness probe
//!
//! Handlers return [`crate::errors::Error`], which converts to the appropriate status code and
//! a user-safe message.

pub mod auth;
pub mod health;
pub mod predictions;
