//! API request and response data models.
//!
//! These models define the public API contract and are annotated with `utoipa` for the
//! generated OpenAPI document.
//!
//! - [`predictions`]: prediction request shapes, response formatting and request validation
//! - [`auth`]: token issuance payloads

pub mod auth;
pub mod predictions;
