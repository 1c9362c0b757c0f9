//! API handlers for the listing service.
//!
//! Listing routes are permission gated through [`auth::PermissionGate`];
//! registration, activation and token issuance are open, and the healthcheck
//! is only subject to rate limiting.

pub mod ads;
pub mod auth;
pub mod health;
pub mod tokens;
pub mod users;
