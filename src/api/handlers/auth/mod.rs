//! Identity and authorization.
//!
//! Bearer tokens are opaque 26-character strings; only their SHA-256 digests
//! reach storage. Every request resolves to a [`principal::Principal`] in the
//! `authenticate` middleware, and handlers walk the ladder in
//! [`permission::PermissionGate`] before touching data.
//!
//! ## Token scopes
//!
//! - `activation`: issued at registration, valid for 3 days, consumed by
//!   `PUT /v1/users/activated`.
//! - `authentication`: issued by `POST /v1/tokens/authentication`, valid for
//!   24 hours, presented as `Authorization: Bearer <token>`.

pub(crate) mod password;
pub mod permission;
pub mod principal;
pub mod storage;
pub mod token;

pub use permission::{ADS_READ, ADS_WRITE, AuthzError, PermissionGate, PermissionSet};
pub use principal::{AuthError, AuthenticatedUser, Principal, TokenAuthenticator};
pub use token::{Scope, Token, TokenHash};
