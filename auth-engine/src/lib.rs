//! # auth-engine
//!
//! Decision logic of the OAuth2 authorization server: issuing authorization
//! codes, exchanging credentials for access tokens, resolving per-client user
//! permissions and linking directory (LDAP) accounts with the federation root.
//!
//! ## Components
//!
//! - **Service:** [`AuthService`], the entry point for the four operations
//!   (`get_authorization_code`, `get_access_token`, `identify`,
//!   `get_permissions`). Every operation receives the calling [`Actor`]
//!   explicitly.
//! - **Grants:** one resolver per credential type (authorization code,
//!   resource-owner password, bearer JWT).
//! - **Token minting:** EdDSA-signed, time-boxed access tokens.
//! - **Stores:** async traits for the collaborators this crate consumes, with
//!   in-memory implementations in [`memory`].

pub mod actor;
pub mod error;
pub mod grants;
pub mod keys;
pub mod linker;
pub mod memory;
pub mod models;
pub mod permissions;
pub mod redirect;
pub mod secure;
pub mod service;
pub mod store;
pub mod token;

pub use crate::actor::{Actor, AuthInfo};
pub use crate::error::{AuthError, ErrorCode, Result};
pub use crate::keys::IdKey;
pub use crate::service::{AuthFlags, AuthService, AuthSource};
pub use crate::store::Stores;
