//! The produced interface of the authorization server.
//!
//! - `POST /auth/authorization-code`: a logged-in user asks for a code for a
//!   client
//! - `POST /oauth2/token`: exchange exactly one credential for an access token
//! - `GET /auth/identify`, `GET /auth/permissions`: introspection of the
//!   calling actor
//! - `GET /.well-known/jwks.json`: the public key tokens are signed with

pub mod handlers;
pub mod models;

use crate::state::AppState;
use utoipa_axum::router::OpenApiRouter;

/// Routes that need the calling actor
pub(super) fn router() -> OpenApiRouter<AppState> {
    handlers::actor_routes()
}

/// Routes that ignore the caller
pub(super) fn public_router() -> OpenApiRouter<AppState> {
    handlers::public_routes()
}
