mod actor;
pub(crate) mod auth;
pub(crate) mod health;

use crate::api::actor::actor_middleware;
use crate::state::AppState;
use axum::middleware;
use utoipa_axum::router::OpenApiRouter;

/// Combines all API routes into a single router
pub(super) fn router(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .merge(health::router())
        .merge(auth::public_router())
        .merge(actor_routes(state))
}

/// Routes that act on behalf of the caller identified by its bearer token
fn actor_routes(state: &AppState) -> OpenApiRouter<AppState> {
    auth::router().layer(middleware::from_fn_with_state(
        state.clone(),
        actor_middleware,
    ))
}
