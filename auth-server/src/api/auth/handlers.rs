use super::models::{
    AuthorizationCodeBody, AuthorizationCodeResponse, ErrorResponse, IdentityResponse,
    PermissionsResponse, TokenRequestBody, TokenResponse,
};
use crate::errors::ApiError;
use crate::headers::CachePolicy;
use crate::openapi::{AUTH_TAG, OAUTH2_TAG};
use crate::state::AppState;
use auth_engine::Actor;
use axum::{
    extract::{Json, State},
    response::{IntoResponse, Response},
    Extension,
};
use utoipa_axum::{router::OpenApiRouter, routes};

/// Max age of the published key set in seconds
const JWKS_MAX_AGE: u32 = 300;

fn no_store(body: impl IntoResponse) -> Response {
    let mut response = body.into_response();
    CachePolicy::NoStore.apply(&mut response);
    response
}

#[utoipa::path(
    post,
    path = "/auth/authorization-code",
    tag = AUTH_TAG,
    request_body = AuthorizationCodeBody,
    params(
        ("Authorization" = String, Header, description = "Bearer token of the requesting user"),
    ),
    responses(
        (status = 200, description = "Authorization code issued", body = AuthorizationCodeResponse),
        (status = 400, description = "Invalid response type or redirect URI", body = ErrorResponse),
        (status = 403, description = "Caller is not the user, or the user may not log in to the client", body = ErrorResponse),
        (status = 404, description = "Unknown client", body = ErrorResponse),
    )
)]
pub(super) async fn authorization_code(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<AuthorizationCodeBody>,
) -> Result<Response, ApiError> {
    let code = state
        .service
        .get_authorization_code(&actor, &body.into())
        .await?;
    Ok(no_store(Json(AuthorizationCodeResponse::from(code))))
}

#[utoipa::path(
    post,
    path = "/oauth2/token",
    tag = OAUTH2_TAG,
    request_body = TokenRequestBody,
    params(
        ("Authorization" = Option<String>, Header, description = "Bearer token of the calling client, if any"),
    ),
    responses(
        (status = 200, description = "Access token issued", body = TokenResponse),
        (status = 400, description = "Malformed credential", body = ErrorResponse),
        (status = 401, description = "No credential, or one that failed verification", body = ErrorResponse),
        (status = 403, description = "Credential rejected", body = ErrorResponse),
        (status = 404, description = "Unknown code, user or client", body = ErrorResponse),
    )
)]
pub(super) async fn token(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<TokenRequestBody>,
) -> Result<Response, ApiError> {
    let resp = state.service.get_access_token(&actor, &body.into()).await?;
    Ok(no_store(Json(TokenResponse::from(resp))))
}

#[utoipa::path(
    get,
    path = "/auth/identify",
    tag = AUTH_TAG,
    responses(
        (status = 200, description = "Identity of the caller", body = IdentityResponse),
        (status = 401, description = "Invalid bearer token", body = ErrorResponse),
    )
)]
pub(super) async fn identify(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Json<IdentityResponse> {
    Json(state.service.identify(&actor).await.into())
}

#[utoipa::path(
    get,
    path = "/auth/permissions",
    tag = AUTH_TAG,
    responses(
        (status = 200, description = "Permissions of the calling user on the calling client", body = PermissionsResponse),
        (status = 401, description = "No user or client authenticated", body = ErrorResponse),
    )
)]
pub(super) async fn permissions(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<PermissionsResponse>, ApiError> {
    let perms = state.service.get_permissions(&actor).await?;
    Ok(Json(perms.into()))
}

#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    tag = OAUTH2_TAG,
    responses(
        (status = 200, description = "Public key set access tokens are signed with"),
    )
)]
pub(super) async fn jwks(State(state): State<AppState>) -> Response {
    let mut response = Json(state.service.key.jwks()).into_response();
    CachePolicy::Public {
        max_age: JWKS_MAX_AGE,
    }
    .apply(&mut response);
    response
}

pub(super) fn actor_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(authorization_code))
        .routes(routes!(token))
        .routes(routes!(identify))
        .routes(routes!(permissions))
}

pub(super) fn public_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(jwks))
}
