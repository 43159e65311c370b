use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const AUTH_TAG: &str = "Authorization API";
pub(crate) const OAUTH2_TAG: &str = "OAuth2 API";

#[derive(OpenApi)]
#[openapi(
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = AUTH_TAG, description = "Authorization codes, identity and permissions"),
        (name = OAUTH2_TAG, description = "Token endpoint and published keys"),
    ),
    info(
        title = "Authorization Server API",
        description = "OAuth2 authorization server",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;
