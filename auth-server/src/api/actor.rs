use crate::errors::ApiError;
use crate::state::AppState;
use auth_engine::{token, Actor};
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::HeaderValue;
use log::warn;

/// Attaches the calling [`Actor`] to the request.
///
/// Without an `Authorization` header the caller is anonymous. A header that
/// does not carry a valid token minted by this server is rejected with 401.
pub(super) async fn actor_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let actor = match request.headers().get(http::header::AUTHORIZATION) {
        None => Actor::default(),
        Some(header) => match actor_from_header(&state, header) {
            Ok(actor) => actor,
            Err(err) => {
                warn!("Rejected Authorization header: {}", err.detail);
                return err.into_response();
            }
        },
    };

    request.extensions_mut().insert(actor);
    next.run(request).await
}

fn actor_from_header(state: &AppState, header: &HeaderValue) -> Result<Actor, ApiError> {
    let value = header
        .to_str()
        .map_err(|_| ApiError::unauthenticated("Authorization header is not valid ASCII"))?;
    let token = match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        _ => {
            return Err(ApiError::unauthenticated(
                "Authorization header must use the Bearer scheme",
            ))
        }
    };
    Ok(token::verify(&state.service.key, token)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::state::AppState;
    use auth_engine::models::GrantType;
    use axum::routing::get;
    use axum::{middleware, Extension, Json, Router};
    use http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn whoami(Extension(actor): Extension<Actor>) -> Json<Actor> {
        Json(actor)
    }

    async fn setup_actor_app() -> (Router, AppState) {
        let state = AppState::new(Settings::for_test()).await.unwrap();
        let app = Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                actor_middleware,
            ))
            .with_state(state.clone());
        (app, state)
    }

    async fn send_request(app: &Router, auth_header: Option<&str>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(value) = auth_header {
            builder = builder.header("Authorization", value);
        }
        let response = app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    fn mint_for(state: &AppState, actor: &Actor) -> String {
        token::mint(
            &state.service.key,
            actor,
            GrantType::ResourceOwnerPassword.metadata(),
            Duration::from_secs(60),
        )
        .unwrap()
        .access_token
    }

    #[tokio::test]
    async fn test_missing_header_is_anonymous() {
        let (app, _) = setup_actor_app().await;
        let (status, body) = send_request(&app, None).await;
        assert_eq!(status, StatusCode::OK);
        let actor: Actor = serde_json::from_slice(&body).unwrap();
        assert!(actor.is_anonymous());
    }

    #[tokio::test]
    async fn test_valid_token_yields_actor() {
        let (app, state) = setup_actor_app().await;
        let minted = Actor {
            uid: 12,
            client_id: "wiki".to_string(),
            login: "alice".to_string(),
            domain: "example.com".to_string(),
            scope: vec!["read:pages".to_string()],
        };
        let token = mint_for(&state, &minted);

        let (status, body) = send_request(&app, Some(&format!("Bearer {}", token))).await;
        assert_eq!(status, StatusCode::OK);
        let actor: Actor = serde_json::from_slice(&body).unwrap();
        assert_eq!(actor, minted);

        // The scheme is case-insensitive.
        let (status, _) = send_request(&app, Some(&format!("bearer {}", token))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_token_unauthorized() {
        let (app, _) = setup_actor_app().await;
        let (status, body) = send_request(&app, Some("Bearer not-a-token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "unauthenticated");
    }

    #[tokio::test]
    async fn test_token_from_other_server_unauthorized() {
        let (app, _) = setup_actor_app().await;
        let other = AppState::new(Settings::for_test()).await.unwrap();
        let token = mint_for(&other, &Actor::client_only("auth.example.com"));

        let (status, _) = send_request(&app, Some(&format!("Bearer {}", token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_non_bearer_scheme_unauthorized() {
        let (app, _) = setup_actor_app().await;
        for header in ["Basic YWxpY2U6d29uZGVybGFuZA==", "Bearer", "token"] {
            let (status, _) = send_request(&app, Some(header)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", header);
        }
    }
}
