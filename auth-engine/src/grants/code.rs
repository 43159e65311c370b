use log::debug;

use super::USER_TOKEN_TTL;
use crate::actor::Actor;
use crate::error::Result;
use crate::models::{AuthorizationCode, GrantType};
use crate::redirect::allow_redirect_uri;
use crate::service::AuthService;
use crate::token::{OAuthToken, mint};

impl AuthService {
    /// Redeem an authorization code on behalf of the calling client.
    pub(crate) async fn exchange_code(
        &self,
        actor: &Actor,
        code: &AuthorizationCode,
    ) -> Result<OAuthToken> {
        let authorizations = self.stores.authorizations()?;

        let client = self.stores.clients.get(&actor.client_id).await?;

        // Required when the code was requested with one.
        if !code.redirect_uri.is_empty() {
            allow_redirect_uri(&client.redirect_uris, &code.redirect_uri)?;
        }

        let req = authorizations.mark_exchanged(code, &actor.client_id).await?;
        debug!(
            "Exchanged authorization code of user {} for client {:?}",
            req.uid, req.client_id
        );

        let user = self.stores.users.get_by_uid(req.uid).await?;
        let subject = Actor {
            uid: user.uid,
            client_id: req.client_id,
            login: user.login,
            domain: user.domain,
            scope: req.scope,
        };
        mint(
            &self.key,
            &subject,
            GrantType::AuthorizationCode.metadata(),
            USER_TOKEN_TTL,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use url::Url;

    use crate::actor::Actor;
    use crate::error::AuthError;
    use crate::keys::IdKey;
    use crate::memory::MemoryStores;
    use crate::models::{
        AccessTokenRequest, AuthorizationCode, AuthorizationCodeRequest, Credentials,
        RegisteredClient, User,
    };
    use crate::service::{AuthFlags, AuthService};
    use crate::token;

    const SERVER_ID: &str = "auth.example.com";
    const CALLBACK: &str = "https://auth.example.com/login/callback";

    async fn service() -> AuthService {
        let mem = MemoryStores::new("example.com");
        mem.users
            .insert(User {
                uid: 4,
                login: "alice".to_string(),
                domain: "example.com".to_string(),
                ..Default::default()
            })
            .await;
        mem.clients
            .register(RegisteredClient::new(SERVER_ID).with_redirect_uri(CALLBACK));
        mem.clients.register(RegisteredClient::new("other"));
        AuthService::new(
            mem.stores(),
            Arc::new(IdKey::from_seed(SERVER_ID, [2u8; 32]).unwrap()),
            AuthFlags::default(),
            Url::parse("https://auth.example.com/oauth2/token").unwrap(),
        )
    }

    async fn issue(svc: &AuthService, redirect_uri: &str) -> AuthorizationCode {
        svc.get_authorization_code(
            &Actor::user(4, SERVER_ID),
            &AuthorizationCodeRequest {
                response_type: "code".to_string(),
                client_id: SERVER_ID.to_string(),
                uid: 4,
                redirect_uri: redirect_uri.to_string(),
                scope: vec!["profile".to_string()],
            },
        )
        .await
        .unwrap()
    }

    fn exchange(code: AuthorizationCode) -> AccessTokenRequest {
        AccessTokenRequest {
            credentials: Some(Credentials::AuthorizationCode(code)),
        }
    }

    #[tokio::test]
    async fn test_code_yields_token_for_requesting_user() {
        let svc = service().await;
        let code = issue(&svc, CALLBACK).await;

        let resp = svc
            .get_access_token(&Actor::client_only(SERVER_ID), &exchange(code))
            .await
            .unwrap();
        assert_eq!(resp.token_type, "Bearer");
        let secs = resp.expires_in_sec.unwrap();
        assert!(secs > 7 * 24 * 3600 - 60 && secs <= 7 * 24 * 3600);

        let subject = token::verify(&svc.key, &resp.access_token).unwrap();
        assert_eq!(subject.uid, 4);
        assert_eq!(subject.login, "alice");
        assert_eq!(subject.client_id, SERVER_ID);
        assert_eq!(subject.scope, vec!["profile".to_string()]);

        let claims = token::decode(&svc.key, &resp.access_token).unwrap();
        assert_eq!(
            claims.grant.get("GrantType").map(String::as_str),
            Some("AuthorizationCode")
        );
    }

    #[tokio::test]
    async fn test_code_exchanged_at_most_once() {
        let svc = service().await;
        let code = issue(&svc, "").await;
        let client = Actor::client_only(SERVER_ID);

        assert!(svc.get_access_token(&client, &exchange(code.clone())).await.is_ok());
        let err = svc
            .get_access_token(&client, &exchange(code))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_unregistered_redirect_rejected() {
        let svc = service().await;
        let mut code = issue(&svc, CALLBACK).await;
        code.redirect_uri = format!("{}/", CALLBACK);

        let err = svc
            .get_access_token(&Actor::client_only(SERVER_ID), &exchange(code))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_other_client_cannot_redeem() {
        let svc = service().await;
        let code = issue(&svc, "").await;

        let err = svc
            .get_access_token(&Actor::client_only("other"), &exchange(code))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_unknown_code_not_found() {
        let svc = service().await;
        let code = AuthorizationCode {
            code: "made-up".to_string(),
            redirect_uri: String::new(),
        };
        let err = svc
            .get_access_token(&Actor::client_only(SERVER_ID), &exchange(code))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
