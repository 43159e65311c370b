use crate::config::Settings;
use crate::create_app;
use crate::state::AppState;
use auth_engine::grants::USER_TOKEN_TTL;
use auth_engine::models::{GrantType, RegisteredClient, User};
use auth_engine::{token, Actor};
use axum::body::Body;
use axum::Router;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tower::ServiceExt;
use wiremock::MockServer;

/// Test fixture running the full application against in-memory stores.
///
/// Requests are sent straight to the router with `oneshot`; no socket is
/// bound. Use [`TestFixture::with_root`] when the federated root server
/// should be a mock.
///
/// # Examples
///
/// ```rust
/// #[tokio::test]
/// async fn test_login() {
///     let fixture = TestFixture::new().await;
///     fixture.seed_user(21, "alice", "wonderland").await;
///
///     let token = fixture.login("alice", "wonderland").await;
///     let response = fixture.get_as("/auth/identify", &token).await;
///     response.assert_ok();
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Shared state, for seeding stores and reading the signing key
    pub state: AppState,
    /// Configuration settings
    pub settings: Settings,
    /// Mock of the federated root server, when enabled
    pub root_mock: Option<MockServer>,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::setup_logger(LevelFilter::Debug);
        Self::from_settings(Settings::for_test(), None).await
    }

    /// Like [`TestFixture::new`] with federation pointed at a mock root
    pub async fn with_root() -> Self {
        Self::setup_logger(LevelFilter::Debug);
        let root_mock = MockServer::start().await;
        let settings = Settings::for_test_with_root(&root_mock);
        Self::from_settings(settings, Some(root_mock)).await
    }

    async fn from_settings(settings: Settings, root_mock: Option<MockServer>) -> Self {
        let state = AppState::new(settings.clone())
            .await
            .expect("Failed to create test state");
        let app = create_app(state.clone());
        Self {
            app,
            state,
            settings,
            root_mock,
        }
    }

    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    /// Adds a local user with a password
    pub async fn seed_user(&self, uid: i32, login: &str, password: &str) {
        self.state
            .stores
            .users
            .insert(User {
                uid,
                login: login.to_string(),
                domain: self.settings.domain.clone(),
                ..Default::default()
            })
            .await;
        self.state
            .stores
            .passwords
            .set_password(uid, password)
            .expect("Failed to hash password");
    }

    pub fn register_client(&self, client: RegisteredClient) {
        self.state.stores.clients.register(client);
    }

    /// A token identifying a client without a user
    pub fn client_token(&self, client_id: &str) -> String {
        token::mint(
            &self.state.service.key,
            &Actor::client_only(client_id),
            GrantType::BearerJwt.metadata(),
            USER_TOKEN_TTL,
        )
        .expect("Failed to mint client token")
        .access_token
    }

    /// Authenticates as this server's own client with a bearer-JWT
    /// assertion over HTTP
    pub async fn server_client_token(&self) -> String {
        let token_url = self.settings.token_url().expect("Invalid token URL");
        let assertion = self
            .state
            .service
            .key
            .bearer_assertion(token_url.as_str(), std::time::Duration::from_secs(60))
            .expect("Failed to sign assertion");
        let response = self
            .post("/oauth2/token", &serde_json::json!({ "bearer_jwt": assertion }))
            .await;
        response.assert_ok();
        response.json["access_token"]
            .as_str()
            .expect("Missing access_token")
            .to_string()
    }

    /// Logs a user in through this server's own client and returns their
    /// access token
    pub async fn login(&self, login: &str, password: &str) -> String {
        let web = self.server_client_token().await;
        let response = self
            .post_as(
                "/oauth2/token",
                &serde_json::json!({
                    "resource_owner_password": { "login": login, "password": password }
                }),
                &web,
            )
            .await;
        response.assert_ok();
        response.json["access_token"]
            .as_str()
            .expect("Missing access_token")
            .to_string()
    }

    pub fn request_builder(&self, method: Method, uri: impl AsRef<str>) -> http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri.as_ref())
            .header("Content-Type", "application/json")
    }

    /// Sends an anonymous GET request
    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri)
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Sends a GET request with a bearer token
    pub async fn get_as(&self, uri: impl AsRef<str>, bearer: &str) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri)
            .header("Authorization", format!("Bearer {}", bearer))
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Sends an anonymous POST request with a JSON body
    pub async fn post<T: Serialize>(&self, uri: impl AsRef<str>, body: &T) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let request = self
            .request_builder(Method::POST, uri)
            .body(Body::from(json_body))
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Sends a POST request with a JSON body and a bearer token
    pub async fn post_as<T: Serialize>(
        &self,
        uri: impl AsRef<str>,
        body: &T,
        bearer: &str,
    ) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let request = self
            .request_builder(Method::POST, uri)
            .header("Authorization", format!("Bearer {}", bearer))
            .body(Body::from(json_body))
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        TestResponse {
            status,
            headers,
            json,
        }
    }
}

/// Response from a test request with convenient access to status, headers
/// and JSON body.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Response body as JSON (empty object if absent or not JSON)
    pub json: Value,
}

impl TestResponse {
    /// # Panics
    ///
    /// Panics if the status code doesn't match the expected value.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }

    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).expect("Failed to deserialize response JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::models::IdentityResponse;

    #[tokio::test]
    async fn test_openapi_lists_routes() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/openapi.json").await;
        response.assert_ok();
        let paths = &response.json["paths"];
        for path in [
            "/auth/authorization-code",
            "/oauth2/token",
            "/auth/identify",
            "/auth/permissions",
            "/.well-known/jwks.json",
            "/health",
            "/ready",
        ] {
            assert!(paths.get(path).is_some(), "{} missing", path);
        }
    }

    #[tokio::test]
    async fn test_login_helper() {
        let fixture = TestFixture::new().await;
        fixture.seed_user(5, "carol", "pw").await;
        let token = fixture.login("carol", "pw").await;

        let identity: IdentityResponse = fixture.get_as("/auth/identify", &token).await.json_as();
        assert_eq!(identity.uid, 5);
        assert_eq!(identity.login, "carol");
        assert_eq!(identity.client_id, fixture.settings.server_id);
    }

    #[tokio::test]
    async fn test_root_mock_backs_federation() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, ResponseTemplate};

        let fixture = TestFixture::with_root().await;
        let root = fixture.root_mock.as_ref().unwrap();
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "root-token",
                "token_type": "Bearer",
            })))
            .mount(root)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/by-email/erin@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "uid": 9001,
                "login": "erin",
            })))
            .expect(1)
            .mount(root)
            .await;

        let federation = fixture.state.service.stores.federation().unwrap();
        let user = federation.get_user_by_email("erin@example.com").await.unwrap();
        assert_eq!(user.uid, 9001);
    }

    #[tokio::test]
    async fn test_unknown_route_not_found() {
        let fixture = TestFixture::new().await;
        fixture.get("/nope").await.assert_status(StatusCode::NOT_FOUND);
    }
}
