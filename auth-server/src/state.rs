use crate::config::{non_empty, ConfigError, Settings};
use crate::federation::{FederationError, HttpFederatedClient};
use auth_engine::keys::KeyError;
use auth_engine::memory::MemoryStores;
use auth_engine::models::{NewAccount, RegisteredClient};
use auth_engine::store::{FederatedClient, UserStore};
use auth_engine::{AuthError, AuthService, IdKey};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How often expired authorization codes are swept
const CODE_PURGE_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("signing key: {0}")]
    Key(#[from] KeyError),
    #[error("federation client: {0}")]
    Federation(#[from] FederationError),
    #[error("seeding stores: {0}")]
    Seed(#[from] AuthError),
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub service: Arc<AuthService>,
    /// The concrete stores behind `service`, for seeding
    pub stores: MemoryStores,
}

impl AppState {
    pub async fn new(settings: Settings) -> Result<Self, StartupError> {
        let key = Arc::new(load_key(&settings)?);

        let federation = match settings.federation.root_url()? {
            Some(root) => {
                info!("Federating with root server {}", root);
                let client: Arc<dyn FederatedClient> = Arc::new(HttpFederatedClient::new(
                    root,
                    key.clone(),
                    Duration::from_secs(settings.federation.timeout),
                    Duration::from_secs(settings.federation.connect_timeout),
                )?);
                Some(client)
            }
            None => None,
        };

        let stores = MemoryStores::new(settings.domain.clone());
        // Stops on its own once the last state clone is dropped.
        stores.authorizations.spawn_purger(CODE_PURGE_PERIOD);

        // This server is a client of itself: local logins go through it. Its
        // front end authenticates with assertions signed by the server key.
        let own_client = settings.get_redirect_uris().into_iter().fold(
            RegisteredClient::new(settings.server_id.clone()).with_jwks(key.public_jwks()),
            |client, uri| client.with_redirect_uri(uri),
        );
        stores.clients.register(own_client);

        let mut collaborators = stores.stores();
        if let Some(client) = federation {
            collaborators = collaborators.with_federation(client);
        }

        let flags = settings.auth_flags()?;
        if flags.is_ldap() && collaborators.directory.is_none() {
            warn!("No directory is configured; LDAP password logins will be refused");
        }
        let service = AuthService::new(collaborators, key, flags, settings.token_url()?);

        let state = Self {
            settings: Arc::new(settings),
            service: Arc::new(service),
            stores,
        };
        state.seed_admin().await?;
        Ok(state)
    }

    /// Creates the configured administrator account, if any
    async fn seed_admin(&self) -> Result<(), AuthError> {
        let Some((login, password)) = self.settings.admin.credentials() else {
            return Ok(());
        };
        let spec = UserStore::create_account(
            self.stores.users.as_ref(),
            NewAccount {
                login: login.to_string(),
                ..Default::default()
            },
        )
        .await?;
        self.stores.users.set_admin(spec.uid, true).await?;
        self.stores.passwords.set_password(spec.uid, password)?;
        info!("Created administrator {:?} with uid {}", spec.login, spec.uid);
        Ok(())
    }
}

fn load_key(settings: &Settings) -> Result<IdKey, KeyError> {
    match non_empty(&settings.signing_key_seed) {
        Some(seed) => IdKey::from_base64_seed(settings.server_id.clone(), seed),
        None => {
            warn!("AUTH_SIGNING_KEY_SEED is not set; tokens will not survive a restart");
            IdKey::generate(settings.server_id.clone())
        }
    }
}
