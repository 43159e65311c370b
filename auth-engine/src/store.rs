use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AuthError, Result};
use crate::models::{
    AuthorizationCode, AuthorizationCodeRequest, LdapUser, NewAccount, RegisteredClient, User,
    UserPermissions, UserSpec,
};

/// Local (or federated) user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_uid(&self, uid: i32) -> Result<User>;

    async fn get_by_login(&self, login: &str) -> Result<User>;

    /// Create an account, reusing `account.uid` when set.
    ///
    /// Fails with `AlreadyExists` when the login or uid is taken.
    async fn create_account(&self, account: NewAccount) -> Result<UserSpec>;
}

#[async_trait]
pub trait PasswordStore: Send + Sync {
    /// `PermissionDenied` on mismatch
    async fn check_password(&self, uid: i32, password: &str) -> Result<()>;
}

/// Short-lived authorization codes.
#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    async fn create_auth_code(
        &self,
        req: &AuthorizationCodeRequest,
        ttl: Duration,
    ) -> Result<String>;

    /// Atomically mark `code` exchanged by `client_id` and return the request
    /// it was issued for. Must fail for a code that was already exchanged.
    async fn mark_exchanged(
        &self,
        code: &AuthorizationCode,
        client_id: &str,
    ) -> Result<AuthorizationCodeRequest>;
}

#[async_trait]
pub trait RegisteredClientStore: Send + Sync {
    async fn get(&self, client_id: &str) -> Result<RegisteredClient>;
}

/// Per-client permissions granted to users.
#[async_trait]
pub trait UserPermissionsStore: Send + Sync {
    async fn get(&self, uid: i32, client_id: &str) -> Result<UserPermissions>;

    /// Store permissions without checking that the caller administers the
    /// client. Only reachable through open enrollment.
    async fn set_non_strict(&self, perms: &UserPermissions) -> Result<()>;
}

/// Verifies a login against the directory (LDAP bind).
#[async_trait]
pub trait DirectoryVerifier: Send + Sync {
    async fn verify_login(&self, username: &str, password: &str) -> Result<LdapUser>;
}

/// The federated root identity server.
#[async_trait]
pub trait FederatedClient: Send + Sync {
    async fn get_user_by_email(&self, email: &str) -> Result<User>;

    async fn create_account(&self, account: &NewAccount) -> Result<UserSpec>;
}

/// Collaborator stores reachable by the service.
///
/// Optional collaborators are `None` when the deployment does not provide
/// them; operations that need one fail with `Unimplemented`.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub clients: Arc<dyn RegisteredClientStore>,
    pub passwords: Option<Arc<dyn PasswordStore>>,
    pub authorizations: Option<Arc<dyn AuthorizationStore>>,
    pub permissions: Option<Arc<dyn UserPermissionsStore>>,
    pub directory: Option<Arc<dyn DirectoryVerifier>>,
    pub federation: Option<Arc<dyn FederatedClient>>,
}

fn require<'a, T: ?Sized>(store: &'a Option<Arc<T>>, name: &str) -> Result<&'a Arc<T>> {
    store
        .as_ref()
        .ok_or_else(|| AuthError::Unimplemented(format!("{} store is not available", name)))
}

impl Stores {
    pub fn new(users: Arc<dyn UserStore>, clients: Arc<dyn RegisteredClientStore>) -> Self {
        Self {
            users,
            clients,
            passwords: None,
            authorizations: None,
            permissions: None,
            directory: None,
            federation: None,
        }
    }

    pub fn with_passwords(mut self, store: Arc<dyn PasswordStore>) -> Self {
        self.passwords = Some(store);
        self
    }

    pub fn with_authorizations(mut self, store: Arc<dyn AuthorizationStore>) -> Self {
        self.authorizations = Some(store);
        self
    }

    pub fn with_permissions(mut self, store: Arc<dyn UserPermissionsStore>) -> Self {
        self.permissions = Some(store);
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn DirectoryVerifier>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_federation(mut self, client: Arc<dyn FederatedClient>) -> Self {
        self.federation = Some(client);
        self
    }

    pub fn passwords(&self) -> Result<&Arc<dyn PasswordStore>> {
        require(&self.passwords, "password")
    }

    pub fn authorizations(&self) -> Result<&Arc<dyn AuthorizationStore>> {
        require(&self.authorizations, "authorization")
    }

    pub fn directory(&self) -> Result<&Arc<dyn DirectoryVerifier>> {
        require(&self.directory, "directory")
    }

    pub fn federation(&self) -> Result<&Arc<dyn FederatedClient>> {
        require(&self.federation, "federation")
    }
}

impl fmt::Debug for Stores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stores")
            .field("passwords", &self.passwords.is_some())
            .field("authorizations", &self.authorizations.is_some())
            .field("permissions", &self.permissions.is_some())
            .field("directory", &self.directory.is_some())
            .field("federation", &self.federation.is_some())
            .finish_non_exhaustive()
    }
}
