//! In-memory collaborator stores.
//!
//! Used by the tests and by standalone deployments that have no external
//! user database. The user store doubles as a [`FederatedClient`] so one
//! instance can play the root server for another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, error};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::error::{AuthError, Result};
use crate::models::{
    AuthorizationCode, AuthorizationCodeRequest, LdapUser, NewAccount, RegisteredClient, User,
    UserPermissions, UserSpec,
};
use crate::secure::random_token;
use crate::store::{
    AuthorizationStore, DirectoryVerifier, FederatedClient, PasswordStore, RegisteredClientStore,
    Stores, UserPermissionsStore, UserStore,
};

#[derive(Default)]
struct UserIndex {
    by_uid: HashMap<i32, User>,
    by_login: HashMap<String, i32>,
    next_uid: i32,
}

/// Users indexed by uid and login.
pub struct MemoryUserStore {
    domain: String,
    index: RwLock<UserIndex>,
}

impl MemoryUserStore {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            index: RwLock::new(UserIndex {
                next_uid: 1,
                ..Default::default()
            }),
        }
    }

    /// Insert or replace a user record as is
    pub async fn insert(&self, user: User) {
        let mut index = self.index.write().await;
        index.next_uid = index.next_uid.max(user.uid + 1);
        index.by_login.insert(user.login.clone(), user.uid);
        index.by_uid.insert(user.uid, user);
    }

    pub async fn set_admin(&self, uid: i32, admin: bool) -> Result<()> {
        let mut index = self.index.write().await;
        let user = index
            .by_uid
            .get_mut(&uid)
            .ok_or_else(|| AuthError::NotFound(format!("user {}", uid)))?;
        user.admin = admin;
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.by_uid.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_by_uid(&self, uid: i32) -> Result<User> {
        self.index
            .read()
            .await
            .by_uid
            .get(&uid)
            .cloned()
            .ok_or_else(|| AuthError::NotFound(format!("user {}", uid)))
    }

    async fn get_by_login(&self, login: &str) -> Result<User> {
        let index = self.index.read().await;
        index
            .by_login
            .get(login)
            .and_then(|uid| index.by_uid.get(uid))
            .cloned()
            .ok_or_else(|| AuthError::NotFound(format!("user {:?}", login)))
    }

    async fn create_account(&self, account: NewAccount) -> Result<UserSpec> {
        if account.login.is_empty() {
            return Err(AuthError::InvalidArgument("empty login".to_string()));
        }
        let mut index = self.index.write().await;
        if index.by_login.contains_key(&account.login) {
            return Err(AuthError::AlreadyExists(format!(
                "login {:?} is taken",
                account.login
            )));
        }
        let uid = match account.uid {
            Some(uid) if index.by_uid.contains_key(&uid) => {
                return Err(AuthError::AlreadyExists(format!("uid {} is taken", uid)));
            }
            Some(uid) => uid,
            None => index.next_uid,
        };
        index.next_uid = index.next_uid.max(uid + 1);

        let user = User {
            uid,
            login: account.login.clone(),
            domain: self.domain.clone(),
            admin: false,
            emails: if account.email.is_empty() {
                Vec::new()
            } else {
                vec![account.email.clone()]
            },
        };
        let spec = UserSpec::from(&user);
        index.by_login.insert(user.login.clone(), uid);
        index.by_uid.insert(uid, user);
        debug!("Created account {:?} with uid {}", spec.login, uid);
        Ok(spec)
    }
}

#[async_trait]
impl FederatedClient for MemoryUserStore {
    async fn get_user_by_email(&self, email: &str) -> Result<User> {
        let index = self.index.read().await;
        let mut users: Vec<&User> = index
            .by_uid
            .values()
            .filter(|u| u.emails.iter().any(|e| e.eq_ignore_ascii_case(email)))
            .collect();
        users.sort_by_key(|u| u.uid);
        users
            .first()
            .map(|u| (*u).clone())
            .ok_or_else(|| AuthError::NotFound(format!("no user with email {:?}", email)))
    }

    async fn create_account(&self, account: &NewAccount) -> Result<UserSpec> {
        UserStore::create_account(self, account.clone()).await
    }
}

/// Hash a password with argon2id and a fresh salt, as a PHC string.
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Internal(format!("hashing password: {}", e)))
}

/// Verify `password` against a PHC string off the async runtime.
async fn verify_password(password: &str, hash: String) -> bool {
    let password = password.to_string();
    let verified = tokio::task::spawn_blocking(move || match PasswordHash::new(&hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            error!("Stored password hash is malformed: {}", e);
            false
        }
    })
    .await;
    verified.unwrap_or(false)
}

/// Argon2id password hashes keyed by uid.
#[derive(Default)]
pub struct MemoryPasswordStore {
    hashes: DashMap<i32, String>,
}

impl MemoryPasswordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_password(&self, uid: i32, password: &str) -> Result<()> {
        self.hashes.insert(uid, hash_password(password)?);
        Ok(())
    }
}

#[async_trait]
impl PasswordStore for MemoryPasswordStore {
    async fn check_password(&self, uid: i32, password: &str) -> Result<()> {
        let stored = self.hashes.get(&uid).map(|hash| hash.value().clone());
        let matches = match stored {
            Some(hash) => verify_password(password, hash).await,
            None => false,
        };
        if matches {
            Ok(())
        } else {
            Err(AuthError::PermissionDenied(format!(
                "bad password for user {}",
                uid
            )))
        }
    }
}

struct StoredCode {
    request: AuthorizationCodeRequest,
    expires_at: DateTime<Utc>,
    exchanged: bool,
}

/// Sweep expired codes on every this many issued codes
const PURGE_EVERY: usize = 256;

/// Authorization codes with single-use exchange.
///
/// Exchanged codes are kept until they expire so a replay is refused as
/// already exchanged rather than unknown. Expired codes are swept every
/// [`PURGE_EVERY`] issued codes and by [`Self::spawn_purger`].
#[derive(Default)]
pub struct MemoryAuthorizationStore {
    codes: DashMap<String, StoredCode>,
    issued: AtomicUsize,
}

impl MemoryAuthorizationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Drop expired codes, exchanged or not, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.codes.len();
        self.codes.retain(|_, stored| stored.expires_at > now);
        before.saturating_sub(self.codes.len())
    }

    /// Purge expired codes every `period` until the store is dropped.
    pub fn spawn_purger(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(store) = store.upgrade() else {
                    debug!("Authorization store dropped, stopping purger");
                    break;
                };
                let removed = store.purge_expired();
                if removed > 0 {
                    debug!("Purged {} expired authorization codes", removed);
                }
            }
        })
    }
}

#[async_trait]
impl AuthorizationStore for MemoryAuthorizationStore {
    async fn create_auth_code(
        &self,
        req: &AuthorizationCodeRequest,
        ttl: Duration,
    ) -> Result<String> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| AuthError::InvalidArgument(format!("invalid code lifetime: {}", e)))?;
        let code = random_token();
        self.codes.insert(
            code.clone(),
            StoredCode {
                request: req.clone(),
                expires_at: Utc::now() + ttl,
                exchanged: false,
            },
        );
        if self.issued.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            self.purge_expired();
        }
        Ok(code)
    }

    async fn mark_exchanged(
        &self,
        code: &AuthorizationCode,
        client_id: &str,
    ) -> Result<AuthorizationCodeRequest> {
        let not_found = || AuthError::NotFound("authorization code".to_string());

        // The shard stays write-locked for the whole check-and-mark.
        let mut stored = self.codes.get_mut(&code.code).ok_or_else(not_found)?;
        if stored.expires_at <= Utc::now() {
            drop(stored);
            self.codes.remove(&code.code);
            return Err(not_found());
        }
        if stored.exchanged {
            return Err(AuthError::PermissionDenied(
                "authorization code was already exchanged".to_string(),
            ));
        }
        if stored.request.client_id != client_id {
            return Err(AuthError::PermissionDenied(
                "authorization code was issued to another client".to_string(),
            ));
        }
        if stored.request.redirect_uri != code.redirect_uri {
            return Err(AuthError::PermissionDenied(
                "redirect URI does not match the authorization request".to_string(),
            ));
        }
        stored.exchanged = true;
        Ok(stored.request.clone())
    }
}

/// Registered clients keyed by id.
#[derive(Default)]
pub struct MemoryClientStore {
    clients: DashMap<String, RegisteredClient>,
}

impl MemoryClientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, client: RegisteredClient) {
        self.clients.insert(client.id.clone(), client);
    }
}

#[async_trait]
impl RegisteredClientStore for MemoryClientStore {
    async fn get(&self, client_id: &str) -> Result<RegisteredClient> {
        self.clients
            .get(client_id)
            .map(|c| c.value().clone())
            .ok_or_else(|| AuthError::NotFound(format!("registered client {:?}", client_id)))
    }
}

/// Per-client user permissions.
#[derive(Default)]
pub struct MemoryPermissionsStore {
    grants: DashMap<(i32, String), UserPermissions>,
}

impl MemoryPermissionsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, perms: UserPermissions) {
        self.grants
            .insert((perms.uid, perms.client_id.clone()), perms);
    }

    pub fn contains(&self, uid: i32, client_id: &str) -> bool {
        self.grants.contains_key(&(uid, client_id.to_string()))
    }
}

#[async_trait]
impl UserPermissionsStore for MemoryPermissionsStore {
    async fn get(&self, uid: i32, client_id: &str) -> Result<UserPermissions> {
        Ok(self
            .grants
            .get(&(uid, client_id.to_string()))
            .map(|p| p.value().clone())
            .unwrap_or_else(|| UserPermissions::none(uid, client_id)))
    }

    async fn set_non_strict(&self, perms: &UserPermissions) -> Result<()> {
        self.grant(perms.clone());
        Ok(())
    }
}

struct DirectoryEntry {
    hash: String,
    user: LdapUser,
}

/// A fixed set of directory identities, standing in for an LDAP server.
#[derive(Default)]
pub struct StaticDirectory {
    entries: DashMap<String, DirectoryEntry>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, user: LdapUser, password: &str) -> Result<()> {
        let hash = hash_password(password)?;
        self.entries
            .insert(user.username.clone(), DirectoryEntry { hash, user });
        Ok(())
    }
}

#[async_trait]
impl DirectoryVerifier for StaticDirectory {
    async fn verify_login(&self, username: &str, password: &str) -> Result<LdapUser> {
        let entry = self
            .entries
            .get(username)
            .map(|entry| (entry.hash.clone(), entry.user.clone()));
        match entry {
            Some((hash, user)) if verify_password(password, hash.clone()).await => Ok(user),
            _ => Err(AuthError::PermissionDenied(format!(
                "directory bind failed for {:?}",
                username
            ))),
        }
    }
}

/// Every in-memory store, kept as concrete types for seeding.
#[derive(Clone)]
pub struct MemoryStores {
    pub users: Arc<MemoryUserStore>,
    pub clients: Arc<MemoryClientStore>,
    pub passwords: Arc<MemoryPasswordStore>,
    pub authorizations: Arc<MemoryAuthorizationStore>,
    pub permissions: Arc<MemoryPermissionsStore>,
}

impl MemoryStores {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            users: Arc::new(MemoryUserStore::new(domain)),
            clients: Arc::new(MemoryClientStore::new()),
            passwords: Arc::new(MemoryPasswordStore::new()),
            authorizations: Arc::new(MemoryAuthorizationStore::new()),
            permissions: Arc::new(MemoryPermissionsStore::new()),
        }
    }

    /// A [`Stores`] with every in-memory store attached; directory and
    /// federation are left for the caller.
    pub fn stores(&self) -> Stores {
        Stores::new(self.users.clone(), self.clients.clone())
            .with_passwords(self.passwords.clone())
            .with_authorizations(self.authorizations.clone())
            .with_permissions(self.permissions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_request(client_id: &str, redirect_uri: &str) -> AuthorizationCodeRequest {
        AuthorizationCodeRequest {
            response_type: "code".to_string(),
            client_id: client_id.to_string(),
            uid: 5,
            redirect_uri: redirect_uri.to_string(),
            scope: vec![],
        }
    }

    fn presented(code: &str, redirect_uri: &str) -> AuthorizationCode {
        AuthorizationCode {
            code: code.to_string(),
            redirect_uri: redirect_uri.to_string(),
        }
    }

    #[tokio::test]
    async fn test_user_store_assigns_sequential_ids() {
        let store = MemoryUserStore::new("example.com");
        let a = UserStore::create_account(
            &store,
            NewAccount {
                login: "alice".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let b = UserStore::create_account(
            &store,
            NewAccount {
                login: "bob".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(a.uid, 1);
        assert_eq!(b.uid, 2);
        assert_eq!(a.domain, "example.com");
        assert_eq!(store.get_by_login("bob").await.unwrap().uid, 2);
    }

    #[tokio::test]
    async fn test_user_store_rejects_duplicates() {
        let store = MemoryUserStore::new("example.com");
        let account = NewAccount {
            login: "alice".to_string(),
            uid: Some(40),
            ..Default::default()
        };
        let spec = UserStore::create_account(&store, account.clone())
            .await
            .unwrap();
        assert_eq!(spec.uid, 40);

        let err = UserStore::create_account(&store, account).await.unwrap_err();
        assert!(err.is_already_exists());

        let err = UserStore::create_account(
            &store,
            NewAccount {
                login: "other".to_string(),
                uid: Some(40),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(err.is_already_exists());

        // Explicit ids move the sequence forward.
        let next = UserStore::create_account(
            &store,
            NewAccount {
                login: "carol".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(next.uid, 41);
    }

    #[tokio::test]
    async fn test_user_store_lookup_by_email() {
        let store = MemoryUserStore::new("root.example.com");
        FederatedClient::create_account(
            &store,
            &NewAccount {
                login: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password: "pw".to_string(),
                uid: None,
            },
        )
        .await
        .unwrap();

        let user = store.get_user_by_email("alice@example.com").await.unwrap();
        assert_eq!(user.login, "alice");
        assert!(store
            .get_user_by_email("bob@example.com")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_password_store() {
        let store = MemoryPasswordStore::new();
        store.set_password(3, "correct horse").unwrap();
        assert!(store.check_password(3, "correct horse").await.is_ok());

        let err = store.check_password(3, "battery staple").await.unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied(_)));
        assert!(store.check_password(4, "correct horse").await.is_err());
    }

    #[tokio::test]
    async fn test_code_exchanged_once() {
        let store = MemoryAuthorizationStore::new();
        let code = store
            .create_auth_code(&code_request("web", ""), Duration::from_secs(300))
            .await
            .unwrap();

        let req = store.mark_exchanged(&presented(&code, ""), "web").await.unwrap();
        assert_eq!(req.uid, 5);

        let err = store
            .mark_exchanged(&presented(&code, ""), "web")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_code_bound_to_client_and_redirect() {
        let store = MemoryAuthorizationStore::new();
        let code = store
            .create_auth_code(
                &code_request("web", "https://web.example.com/cb"),
                Duration::from_secs(300),
            )
            .await
            .unwrap();

        assert!(store
            .mark_exchanged(&presented(&code, "https://web.example.com/cb"), "cli")
            .await
            .is_err());
        assert!(store
            .mark_exchanged(&presented(&code, "https://web.example.com/cb2"), "web")
            .await
            .is_err());
        // Failed attempts do not consume the code.
        assert!(store
            .mark_exchanged(&presented(&code, "https://web.example.com/cb"), "web")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unknown_and_expired_codes_not_found() {
        let store = MemoryAuthorizationStore::new();
        let err = store
            .mark_exchanged(&presented("nope", ""), "web")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let code = store
            .create_auth_code(&code_request("web", ""), Duration::ZERO)
            .await
            .unwrap();
        let err = store
            .mark_exchanged(&presented(&code, ""), "web")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.purge_expired(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_exchange_single_winner() {
        let store = Arc::new(MemoryAuthorizationStore::new());
        let code = store
            .create_auth_code(&code_request("web", ""), Duration::from_secs(300))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let code = code.clone();
            handles.push(tokio::spawn(async move {
                store.mark_exchanged(&presented(&code, ""), "web").await.is_ok()
            }));
        }
        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_permissions_store_defaults_to_none() {
        let store = MemoryPermissionsStore::new();
        let perms = store.get(9, "wiki").await.unwrap();
        assert!(!perms.any());
        assert!(!store.contains(9, "wiki"));

        let mut granted = UserPermissions::none(9, "wiki");
        granted.read = true;
        store.set_non_strict(&granted).await.unwrap();
        assert!(store.get(9, "wiki").await.unwrap().read);
    }

    #[tokio::test]
    async fn test_static_directory() {
        let dir = StaticDirectory::new();
        dir.add(
            LdapUser {
                username: "dana".to_string(),
                emails: vec!["dana@corp.example.com".to_string()],
            },
            "s3cret",
        )
        .unwrap();
        let user = dir.verify_login("dana", "s3cret").await.unwrap();
        assert_eq!(user.emails.len(), 1);
        assert!(dir.verify_login("dana", "wrong").await.is_err());
        assert!(dir.verify_login("erin", "s3cret").await.is_err());
    }

    #[tokio::test]
    async fn test_password_hashes_are_salted() {
        let store = MemoryPasswordStore::new();
        store.set_password(1, "hunter2").unwrap();
        store.set_password(2, "hunter2").unwrap();

        let first = store.hashes.get(&1).unwrap().clone();
        let second = store.hashes.get(&2).unwrap().clone();
        assert!(first.starts_with("$argon2id$"));
        assert_ne!(first, second);
        assert!(!first.contains("hunter2"));

        assert!(store.check_password(1, "hunter2").await.is_ok());
        assert!(store.check_password(2, "hunter2").await.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_hash_never_matches() {
        let store = MemoryPasswordStore::new();
        store.hashes.insert(8, "not-a-phc-string".to_string());
        assert!(store.check_password(8, "not-a-phc-string").await.is_err());
    }

    #[tokio::test]
    async fn test_purge_removes_expired_and_exchanged_codes() {
        let store = MemoryAuthorizationStore::new();
        let mut exchanged = Vec::new();
        for _ in 0..10 {
            let code = store
                .create_auth_code(&code_request("web", ""), Duration::from_millis(200))
                .await
                .unwrap();
            store.mark_exchanged(&presented(&code, ""), "web").await.unwrap();
            exchanged.push(code);
        }
        for _ in 0..10 {
            store
                .create_auth_code(&code_request("web", ""), Duration::from_millis(1))
                .await
                .unwrap();
        }
        let live = store
            .create_auth_code(&code_request("web", ""), Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(store.len(), 21);

        // Still refused as a replay until it expires.
        let err = store
            .mark_exchanged(&presented(&exchanged[0], ""), "web")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied(_)));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(store.purge_expired(), 20);
        assert_eq!(store.len(), 1);
        assert!(store.mark_exchanged(&presented(&live, ""), "web").await.is_ok());
    }

    #[tokio::test]
    async fn test_issuing_codes_sweeps_expired_ones() {
        let store = MemoryAuthorizationStore::new();
        for _ in 0..PURGE_EVERY - 1 {
            store
                .create_auth_code(&code_request("web", ""), Duration::ZERO)
                .await
                .unwrap();
        }
        assert_eq!(store.len(), PURGE_EVERY - 1);

        store
            .create_auth_code(&code_request("web", ""), Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_purger_runs_until_store_dropped() {
        let store = Arc::new(MemoryAuthorizationStore::new());
        store
            .create_auth_code(&code_request("web", ""), Duration::from_millis(1))
            .await
            .unwrap();
        let purger = store.spawn_purger(Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.is_empty());
        assert!(!purger.is_finished());

        drop(store);
        tokio::time::timeout(Duration::from_secs(1), purger)
            .await
            .unwrap()
            .unwrap();
    }
}
