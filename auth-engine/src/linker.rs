//! Linking directory (LDAP) identities with federated root accounts.
//!
//! A linked pair is two user records, one local and one on the root server,
//! that share a uid. Email is the join key: the first directory email that
//! matches a root account wins, otherwise a root account is created for the
//! first email. The local record is then created with the root uid.
//!
//! The steps are not transactional. A failure after the root account is
//! created leaves it unlinked, but it carries the directory user's first
//! email so the next login finds and links it instead of creating another.
//! Two concurrent first logins by the same user race on the local create;
//! the loser re-reads the winner's record and accepts it when the uids agree.

use log::{debug, info};

use crate::error::{AuthError, Result};
use crate::models::{LdapUser, NewAccount, User, UserSpec};
use crate::secure::random_string;
use crate::service::AuthService;
use crate::store::{FederatedClient, UserStore};

const LOGIN_SUFFIX_LEN: usize = 6;
const PASSWORD_LEN: usize = 20;

fn require_email(ldap_user: &LdapUser) -> Result<&str> {
    ldap_user.emails.first().map(String::as_str).ok_or_else(|| {
        AuthError::FailedPrecondition(format!(
            "directory account {:?} must have an email address to log in",
            ldap_user.username
        ))
    })
}

/// Link `ldap_user` with a root account and materialize the local user.
pub async fn link_accounts(
    users: &dyn UserStore,
    federation: &dyn FederatedClient,
    ldap_user: &LdapUser,
) -> Result<User> {
    let first_email = require_email(ldap_user)?;

    let mut linked = None;
    for email in &ldap_user.emails {
        match federation.get_user_by_email(email).await {
            Ok(user) => {
                debug!(
                    "Directory user {:?} matches root account {} by email",
                    ldap_user.username, user.uid
                );
                linked = Some((user.uid, email.clone()));
                break;
            }
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        }
    }

    // Local authentication goes through the directory; this password only
    // satisfies the account contracts and is never returned.
    let password = random_string(PASSWORD_LEN);

    let (federated_uid, common_email) = match linked {
        Some(found) => found,
        None => {
            let login = format!(
                "{}_{}",
                ldap_user.username,
                random_string(LOGIN_SUFFIX_LEN)
            );
            let spec = federation
                .create_account(&NewAccount {
                    login,
                    email: first_email.to_string(),
                    password: password.clone(),
                    uid: None,
                })
                .await?;
            info!(
                "Created root account {:?} (uid {}) for directory user {:?}",
                spec.login, spec.uid, ldap_user.username
            );
            (spec.uid, first_email.to_string())
        }
    };

    let created = users
        .create_account(NewAccount {
            login: ldap_user.username.clone(),
            email: common_email.clone(),
            password,
            uid: Some(federated_uid),
        })
        .await;
    let spec = match created {
        Ok(spec) => spec,
        Err(e) if e.is_already_exists() => {
            let existing = users.get_by_login(&ldap_user.username).await?;
            UserSpec::from(&existing)
        }
        Err(e) => return Err(e),
    };

    if spec.uid != federated_uid {
        return Err(AuthError::Internal(format!(
            "linked account uids do not match (local {}, root {})",
            spec.uid, federated_uid
        )));
    }

    info!(
        "Linked directory user {:?} with uid {}",
        ldap_user.username, spec.uid
    );
    Ok(User {
        uid: spec.uid,
        login: spec.login,
        domain: spec.domain,
        admin: false,
        emails: vec![common_email],
    })
}

impl AuthService {
    pub(crate) async fn link_ldap_user(&self, ldap_user: &LdapUser) -> Result<User> {
        require_email(ldap_user)?;
        let federation = self.stores.federation()?;
        link_accounts(self.stores.users.as_ref(), federation.as_ref(), ldap_user).await
    }
}
