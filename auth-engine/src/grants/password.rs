use super::USER_TOKEN_TTL;
use crate::actor::Actor;
use crate::error::{AuthError, Result};
use crate::models::{GrantType, LoginCredentials};
use crate::service::{AuthService, AuthSource};
use crate::token::{OAuthToken, mint};

impl AuthService {
    /// Resource-owner password grant: the calling client vouches for a user
    /// by presenting their credentials.
    pub(crate) async fn authenticate_login(
        &self,
        actor: &Actor,
        creds: &LoginCredentials,
    ) -> Result<OAuthToken> {
        // Checked before any credential so the answer does not depend on
        // whether the password is right.
        if actor.is_user() {
            return Err(AuthError::PermissionDenied(format!(
                "refusing to issue access token from resource owner password to \
                 already authenticated user {} (only a client may be authenticated)",
                actor.uid
            )));
        }

        if actor.client_id.is_empty() {
            return Err(AuthError::Unauthenticated(
                "resource owner password grant needs an authenticated client".to_string(),
            ));
        }

        let lookup = self.stores.users.get_by_login(&creds.login).await;

        let user = match self.flags.source {
            AuthSource::Ldap => {
                let existing = match lookup {
                    Ok(user) => Some(user),
                    Err(e) if e.is_not_found() => None,
                    Err(e) => return Err(e),
                };
                let directory = self.stores.directory()?;
                let ldap_user = directory
                    .verify_login(&creds.login, &creds.password)
                    .await
                    .map_err(|e| {
                        AuthError::PermissionDenied(format!(
                            "directory authentication failed: {}",
                            e.message()
                        ))
                    })?;
                match existing {
                    Some(user) => user,
                    None => self.link_ldap_user(&ldap_user).await?,
                }
            }
            AuthSource::Local => {
                let user = lookup?;
                let passwords = self.stores.passwords()?;
                if passwords
                    .check_password(user.uid, &creds.password)
                    .await
                    .is_err()
                {
                    return Err(AuthError::PermissionDenied(format!(
                        "bad password for user {:?}",
                        creds.login
                    )));
                }
                user
            }
        };

        let subject = Actor {
            uid: user.uid,
            client_id: actor.client_id.clone(),
            login: user.login,
            domain: user.domain,
            scope: Vec::new(),
        };
        mint(
            &self.key,
            &subject,
            GrantType::ResourceOwnerPassword.metadata(),
            USER_TOKEN_TTL,
        )
    }
}
