//! Effective permissions of a user on a client.
//!
//! Resolution order, first match wins:
//!
//! 1. the server-wide allow-all-logins test flag grants read and write;
//! 2. a login through this server's own client id is local: read and write
//!    for any existing user, admin if the user record says so;
//! 3. the per-client permissions store;
//! 4. open enrollment, when the client's metadata has `allow-logins=all`.

use log::{debug, warn};

use crate::actor::Actor;
use crate::error::{AuthError, Result};
use crate::models::UserPermissions;
use crate::service::AuthService;

impl AuthService {
    pub async fn get_permissions(&self, actor: &Actor) -> Result<UserPermissions> {
        if actor.uid == 0 || actor.client_id.is_empty() {
            return Err(AuthError::Unauthenticated(
                "no authenticated actor or client".to_string(),
            ));
        }

        let mut perms = UserPermissions::none(actor.uid, &actor.client_id);

        if self.flags.allow_all_logins {
            perms.read = true;
            perms.write = true;
            return Ok(perms);
        }

        if actor.client_id == self.key.id {
            return match self.stores.users.get_by_uid(actor.uid).await {
                Ok(user) => {
                    perms.read = true;
                    perms.write = true;
                    perms.admin = user.admin;
                    Ok(perms)
                }
                Err(e) if e.is_not_found() => Ok(perms),
                Err(e) => Err(e),
            };
        }

        if let Some(store) = &self.stores.permissions {
            perms = store.get(actor.uid, &actor.client_id).await?;
        }
        if perms.any() {
            return Ok(perms);
        }

        let client = self.stores.clients.get(&actor.client_id).await?;
        if client.allows_all_logins() {
            perms.uid = actor.uid;
            perms.client_id = actor.client_id.clone();
            perms.read = true;
            perms.write = client.default_write_access();

            // Bypasses the client-admin check on purpose. Only reachable
            // when the client opted in with allow-logins=all.
            match &self.stores.permissions {
                Some(store) => {
                    store.set_non_strict(&perms).await?;
                    debug!(
                        "Enrolled user {} on client {:?} (write: {})",
                        actor.uid, actor.client_id, perms.write
                    );
                }
                None => warn!(
                    "Open enrollment of user {} on client {:?} not persisted: no permissions store",
                    actor.uid, actor.client_id
                ),
            }
        }
        Ok(perms)
    }
}
