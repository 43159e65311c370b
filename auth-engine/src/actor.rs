use serde::{Deserialize, Serialize};

/// The authenticated identity attached to a call.
///
/// Built once per inbound call by the transport (from a previously minted
/// access token) and passed by reference to every operation. A `uid` of 0
/// means no user is authenticated, only (at most) a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub uid: i32,
    pub client_id: String,
    pub login: String,
    pub domain: String,
    pub scope: Vec<String>,
}

impl Actor {
    /// An actor for a client acting without a user
    pub fn client_only(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Default::default()
        }
    }

    /// An actor for a user acting through a client
    pub fn user(uid: i32, client_id: impl Into<String>) -> Self {
        Self {
            uid,
            client_id: client_id.into(),
            ..Default::default()
        }
    }

    pub fn is_user(&self) -> bool {
        self.uid != 0
    }

    pub fn is_anonymous(&self) -> bool {
        self.uid == 0 && self.client_id.is_empty()
    }
}

/// Identity of the caller as reported by `identify`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub client_id: String,
    pub uid: i32,
    pub login: String,
    pub domain: String,
}

impl From<&Actor> for AuthInfo {
    fn from(actor: &Actor) -> Self {
        Self {
            client_id: actor.client_id.clone(),
            uid: actor.uid,
            login: actor.login.clone(),
            domain: actor.domain.clone(),
        }
    }
}
