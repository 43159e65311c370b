use crate::error::{AuthError, Result};

/// Accept `uri` only if it is exactly one of the client's registered
/// redirect URIs. No prefix, wildcard, scheme or trailing-slash leniency.
pub fn allow_redirect_uri(allowed: &[String], uri: &str) -> Result<()> {
    if allowed.iter().any(|a| a == uri) {
        Ok(())
    } else {
        Err(AuthError::InvalidArgument(format!(
            "redirect URI {:?} is not registered for this client",
            uri
        )))
    }
}
