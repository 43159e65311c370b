use axum::response::Response;
use chrono::{Duration, Utc};
use http::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
use http::HeaderValue;
use log::warn;

/// How intermediaries may cache a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Responses carrying codes or tokens. Sets `Pragma` and a past
    /// `Expires` for HTTP/1.0 caches.
    NoStore,
    /// Shareable responses, e.g. the published key set
    Public { max_age: u32 },
}

impl CachePolicy {
    pub fn cache_control(&self) -> HeaderValue {
        match self {
            CachePolicy::NoStore => HeaderValue::from_static("no-cache, no-store"),
            CachePolicy::Public { max_age } => {
                HeaderValue::from_str(&format!("public, max-age={max_age}"))
                    .unwrap_or(HeaderValue::from_static("public"))
            }
        }
    }

    pub fn apply(&self, response: &mut Response) {
        let headers = response.headers_mut();
        headers.insert(CACHE_CONTROL, self.cache_control());

        match self {
            CachePolicy::NoStore => {
                headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
                headers.insert(EXPIRES, HeaderValue::from_static("0"));
            }
            CachePolicy::Public { max_age } => {
                let expires = Utc::now() + Duration::seconds(i64::from(*max_age));
                match HeaderValue::from_str(&expires.to_rfc2822()) {
                    Ok(value) => {
                        headers.insert(EXPIRES, value);
                    }
                    Err(e) => warn!("failed to set expires header: {e}"),
                }
            }
        }
    }
}
