use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Shared holder for the caller's bearer credential.
///
/// Clones are cheap and observe later token updates. Header construction
/// never fails: with no credential the map is simply empty, and the backend
/// is left to report any authorization failure.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    token: Arc<RwLock<Option<String>>>,
}

impl SessionContext {
    /// A context with no credential.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A context born with a credential.
    pub fn with_token(token: impl Into<String>) -> Self {
        let context = Self::default();
        context.set_token(token);
        context
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap() = Some(token.into());
    }

    pub fn clear_token(&self) {
        *self.token.write().unwrap() = None;
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().unwrap().clone()
    }

    /// Header map for an outgoing request: `Authorization: Bearer <token>`
    /// when a credential is held, otherwise empty.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = self.token() {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => {
                    warn!("bearer token is not a valid header value; request goes out unauthenticated");
                }
            }
        }
        headers
    }
}
