//! Bearer token sources for the event stream.
//!
//! The transport remembers the token of the last successful `connect` and
//! reuses it for reconnects. When that token is cleared (the server rejected
//! it), the next reconnect asks the [`TokenSource`] for a fresh one:
//!
//! ```rust,no_run
//! use skyclust_link::{DynamicTokenProvider, TokenSource};
//! use std::sync::Arc;
//!
//! struct SessionStore;
//!
//! #[async_trait::async_trait]
//! impl DynamicTokenProvider for SessionStore {
//!     async fn token(&self) -> skyclust_link::Result<String> {
//!         // refresh the access token here
//!         Ok("fresh-token".into())
//!     }
//! }
//!
//! let source = TokenSource::from(Arc::new(SessionStore) as Arc<dyn DynamicTokenProvider>);
//! ```

use crate::error::{LinkError, Result};
use std::sync::Arc;

/// Async token provider called whenever the transport needs a fresh token.
#[async_trait::async_trait]
pub trait DynamicTokenProvider: Send + Sync + 'static {
    async fn token(&self) -> Result<String>;
}

/// A boxed, reference-counted [`DynamicTokenProvider`].
pub type ArcDynTokenProvider = Arc<dyn DynamicTokenProvider>;

/// Where the transport gets bearer tokens from.
#[derive(Clone, Default)]
pub enum TokenSource {
    /// Fixed token set at construction time.
    Static(String),
    /// Provider called on every fetch.
    Dynamic(ArcDynTokenProvider),
    /// No source; reconnects rely on the token passed to `connect`.
    #[default]
    None,
}

impl TokenSource {
    pub fn token(token: impl Into<String>) -> Self {
        Self::Static(token.into())
    }

    /// Obtain a token, calling the dynamic provider if present.
    pub async fn fetch(&self) -> Result<String> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::Dynamic(provider) => provider.token().await,
            Self::None => Err(LinkError::AuthenticationError(
                "No token available and no token source configured".to_string(),
            )),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(_) => write!(f, "TokenSource::Static(<redacted>)"),
            Self::Dynamic(_) => write!(f, "TokenSource::Dynamic(<fn>)"),
            Self::None => write!(f, "TokenSource::None"),
        }
    }
}

impl From<ArcDynTokenProvider> for TokenSource {
    fn from(p: ArcDynTokenProvider) -> Self {
        Self::Dynamic(p)
    }
}

/// Attach `Authorization: Bearer <token>`; an empty token adds nothing.
pub(crate) fn apply_bearer(request: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
    if token.is_empty() {
        request
    } else {
        request.bearer_auth(token)
    }
}
