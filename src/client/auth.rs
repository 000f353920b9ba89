use parking_lot::RwLock;
use std::sync::Arc;

/// Source of the bearer token attached to outgoing requests.
///
/// Consulted on every send, so a token refreshed while mutations were queued
/// is the one used when they are replayed.
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// A token slot shared between the login flow and the transport.
#[derive(Clone, Default)]
pub struct SharedToken {
    inner: Arc<RwLock<Option<String>>>,
}

impl SharedToken {
    pub fn new(token: Option<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(token)),
        }
    }

    pub fn set_token(&self, token: &str) {
        *self.inner.write() = Some(token.to_string());
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}

impl TokenProvider for SharedToken {
    fn bearer_token(&self) -> Option<String> {
        self.inner.read().clone()
    }
}
