use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Fixed storage key for the bearer token. Persistent [`TokenStore`]
/// implementations must store the credential under this name so a restart
/// resumes the same session.
pub const TOKEN_KEY: &str = "token";

/// Client-local credential storage. The token is opaque; expiry is
/// enforced by the backend, not inspected here.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str);
    fn clear(&self);
}

/// In-memory store. Default for embedding and tests; host shells that
/// want persistence supply their own [`TokenStore`].
#[derive(Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<String>>,
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn save(&self, token: &str) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.to_string());
    }

    fn clear(&self) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    SignedIn,
}

/// Process-wide session singleton: one credential shared by every
/// coordinator, observable through a watch channel.
pub struct Session {
    store: Arc<dyn TokenStore>,
    state: watch::Sender<AuthState>,
}

impl Session {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        let initial = if store.load().is_some() {
            AuthState::SignedIn
        } else {
            AuthState::SignedOut
        };
        let (state, _) = watch::channel(initial);
        Session { store, state }
    }

    pub fn token(&self) -> Option<String> {
        self.store.load()
    }

    pub fn is_signed_in(&self) -> bool {
        *self.state.borrow() == AuthState::SignedIn
    }

    /// Observe sign-in/sign-out transitions.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Records a freshly issued token after a successful login.
    pub fn store_token(&self, token: &str) {
        self.store.save(token);
        self.state.send_replace(AuthState::SignedIn);
        info!("session signed in");
    }

    /// User-initiated sign-out.
    pub fn logout(&self) {
        self.store.clear();
        self.state.send_replace(AuthState::SignedOut);
        info!("session signed out");
    }

    /// Credential rejected by the backend. Same terminal state as logout;
    /// logged at warn because it was not user-initiated.
    pub fn expire(&self) {
        if !self.is_signed_in() {
            debug!("expire on already signed-out session; ignoring");
            return;
        }
        self.store.clear();
        self.state.send_replace(AuthState::SignedOut);
        warn!("credential rejected by backend; session expired");
    }
}
