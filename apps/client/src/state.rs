use std::sync::Arc;

use crate::api::{HttpApi, JobApi};
use crate::cache::{CacheKey, QueryCache};
use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::lifecycle::Confirmed;
use crate::session::{MemoryTokenStore, Session, TokenStore};

/// Shared client context injected into every coordinator.
///
/// One instance per process: the session and caches are deliberately
/// shared so an invalidation or a logout is globally visible the moment
/// it resolves.
#[derive(Clone)]
pub struct ClientContext {
    pub config: ClientConfig,
    pub session: Arc<Session>,
    pub cache: Arc<QueryCache>,
    pub api: Arc<dyn JobApi>,
}

impl ClientContext {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryTokenStore::default()))
    }

    /// Host shells that persist the credential supply their own store.
    pub fn with_store(config: ClientConfig, store: Arc<dyn TokenStore>) -> Self {
        let session = Arc::new(Session::new(store));
        let cache = Arc::new(QueryCache::new());
        let api = Arc::new(HttpApi::new(
            &config,
            Arc::clone(&session),
            Arc::clone(&cache),
        ));
        ClientContext {
            config,
            session,
            cache,
            api,
        }
    }

    /// Wires a scripted backend in place of HTTP.
    #[cfg(test)]
    pub(crate) fn with_api(api: Arc<dyn JobApi>) -> Self {
        let session = Arc::new(Session::new(Arc::new(MemoryTokenStore::default())));
        session.store_token("test-token");
        ClientContext {
            config: ClientConfig::default(),
            session,
            cache: Arc::new(QueryCache::new()),
            api,
        }
    }

    /// Exchanges credentials for a bearer token and signs the session in.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ClientError> {
        let token = self.api.login(email, password).await?;
        self.session.store_token(&token);
        Ok(())
    }

    /// User-initiated sign-out: credential and all cached state go.
    pub async fn logout(&self) {
        self.session.logout();
        self.cache.clear().await;
    }

    /// Deletes the stored profile, resume included. Irreversible; the
    /// caller must have cleared a confirmation dialog first.
    pub async fn delete_profile(&self, _confirmed: Confirmed) -> Result<(), ClientError> {
        self.api.delete_profile().await?;
        // Matching is driven by the profile, so every derived view is
        // suspect after this.
        self.cache
            .invalidate_many(&[
                CacheKey::Profile,
                CacheKey::Matches,
                CacheKey::Applications,
                CacheKey::MatchStats,
            ])
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::api::mock::MockApi;

    #[tokio::test]
    async fn test_login_and_logout_drive_the_session() {
        let ctx = ClientContext::with_api(Arc::new(MockApi::default()));
        assert!(ctx.session.is_signed_in());

        ctx.logout().await;
        assert!(!ctx.session.is_signed_in());
        assert!(ctx.session.token().is_none());

        ctx.login("user@example.com", "hunter2").await.unwrap();
        assert!(ctx.session.is_signed_in());
        assert_eq!(ctx.session.token().as_deref(), Some("mock-token"));
    }

    #[tokio::test]
    async fn test_delete_profile_invalidates_derived_caches() {
        let ctx = ClientContext::with_api(Arc::new(MockApi::default()));
        let fetches = AtomicU32::new(0);
        let fetch = || async {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok("profile".to_string())
        };

        let _: String = ctx.cache.read_with(CacheKey::Profile, fetch).await.unwrap();
        ctx.delete_profile(Confirmed).await.unwrap();
        let _: String = ctx.cache.read_with(CacheKey::Profile, fetch).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }
}
