use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::cache::CacheKey;
use crate::errors::ClientError;
use crate::lifecycle::LifecycleCoordinator;
use crate::models::{MatchStats, Profile};
use crate::state::ClientContext;

/// One render-ready snapshot for the dashboard's header cards.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardStats {
    pub total_matches: u64,
    /// Matches scored at or above the backend's 0.8 threshold.
    pub high_relevance_jobs: u64,
    /// Matches created in the last 24 hours, server-computed.
    pub recent_matches: u64,
    pub applied_count: usize,
    pub profile_strength_pct: u8,
}

/// Assembles the dashboard from cached reads. Counters come straight from
/// the backend; the applied count goes through the lifecycle coordinator
/// so a just-confirmed transition is counted before the server's
/// application listing catches up.
pub struct DashboardAggregator {
    ctx: ClientContext,
    lifecycle: Arc<LifecycleCoordinator>,
}

impl DashboardAggregator {
    pub fn new(ctx: ClientContext, lifecycle: Arc<LifecycleCoordinator>) -> Self {
        DashboardAggregator { ctx, lifecycle }
    }

    pub async fn load(&self) -> Result<DashboardStats, ClientError> {
        let stats = self.match_stats().await?;
        let applications = self.lifecycle.list_applications().await?;
        let profile = self.profile().await?;

        debug!(
            total = stats.total_matches,
            applied = applications.len(),
            "dashboard snapshot assembled"
        );
        Ok(DashboardStats {
            total_matches: stats.total_matches,
            high_relevance_jobs: stats.high_relevance_jobs,
            recent_matches: stats.recent_matches,
            applied_count: applications.len(),
            profile_strength_pct: profile.strength_pct(),
        })
    }

    /// Ticks on every cache invalidation; the UI reloads the snapshot
    /// when it fires rather than polling.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.ctx.cache.subscribe()
    }

    async fn match_stats(&self) -> Result<MatchStats, ClientError> {
        let api = Arc::clone(&self.ctx.api);
        self.ctx
            .cache
            .read_with(CacheKey::MatchStats, || async move {
                api.fetch_match_stats().await
            })
            .await
    }

    async fn profile(&self) -> Result<Profile, ClientError> {
        let api = Arc::clone(&self.ctx.api);
        self.ctx
            .cache
            .read_with(CacheKey::Profile, || async move {
                api.fetch_profile().await
            })
            .await
    }
}
