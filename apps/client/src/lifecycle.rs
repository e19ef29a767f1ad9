use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::CacheKey;
use crate::errors::ClientError;
use crate::models::{Application, JobMatch, MatchFilter, MatchStatus};
use crate::state::ClientContext;

/// Proof that the user explicitly confirmed a destructive operation.
/// The UI constructs one only after its confirmation dialog resolves;
/// the gate is a precondition, not an error path.
pub struct Confirmed;

/// Keys whose derived data any lifecycle mutation could affect.
/// Over-invalidation is preferred to stale data.
const MUTATION_KEYS: &[CacheKey] = &[
    CacheKey::Matches,
    CacheKey::Applications,
    CacheKey::MatchStats,
];

/// The three-way partition of known matches. An identifier belongs to
/// exactly one side at any quiescent point.
#[derive(Debug, Default)]
struct Partitions {
    active: Vec<JobMatch>,
    applied: Vec<Application>,
    removed: HashSet<i64>,
}

/// Identifier-level snapshot of the partition, for observers and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionView {
    pub active: Vec<i64>,
    pub applied: Vec<i64>,
    pub removed: Vec<i64>,
}

impl Partitions {
    fn view(&self) -> PartitionView {
        let mut active: Vec<i64> = self.active.iter().map(|m| m.id).collect();
        let mut applied: Vec<i64> = self.applied.iter().map(|a| a.match_id).collect();
        let mut removed: Vec<i64> = self.removed.iter().copied().collect();
        active.sort_unstable();
        applied.sort_unstable();
        removed.sort_unstable();
        PartitionView {
            active,
            applied,
            removed,
        }
    }
}

/// Owns the {active, applied, removed} partition and every mutation that
/// moves a match between sides. Mutations are locked per entity; a failed
/// mutation leaves the partition exactly as it was.
pub struct LifecycleCoordinator {
    ctx: ClientContext,
    partitions: Mutex<Partitions>,
    inflight: Arc<StdMutex<HashSet<i64>>>,
    /// Filter the cached match listing answers. A listing cached for one
    /// filter must never be served for a different one.
    listing_filter: StdMutex<Option<MatchFilter>>,
}

/// Releases the per-entity mutation lock when the operation finishes,
/// on any path out.
struct EntityGuard {
    inflight: Arc<StdMutex<HashSet<i64>>>,
    id: i64,
}

impl Drop for EntityGuard {
    fn drop(&mut self) {
        self.inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

impl LifecycleCoordinator {
    pub fn new(ctx: ClientContext) -> Self {
        LifecycleCoordinator {
            ctx,
            partitions: Mutex::new(Partitions::default()),
            inflight: Arc::new(StdMutex::new(HashSet::new())),
            listing_filter: StdMutex::new(None),
        }
    }

    fn lock_entity(&self, id: i64) -> Result<EntityGuard, ClientError> {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if !inflight.insert(id) {
            // The correct end state depends on which request the server
            // honors first; rejecting is safer than silently queueing.
            return Err(ClientError::Conflict(format!("match {id}")));
        }
        Ok(EntityGuard {
            inflight: Arc::clone(&self.inflight),
            id,
        })
    }

    /// Reads the active partition through the query cache. Matches the
    /// user removed or applied never reappear here, even if the server
    /// snapshot is older than the local mutation.
    pub async fn list_matches(
        &self,
        filter: Option<&MatchFilter>,
    ) -> Result<Vec<JobMatch>, ClientError> {
        let filter = filter.cloned().unwrap_or_default();
        let filter_changed = {
            let mut last = self
                .listing_filter
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if last.as_ref() != Some(&filter) {
                *last = Some(filter.clone());
                true
            } else {
                false
            }
        };
        if filter_changed {
            self.ctx.cache.invalidate(CacheKey::Matches).await;
        }

        let api = Arc::clone(&self.ctx.api);
        let fetched: Vec<JobMatch> = self
            .ctx
            .cache
            .read_with(CacheKey::Matches, || async move {
                api.fetch_matches(&filter).await
            })
            .await?;

        let mut parts = self.partitions.lock().await;
        let active: Vec<JobMatch> = fetched
            .into_iter()
            .filter(|m| {
                m.status == MatchStatus::Pending
                    && !parts.removed.contains(&m.id)
                    && !parts.applied.iter().any(|a| a.match_id == m.id)
            })
            .collect();
        parts.active = active.clone();
        Ok(active)
    }

    /// Reads the applied partition. The server snapshot is merged with
    /// locally confirmed transitions it may not reflect yet.
    pub async fn list_applications(&self) -> Result<Vec<Application>, ClientError> {
        let api = Arc::clone(&self.ctx.api);
        let fetched: Vec<JobMatch> = self
            .ctx
            .cache
            .read_with(CacheKey::Applications, || async move {
                api.fetch_applications().await
            })
            .await?;

        let mut parts = self.partitions.lock().await;
        let mut applications: Vec<Application> = fetched
            .iter()
            .filter(|m| !parts.removed.contains(&m.id))
            // The listing endpoint carries no applied timestamp, so the
            // match's creation time stands in. Locally confirmed
            // transitions below keep their actual transition time.
            .map(|m| Application::from_match(m, m.created_at))
            .collect();
        for app in &parts.applied {
            if !applications.iter().any(|a| a.match_id == app.match_id) {
                applications.push(app.clone());
            }
        }
        parts.applied = applications.clone();
        Ok(applications)
    }

    /// Promotes a match to `applied`.
    ///
    /// Idempotent: an already-applied identifier returns the existing
    /// projection without a network call. On success the match moves
    /// active -> applied under a single lock, so no observer ever sees it
    /// in both partitions or in neither.
    pub async fn move_to_applied(&self, match_id: i64) -> Result<Application, ClientError> {
        {
            let parts = self.partitions.lock().await;
            if let Some(existing) = parts.applied.iter().find(|a| a.match_id == match_id) {
                debug!(match_id, "already applied; returning existing projection");
                return Ok(existing.clone());
            }
            if parts.removed.contains(&match_id) {
                return Err(ClientError::NotFound(format!(
                    "match {match_id} was removed"
                )));
            }
        }

        let _guard = self.lock_entity(match_id)?;

        let source = self.find_active(match_id).await;
        let source = match source {
            Some(m) => m,
            None => {
                // Partition may simply not be populated yet.
                self.list_matches(None).await?;
                self.find_active(match_id)
                    .await
                    .ok_or_else(|| ClientError::NotFound(format!("match {match_id}")))?
            }
        };

        // No optimistic commit: partitions change only after the server
        // confirms. A failure here propagates with the state untouched.
        let confirmed = self
            .ctx
            .api
            .update_match_status(source.id, MatchStatus::Applied)
            .await?;

        let application = Application::from_match(&confirmed, Utc::now());
        {
            let mut parts = self.partitions.lock().await;
            parts.active.retain(|m| m.id != match_id);
            parts.applied.push(application.clone());
        }
        self.ctx.cache.invalidate_many(MUTATION_KEYS).await;
        info!(match_id, "match moved to applied");
        Ok(application)
    }

    /// Permanently removes a match from matching. Hard delete: the
    /// backend forgets the match entirely, so it can never be re-matched.
    pub async fn mark_not_interested(
        &self,
        match_id: i64,
        _confirmed: Confirmed,
    ) -> Result<(), ClientError> {
        let _guard = self.lock_entity(match_id)?;

        self.ctx.api.delete_match(match_id).await?;

        {
            let mut parts = self.partitions.lock().await;
            parts.active.retain(|m| m.id != match_id);
            parts.removed.insert(match_id);
        }
        self.ctx.cache.invalidate_many(MUTATION_KEYS).await;
        info!(match_id, "match marked not interested");
        Ok(())
    }

    /// Closes an application, deleting the underlying match server-side.
    /// Irreversible.
    pub async fn close_application(
        &self,
        application_id: i64,
        _confirmed: Confirmed,
    ) -> Result<(), ClientError> {
        let _guard = self.lock_entity(application_id)?;

        let match_id = {
            let parts = self.partitions.lock().await;
            parts
                .applied
                .iter()
                .find(|a| a.id == application_id)
                .map(|a| a.match_id)
                .ok_or_else(|| ClientError::NotFound(format!("application {application_id}")))?
        };

        self.ctx.api.delete_match(match_id).await?;

        {
            let mut parts = self.partitions.lock().await;
            parts.applied.retain(|a| a.id != application_id);
            parts.removed.insert(match_id);
        }
        self.ctx.cache.invalidate_many(MUTATION_KEYS).await;
        info!(application_id, match_id, "application closed");
        Ok(())
    }

    /// Identifier-level view of the current partition.
    pub async fn partition_view(&self) -> PartitionView {
        self.partitions.lock().await.view()
    }

    async fn find_active(&self, match_id: i64) -> Option<JobMatch> {
        self.partitions
            .lock()
            .await
            .active
            .iter()
            .find(|m| m.id == match_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use crate::api::mock::{pending_match, MockApi};

    fn coordinator_with(api: Arc<MockApi>) -> Arc<LifecycleCoordinator> {
        Arc::new(LifecycleCoordinator::new(ClientContext::with_api(api)))
    }

    #[tokio::test]
    async fn test_move_to_applied_moves_between_partitions() {
        // Scenario: a pending match with score 0.92 is applied to.
        let api = Arc::new(MockApi::with_matches(vec![
            pending_match(1, 0.92),
            pending_match(2, 0.55),
        ]));
        let coordinator = coordinator_with(Arc::clone(&api));

        let active = coordinator.list_matches(None).await.unwrap();
        assert_eq!(active.len(), 2);

        let application = coordinator.move_to_applied(1).await.unwrap();
        assert_eq!(application.match_id, 1);
        assert_eq!(application.status, MatchStatus::Applied);

        let view = coordinator.partition_view().await;
        assert_eq!(view.active, vec![2]);
        assert_eq!(view.applied, vec![1]);
        assert!(view.removed.is_empty());
        assert_eq!(api.status_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_move_to_applied_is_idempotent() {
        let api = Arc::new(MockApi::with_matches(vec![pending_match(1, 0.92)]));
        let coordinator = coordinator_with(Arc::clone(&api));
        coordinator.list_matches(None).await.unwrap();

        let first = coordinator.move_to_applied(1).await.unwrap();
        let second = coordinator.move_to_applied(1).await.unwrap();

        assert_eq!(first.match_id, second.match_id);
        assert_eq!(coordinator.partition_view().await.applied, vec![1]);
        // One applied entry, one network mutation, not two.
        assert_eq!(api.status_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_partitions_untouched() {
        let api = Arc::new(MockApi::with_matches(vec![pending_match(1, 0.9)]));
        *api.fail_next_status.lock().unwrap() = Some(ClientError::Server {
            status: 500,
            message: "boom".into(),
        });
        let coordinator = coordinator_with(Arc::clone(&api));
        coordinator.list_matches(None).await.unwrap();

        let before = coordinator.partition_view().await;
        let result = coordinator.move_to_applied(1).await;
        assert!(matches!(result, Err(ClientError::Server { .. })));

        let after = coordinator.partition_view().await;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_network_failure_on_delete_rolls_back() {
        let api = Arc::new(MockApi::with_matches(vec![pending_match(5, 0.7)]));
        *api.fail_next_delete.lock().unwrap() =
            Some(ClientError::Network("link changed".into()));
        let coordinator = coordinator_with(Arc::clone(&api));
        coordinator.list_matches(None).await.unwrap();

        let before = coordinator.partition_view().await;
        let result = coordinator.mark_not_interested(5, Confirmed).await;
        assert!(matches!(result, Err(ClientError::Network(_))));
        assert_eq!(coordinator.partition_view().await, before);

        // The entity lock was released; a retry can succeed.
        coordinator.mark_not_interested(5, Confirmed).await.unwrap();
        assert_eq!(coordinator.partition_view().await.removed, vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_mutation_on_same_entity_conflicts() {
        // Scenario: two concurrent not-interested calls on the same match;
        // exactly one deletion reaches the transport.
        let api = Arc::new(MockApi::with_matches(vec![pending_match(2, 0.8)]));
        *api.mutation_delay.lock().unwrap() = Some(Duration::from_secs(5));
        let coordinator = coordinator_with(Arc::clone(&api));
        coordinator.list_matches(None).await.unwrap();

        let background = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.mark_not_interested(2, Confirmed).await })
        };
        tokio::task::yield_now().await;

        let second = coordinator.mark_not_interested(2, Confirmed).await;
        assert!(matches!(second, Err(ClientError::Conflict(_))));

        background.await.unwrap().unwrap();
        assert_eq!(api.delete_calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.partition_view().await.removed, vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_entities_mutate_concurrently() {
        let api = Arc::new(MockApi::with_matches(vec![
            pending_match(1, 0.9),
            pending_match(2, 0.9),
        ]));
        *api.mutation_delay.lock().unwrap() = Some(Duration::from_secs(1));
        let coordinator = coordinator_with(Arc::clone(&api));
        coordinator.list_matches(None).await.unwrap();

        let first = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.mark_not_interested(1, Confirmed).await })
        };
        tokio::task::yield_now().await;

        // A different entity is not blocked by the in-flight mutation.
        coordinator.mark_not_interested(2, Confirmed).await.unwrap();
        first.await.unwrap().unwrap();

        let view = coordinator.partition_view().await;
        assert_eq!(view.removed, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_filter_change_refetches_instead_of_serving_cached_page() {
        let api = Arc::new(MockApi::with_matches(vec![
            pending_match(1, 0.95),
            pending_match(2, 0.3),
        ]));
        let coordinator = coordinator_with(Arc::clone(&api));

        let unfiltered = coordinator.list_matches(None).await.unwrap();
        assert_eq!(unfiltered.len(), 2);

        // A different filter must not be answered by the cached page.
        let filter = MatchFilter {
            min_relevance: Some(0.9),
            ..MatchFilter::default()
        };
        let filtered = coordinator.list_matches(Some(&filter)).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, 1);
        assert_eq!(api.match_fetches.load(Ordering::SeqCst), 2);

        // The same filter again is served from cache.
        let again = coordinator.list_matches(Some(&filter)).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(api.match_fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_removed_matches_never_reappear_in_active_list() {
        let api = Arc::new(MockApi::with_matches(vec![pending_match(3, 0.6)]));
        let coordinator = coordinator_with(Arc::clone(&api));
        coordinator.list_matches(None).await.unwrap();
        coordinator.mark_not_interested(3, Confirmed).await.unwrap();

        // Resurrect the match server-side to simulate a stale snapshot.
        api.matches.lock().unwrap().push(pending_match(3, 0.6));

        let active = coordinator.list_matches(None).await.unwrap();
        assert!(active.iter().all(|m| m.id != 3));
    }

    #[tokio::test]
    async fn test_close_application_removes_and_deletes_match() {
        let api = Arc::new(MockApi::with_matches(vec![pending_match(4, 0.85)]));
        let coordinator = coordinator_with(Arc::clone(&api));
        coordinator.list_matches(None).await.unwrap();
        let application = coordinator.move_to_applied(4).await.unwrap();

        coordinator
            .close_application(application.id, Confirmed)
            .await
            .unwrap();

        let view = coordinator.partition_view().await;
        assert!(view.applied.is_empty());
        assert_eq!(view.removed, vec![4]);
        assert_eq!(api.delete_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mutations_invalidate_cached_reads() {
        let api = Arc::new(MockApi::with_matches(vec![
            pending_match(1, 0.9),
            pending_match(2, 0.9),
        ]));
        let coordinator = coordinator_with(Arc::clone(&api));

        coordinator.list_matches(None).await.unwrap();
        coordinator.move_to_applied(1).await.unwrap();

        // The next listing refetches (cache was invalidated) and no
        // longer contains the applied match.
        let active = coordinator.list_matches(None).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, 2);
    }
}
