use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

use crate::cache::QueryCache;
use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::models::{JobMatch, MatchFilter, MatchStats, MatchStatus, Profile};
use crate::session::Session;
use crate::transport::{ProgressFn, Transport};

/// The backend's HTTP contract, behind a trait so coordinators can be
/// exercised against a mock. No other module talks to the network.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// OAuth2 password login; returns the bearer token.
    async fn login(&self, email: &str, password: &str) -> Result<String, ClientError>;

    async fn fetch_matches(&self, filter: &MatchFilter) -> Result<Vec<JobMatch>, ClientError>;

    /// Matches already promoted to `applied`, as the server knows them.
    async fn fetch_applications(&self) -> Result<Vec<JobMatch>, ClientError>;

    async fn fetch_match_stats(&self) -> Result<MatchStats, ClientError>;

    async fn update_match_status(
        &self,
        match_id: i64,
        status: MatchStatus,
    ) -> Result<JobMatch, ClientError>;

    /// Hard delete: the match is permanently excluded from future matching.
    async fn delete_match(&self, match_id: i64) -> Result<(), ClientError>;

    async fn fetch_profile(&self) -> Result<Profile, ClientError>;

    async fn delete_profile(&self) -> Result<(), ClientError>;

    /// Multipart resume upload. `progress` observes the byte transfer;
    /// the HTTP exchange completing also covers server-side parsing.
    async fn upload_resume(
        &self,
        file_name: &str,
        mime: &str,
        payload: Bytes,
        progress: ProgressFn,
    ) -> Result<(), ClientError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Production implementation over [`Transport`].
pub struct HttpApi {
    transport: Transport,
}

impl HttpApi {
    pub fn new(config: &ClientConfig, session: Arc<Session>, cache: Arc<QueryCache>) -> Self {
        HttpApi {
            transport: Transport::new(config, session, cache),
        }
    }
}

#[async_trait]
impl JobApi for HttpApi {
    async fn login(&self, email: &str, password: &str) -> Result<String, ClientError> {
        let response: TokenResponse = self
            .transport
            .post_form("/user/login", &[("username", email), ("password", password)])
            .await?;
        Ok(response.access_token)
    }

    async fn fetch_matches(&self, filter: &MatchFilter) -> Result<Vec<JobMatch>, ClientError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(limit) = filter.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(offset) = filter.offset {
            query.push(("offset", offset.to_string()));
        }
        if let Some(min_relevance) = filter.min_relevance {
            query.push(("min_relevance", min_relevance.to_string()));
        }
        self.transport.get_json("/jobs/matches", &query).await
    }

    async fn fetch_applications(&self) -> Result<Vec<JobMatch>, ClientError> {
        self.transport.get_json("/jobs/applications", &[]).await
    }

    async fn fetch_match_stats(&self) -> Result<MatchStats, ClientError> {
        self.transport.get_json("/jobs/matches/stats", &[]).await
    }

    async fn update_match_status(
        &self,
        match_id: i64,
        status: MatchStatus,
    ) -> Result<JobMatch, ClientError> {
        self.transport
            .put_json(
                &format!("/jobs/matches/{match_id}/status"),
                &[("status", status.as_str().to_string())],
            )
            .await
    }

    async fn delete_match(&self, match_id: i64) -> Result<(), ClientError> {
        self.transport
            .delete(&format!("/jobs/matches/{match_id}"))
            .await
    }

    async fn fetch_profile(&self) -> Result<Profile, ClientError> {
        self.transport.get_json("/profile/", &[]).await
    }

    async fn delete_profile(&self) -> Result<(), ClientError> {
        self.transport.delete("/profile/").await
    }

    async fn upload_resume(
        &self,
        file_name: &str,
        mime: &str,
        payload: Bytes,
        progress: ProgressFn,
    ) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .transport
            .upload_multipart("/profile/upload-resume", "resume", file_name, mime, payload, progress)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::Utc;

    use crate::models::JobPosting;

    /// Scriptable in-memory backend for coordinator and pipeline tests.
    #[derive(Default)]
    pub struct MockApi {
        pub matches: Mutex<Vec<JobMatch>>,
        pub applications: Mutex<Vec<JobMatch>>,
        pub stats: Mutex<MatchStats>,
        pub profile: Mutex<Profile>,
        pub match_fetches: AtomicU32,
        pub status_calls: AtomicU32,
        pub delete_calls: AtomicU32,
        pub upload_calls: AtomicU32,
        /// Error returned (once) by the next status update.
        pub fail_next_status: Mutex<Option<ClientError>>,
        /// Error returned (once) by the next delete.
        pub fail_next_delete: Mutex<Option<ClientError>>,
        /// Error returned (once) by the next upload.
        pub fail_next_upload: Mutex<Option<ClientError>>,
        /// Artificial latency for mutations; used to hold one in flight.
        pub mutation_delay: Mutex<Option<Duration>>,
        /// Raw transfer percentages the mock upload reports.
        pub upload_progress_script: Mutex<Vec<u8>>,
    }

    impl MockApi {
        pub fn with_matches(matches: Vec<JobMatch>) -> Self {
            MockApi {
                matches: Mutex::new(matches),
                ..MockApi::default()
            }
        }

        async fn maybe_delay(&self) {
            let delay = *self.mutation_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Convenience fixture: a pending match with the given id and score.
    pub fn pending_match(id: i64, score: f64) -> JobMatch {
        JobMatch {
            id,
            user_id: 1,
            job_id: id * 100,
            relevance_score: score,
            created_at: Utc::now(),
            status: MatchStatus::Pending,
            job: JobPosting {
                id: id * 100,
                job_id: format!("ext-{id}"),
                job_title: Some(format!("Engineer {id}")),
                employer_name: Some("Acme".to_string()),
                job_city: Some("Berlin".to_string()),
                job_country: Some("DE".to_string()),
                job_employment_type: Some("FULLTIME".to_string()),
                job_is_remote: Some(true),
                job_min_salary: Some(60_000.0),
                job_max_salary: Some(90_000.0),
                job_salary_currency: Some("EUR".to_string()),
                job_salary_period: Some("YEAR".to_string()),
                job_posted_at_datetime_utc: Some(Utc::now()),
                job_apply_link: Some("https://example.com/apply".to_string()),
            },
        }
    }

    #[async_trait]
    impl JobApi for MockApi {
        async fn login(&self, _email: &str, _password: &str) -> Result<String, ClientError> {
            Ok("mock-token".to_string())
        }

        async fn fetch_matches(&self, filter: &MatchFilter) -> Result<Vec<JobMatch>, ClientError> {
            self.match_fetches.fetch_add(1, Ordering::SeqCst);
            let mut matches = self.matches.lock().unwrap().clone();
            if let Some(min) = filter.min_relevance {
                matches.retain(|m| m.relevance_score >= min);
            }
            Ok(matches)
        }

        async fn fetch_applications(&self) -> Result<Vec<JobMatch>, ClientError> {
            Ok(self.applications.lock().unwrap().clone())
        }

        async fn fetch_match_stats(&self) -> Result<MatchStats, ClientError> {
            Ok(self.stats.lock().unwrap().clone())
        }

        async fn update_match_status(
            &self,
            match_id: i64,
            status: MatchStatus,
        ) -> Result<JobMatch, ClientError> {
            self.maybe_delay().await;
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.fail_next_status.lock().unwrap().take() {
                return Err(err);
            }
            let mut matches = self.matches.lock().unwrap();
            let m = matches
                .iter_mut()
                .find(|m| m.id == match_id)
                .ok_or_else(|| ClientError::NotFound(format!("match {match_id}")))?;
            m.status = status;
            Ok(m.clone())
        }

        async fn delete_match(&self, match_id: i64) -> Result<(), ClientError> {
            self.maybe_delay().await;
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.fail_next_delete.lock().unwrap().take() {
                return Err(err);
            }
            self.matches.lock().unwrap().retain(|m| m.id != match_id);
            Ok(())
        }

        async fn fetch_profile(&self) -> Result<Profile, ClientError> {
            Ok(self.profile.lock().unwrap().clone())
        }

        async fn delete_profile(&self) -> Result<(), ClientError> {
            Ok(())
        }

        async fn upload_resume(
            &self,
            _file_name: &str,
            _mime: &str,
            _payload: Bytes,
            progress: ProgressFn,
        ) -> Result<(), ClientError> {
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            self.maybe_delay().await;
            for pct in self.upload_progress_script.lock().unwrap().iter() {
                progress(*pct);
            }
            if let Some(err) = self.fail_next_upload.lock().unwrap().take() {
                return Err(err);
            }
            Ok(())
        }
    }
}
