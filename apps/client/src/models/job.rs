use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable server-issued job record. The client holds a read-only copy
/// and never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: i64,
    /// External posting identifier from the job-board aggregator.
    pub job_id: String,
    pub job_title: Option<String>,
    pub employer_name: Option<String>,
    pub job_city: Option<String>,
    pub job_country: Option<String>,
    pub job_employment_type: Option<String>,
    pub job_is_remote: Option<bool>,
    pub job_min_salary: Option<f64>,
    pub job_max_salary: Option<f64>,
    pub job_salary_currency: Option<String>,
    pub job_salary_period: Option<String>,
    pub job_posted_at_datetime_utc: Option<DateTime<Utc>>,
    pub job_apply_link: Option<String>,
}

/// Lifecycle status of a match. Monotonic in practice: the backend never
/// transitions a match back to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Applied,
    NotInterested,
}

impl MatchStatus {
    /// Wire value for the status-update endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::Applied => "applied",
            MatchStatus::NotInterested => "not_interested",
        }
    }
}

/// A scored pairing of the current user and a posting. Created only by the
/// backend's matching process; the client never fabricates one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMatch {
    pub id: i64,
    pub user_id: i64,
    pub job_id: i64,
    /// Relevance in [0.0, 1.0].
    pub relevance_score: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_status")]
    pub status: MatchStatus,
    pub job: JobPosting,
}

fn default_status() -> MatchStatus {
    MatchStatus::Pending
}

/// User-facing projection of an applied match. Display fields are
/// denormalized from the underlying match at the moment of transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    /// Identifier of the underlying match; deleting the application
    /// deletes this match server-side.
    pub match_id: i64,
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub applied_at: DateTime<Utc>,
    pub status: MatchStatus,
}

impl Application {
    /// Builds the projection at the moment a match transitions to applied.
    pub fn from_match(m: &JobMatch, applied_at: DateTime<Utc>) -> Self {
        Application {
            id: m.id,
            match_id: m.id,
            job_id: m.job.job_id.clone(),
            title: m
                .job
                .job_title
                .clone()
                .unwrap_or_else(|| "Unknown Position".to_string()),
            company: m
                .job
                .employer_name
                .clone()
                .unwrap_or_else(|| "Unknown Company".to_string()),
            applied_at,
            status: MatchStatus::Applied,
        }
    }
}

/// Query parameters for the match listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchFilter {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub min_relevance: Option<f64>,
}

/// Aggregate counters reported by the backend. `recent_matches` is
/// server-computed (last 24h) so client clock skew cannot distort it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchStats {
    pub total_matches: u64,
    pub high_relevance_jobs: u64,
    pub recent_matches: u64,
}
