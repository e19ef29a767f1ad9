//! Client-side engine for the JobScout job-search assistant.
//!
//! Host shells (desktop, TUI, web view) embed this crate and drive it
//! through a handful of coordinators:
//!
//! - [`state::ClientContext`] wires the session, the query cache and the
//!   HTTP transport together; everything else borrows it.
//! - [`lifecycle::LifecycleCoordinator`] owns the active/applied/removed
//!   partition of job matches and every transition between sides.
//! - [`ingest::ResumePipeline`] validates and uploads resumes, reporting
//!   progress and classified rejections.
//! - [`dashboard::DashboardAggregator`] assembles the stats snapshot.
//!
//! All reads go through [`cache::QueryCache`]; all writes invalidate it.
//! The session's watch channel announces a forced logout to every
//! observer, so no individual call site handles expiry on its own.

pub mod api;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod errors;
pub mod ingest;
pub mod lifecycle;
pub mod models;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod transport;

pub use api::{HttpApi, JobApi};
pub use cache::{CacheKey, QueryCache};
pub use config::ClientConfig;
pub use dashboard::{DashboardAggregator, DashboardStats};
pub use errors::{ClientError, RecoveryAction, RejectionReason};
pub use ingest::{ResumePipeline, SelectedFile, UploadState};
pub use lifecycle::{Confirmed, LifecycleCoordinator, PartitionView};
pub use models::{
    Application, JobMatch, JobPosting, MatchFilter, MatchStats, MatchStatus, Profile,
};
pub use session::{AuthState, MemoryTokenStore, Session, TokenStore};
pub use state::ClientContext;
pub use transport::{Idempotency, ProgressFn, Transport};
