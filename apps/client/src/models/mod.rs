pub mod job;
pub mod profile;

pub use job::{Application, JobMatch, JobPosting, MatchFilter, MatchStats, MatchStatus};
pub use profile::Profile;
