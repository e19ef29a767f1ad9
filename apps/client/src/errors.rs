use thiserror::Error;

/// Client-level error type.
/// Every fallible operation in the crate returns `Result<T, ClientError>`.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Client-side validation failure, detected before any network call.
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Connection-level failure (link change, refused, DNS). Transient;
    /// eligible for exactly one retry on idempotent requests.
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP 401. Terminal for the session: the transport has already
    /// purged the credential by the time this surfaces.
    #[error("Authentication expired")]
    Auth,

    /// The request exceeded its deadline. Reported, never silently retried.
    #[error("Request timed out")]
    Timeout,

    /// Non-2xx response with a body; `message` carries the backend's
    /// `detail` field when present.
    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// Domain-specific resume rejection surfaced by the upload endpoint.
    #[error("Resume rejected: {0}")]
    Rejection(RejectionReason),

    /// A mutation targeting an entity that already has one in flight.
    #[error("Conflicting operation in flight for {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal client error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ClientError {
    /// Whether the caller may reasonably re-issue the operation as-is.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) | ClientError::Timeout => true,
            ClientError::Rejection(reason) => {
                matches!(reason.recovery(), RecoveryAction::Retry)
            }
            _ => false,
        }
    }
}

/// Server-side rejection taxonomy for resume uploads.
///
/// Classified from the backend's `detail` strings; each variant maps to a
/// distinct recovery path shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// "Resume is unfit or not related to a proper resume."
    UnfitDocument,
    /// "Unable to parse the resume."
    Unparseable,
    /// Size/type constraints re-checked server-side.
    InvalidFile(String),
    /// Upload or processing deadline exceeded.
    Timeout,
    /// Anything else; opaque to the user.
    Other(String),
}

/// What the user can do about a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// The document itself is the problem: pick a different file.
    DiscardAndRetry,
    /// The file violates a constraint the user can fix (size/type).
    FixAndRetry,
    /// Transient; the same file may be retried.
    Retry,
    /// Opaque failure; nothing actionable.
    None,
}

impl RejectionReason {
    /// Maps a failed upload response onto the rejection taxonomy.
    ///
    /// The backend reports every rejection as a 400 with a human-readable
    /// `detail`; the phrasing is stable enough to classify on.
    pub fn classify(status: u16, detail: &str) -> Self {
        let lower = detail.to_lowercase();
        if lower.contains("unfit") || lower.contains("not related") {
            RejectionReason::UnfitDocument
        } else if lower.contains("unable to parse") || lower.contains("failed to parse") {
            RejectionReason::Unparseable
        } else if lower.contains("file size") || lower.contains("file type") {
            RejectionReason::InvalidFile(detail.to_string())
        } else if status == 408 || status == 504 {
            RejectionReason::Timeout
        } else {
            RejectionReason::Other(detail.to_string())
        }
    }

    pub fn recovery(&self) -> RecoveryAction {
        match self {
            RejectionReason::UnfitDocument | RejectionReason::Unparseable => {
                RecoveryAction::DiscardAndRetry
            }
            RejectionReason::InvalidFile(_) => RecoveryAction::FixAndRetry,
            RejectionReason::Timeout => RecoveryAction::Retry,
            RejectionReason::Other(_) => RecoveryAction::None,
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::UnfitDocument => {
                write!(f, "the document does not look like a resume")
            }
            RejectionReason::Unparseable => write!(f, "the resume could not be parsed"),
            RejectionReason::InvalidFile(msg) => write!(f, "{msg}"),
            RejectionReason::Timeout => write!(f, "processing timed out"),
            RejectionReason::Other(msg) => write!(f, "{msg}"),
        }
    }
}
