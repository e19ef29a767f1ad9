use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::CacheKey;
use crate::errors::{ClientError, RejectionReason};
use crate::state::ClientContext;
use crate::transport::ProgressFn;

const PDF_MIME: &str = "application/pdf";
const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Share of the progress bar covering the byte transfer. The remaining
/// 10% is reserved for server-side parsing so the bar does not sit at
/// 100% while work visibly continues.
const TRANSFER_SHARE: u8 = 90;

/// A file picked via drag-drop or browse. `mime` is the browser-reported
/// content type when available; the extension is checked regardless.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Bytes,
}

/// Pipeline state machine. `Invalid` and `Failed` are absorbing until the
/// user acknowledges; both clear the selection so a known-bad input
/// cannot be silently retried.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
    Idle,
    Selected,
    Validating,
    /// Displayed transfer percentage, capped below [`TRANSFER_SHARE`].
    Uploading(u8),
    /// Bytes are out; the server is parsing. Reported as 90%.
    Processing,
    Complete,
    Invalid(Vec<String>),
    Failed(RejectionReason),
}

struct Inner {
    state: UploadState,
    file: Option<SelectedFile>,
    /// Monotonic attempt counter. A response belonging to a superseded
    /// attempt is discarded, never applied to state.
    attempt: u64,
    tx: watch::Sender<UploadState>,
}

impl Inner {
    fn set_state(&mut self, state: UploadState) {
        self.state = state.clone();
        self.tx.send_replace(state);
    }
}

/// Client-side resume ingestion: validate, upload with progress, classify
/// server rejections, and invalidate profile-derived caches on success.
pub struct ResumePipeline {
    ctx: ClientContext,
    inner: Arc<Mutex<Inner>>,
}

impl ResumePipeline {
    pub fn new(ctx: ClientContext) -> Self {
        let (tx, _) = watch::channel(UploadState::Idle);
        ResumePipeline {
            ctx,
            inner: Arc::new(Mutex::new(Inner {
                state: UploadState::Idle,
                file: None,
                attempt: 0,
                tx,
            })),
        }
    }

    pub fn state(&self) -> UploadState {
        self.lock().state.clone()
    }

    /// Observe state transitions (the UI's progress bar and error panes).
    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.lock().tx.subscribe()
    }

    /// Accepts a single file. Rejected while a transfer is in flight;
    /// reselecting in any settled state replaces the previous choice.
    pub fn select(&self, file: SelectedFile) -> Result<(), ClientError> {
        let mut inner = self.lock();
        if matches!(
            inner.state,
            UploadState::Uploading(_) | UploadState::Processing
        ) {
            return Err(ClientError::Conflict("resume upload".to_string()));
        }
        debug!(file = %file.file_name, size = file.bytes.len(), "resume selected");
        inner.file = Some(file);
        inner.set_state(UploadState::Selected);
        Ok(())
    }

    /// Uploads the selected file. Client-side validation runs first; a
    /// violation never reaches the network.
    pub async fn upload(&self) -> Result<(), ClientError> {
        let (file, attempt) = {
            let mut inner = self.lock();
            let file = match inner.file.clone() {
                Some(file) => file,
                None => {
                    return Err(ClientError::Validation(vec![
                        "No file selected".to_string()
                    ]))
                }
            };
            inner.set_state(UploadState::Validating);
            let reasons = validate_file(&file, self.ctx.config.max_resume_bytes);
            if !reasons.is_empty() {
                inner.file = None;
                inner.set_state(UploadState::Invalid(reasons.clone()));
                return Err(ClientError::Validation(reasons));
            }
            inner.attempt += 1;
            inner.set_state(UploadState::Uploading(0));
            (file, inner.attempt)
        };

        let upload_id = Uuid::new_v4();
        info!(%upload_id, file = %file.file_name, "starting resume upload");

        let progress: ProgressFn = {
            let inner = Arc::clone(&self.inner);
            Arc::new(move |raw| {
                let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
                if inner.attempt != attempt {
                    return; // superseded by a reset
                }
                let next = if raw >= 99 {
                    UploadState::Processing
                } else {
                    UploadState::Uploading(transfer_display_pct(raw))
                };
                // Progress is monotonic; a late or reordered callback
                // never moves the bar backwards.
                let advance = match (&inner.state, &next) {
                    (UploadState::Uploading(cur), UploadState::Uploading(new)) => new > cur,
                    (UploadState::Processing, UploadState::Uploading(_)) => false,
                    (UploadState::Uploading(_) | UploadState::Processing, _) => true,
                    _ => false,
                };
                if advance {
                    inner.set_state(next);
                }
            })
        };

        let mime = file
            .mime
            .clone()
            .unwrap_or_else(|| mime_for_extension(&file.file_name));
        let result = self
            .ctx
            .api
            .upload_resume(&file.file_name, &mime, file.bytes.clone(), progress)
            .await;

        let outcome = {
            let mut inner = self.lock();
            if inner.attempt != attempt {
                debug!(%upload_id, "discarding response from superseded upload");
                return Ok(());
            }
            match result {
                Ok(()) => {
                    inner.file = None;
                    inner.set_state(UploadState::Complete);
                    Ok(())
                }
                Err(err) => {
                    let reason = classify_failure(&err);
                    warn!(%upload_id, %reason, "resume upload failed");
                    inner.file = None;
                    inner.set_state(UploadState::Failed(reason.clone()));
                    match err {
                        ClientError::Server { .. } => Err(ClientError::Rejection(reason)),
                        other => Err(other),
                    }
                }
            }
        };

        if outcome.is_ok() {
            // The parsed resume changes the profile and future matching;
            // the dashboard must not serve the pre-upload view.
            self.ctx
                .cache
                .invalidate_many(&[CacheKey::Profile, CacheKey::MatchStats])
                .await;
            info!(%upload_id, "resume upload complete");
        }
        outcome
    }

    /// Returns to `Idle`, discarding the selection. Also acknowledges an
    /// `Invalid` or `Failed` state. A response from an already-dispatched
    /// request arriving after this point is dropped.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.attempt += 1;
        inner.file = None;
        inner.set_state(UploadState::Idle);
    }

    /// Displayed percentage for the progress bar, if a transfer is active
    /// or finished.
    pub fn progress_pct(&self) -> Option<u8> {
        match self.lock().state {
            UploadState::Uploading(pct) => Some(pct),
            UploadState::Processing => Some(TRANSFER_SHARE),
            UploadState::Complete => Some(100),
            _ => None,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Maps a raw transfer percentage in [0,100) onto the displayed scale,
/// which tops out just under [`TRANSFER_SHARE`].
fn transfer_display_pct(raw: u8) -> u8 {
    ((raw.min(99) as u16 * TRANSFER_SHARE as u16) / 100) as u8
}

fn extension_of(file_name: &str) -> Option<String> {
    file_name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
}

fn mime_for_extension(file_name: &str) -> String {
    match extension_of(file_name).as_deref() {
        Some("pdf") => PDF_MIME.to_string(),
        _ => DOCX_MIME.to_string(),
    }
}

/// Client-side constraints, mirrored server-side: PDF or DOCX, within
/// the configured size ceiling.
fn validate_file(file: &SelectedFile, max_bytes: usize) -> Vec<String> {
    let mut reasons = Vec::new();

    let extension_ok = matches!(extension_of(&file.file_name).as_deref(), Some("pdf" | "docx"));
    let mime_ok = match file.mime.as_deref() {
        Some(mime) => mime == PDF_MIME || mime == DOCX_MIME,
        None => true,
    };
    if !extension_ok || !mime_ok {
        reasons.push("Please upload a PDF or DOCX file".to_string());
    }

    if file.bytes.len() > max_bytes {
        reasons.push(format!(
            "File size must not exceed {} KiB",
            max_bytes / 1024
        ));
    }
    reasons
}

/// Folds a transport failure into the rejection taxonomy for display.
fn classify_failure(err: &ClientError) -> RejectionReason {
    match err {
        ClientError::Timeout => RejectionReason::Timeout,
        ClientError::Server { status, message } => RejectionReason::classify(*status, message),
        ClientError::Rejection(reason) => reason.clone(),
        other => RejectionReason::Other(other.to_string()),
    }
}
