use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::QueryCache;
use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::session::Session;

/// Fixed backoff before the single network-error retry.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);
const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

/// Whether repeating a request can duplicate server-side effects.
/// Only idempotent requests (reads, status-only updates) are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    Idempotent,
    NonIdempotent,
}

/// Upload progress observer. Invoked with a monotonically increasing
/// percentage in [0,100) while bytes are in flight; must not block.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

struct RequestSpec<'a> {
    method: Method,
    path: &'a str,
    query: &'a [(&'a str, String)],
    form: Option<&'a [(&'a str, &'a str)]>,
    idempotency: Idempotency,
    requires_auth: bool,
}

/// Outbound HTTP client: attaches the bearer credential, classifies
/// failures, retries transient network errors once, and reacts globally
/// to authentication expiry.
pub struct Transport {
    http: Client,
    base_url: String,
    upload_timeout: Duration,
    session: Arc<Session>,
    cache: Arc<QueryCache>,
}

impl Transport {
    pub fn new(config: &ClientConfig, session: Arc<Session>, cache: Arc<QueryCache>) -> Self {
        Transport {
            http: Client::builder()
                .timeout(config.request_timeout)
                .build()
                .expect("Failed to build HTTP client"),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            upload_timeout: config.upload_timeout,
            session,
            cache,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let value = self
            .execute(RequestSpec {
                method: Method::GET,
                path,
                query,
                form: None,
                idempotency: Idempotency::Idempotent,
                requires_auth: true,
            })
            .await?;
        decode(path, value)
    }

    /// Status-only updates are idempotency-safe: repeating one cannot
    /// duplicate server-side effects.
    pub async fn put_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let value = self
            .execute(RequestSpec {
                method: Method::PUT,
                path,
                query,
                form: None,
                idempotency: Idempotency::Idempotent,
                requires_auth: true,
            })
            .await?;
        decode(path, value)
    }

    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        self.execute(RequestSpec {
            method: Method::DELETE,
            path,
            query: &[],
            form: None,
            idempotency: Idempotency::NonIdempotent,
            requires_auth: true,
        })
        .await?;
        Ok(())
    }

    /// Unauthenticated form post; used only by the login endpoint
    /// (OAuth2 password form).
    pub async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let value = self
            .execute(RequestSpec {
                method: Method::POST,
                path,
                query: &[],
                form: Some(form),
                idempotency: Idempotency::NonIdempotent,
                requires_auth: false,
            })
            .await?;
        decode(path, value)
    }

    async fn execute(&self, spec: RequestSpec<'_>) -> Result<Value, ClientError> {
        if spec.requires_auth && !self.session.is_signed_in() {
            // Terminal unauthenticated state: nothing goes out until a
            // new login succeeds.
            return Err(ClientError::Auth);
        }

        let url = format!("{}{}", self.base_url, spec.path);
        let result = with_retry(spec.idempotency, |attempt| {
            let this = self;
            let url = url.clone();
            let method = spec.method.clone();
            let query = spec.query;
            let form = spec.form;
            async move {
                if attempt > 0 {
                    debug!(%url, "retrying after network error");
                }
                let mut req = this.http.request(method, &url);
                if !query.is_empty() {
                    req = req.query(query);
                }
                if let Some(form) = form {
                    req = req.form(form);
                }
                if let Some(token) = this.session.token() {
                    req = req.bearer_auth(token);
                }
                let response = req.send().await.map_err(classify_send_error)?;
                this.classify_response(response).await
            }
        })
        .await;

        match result {
            Ok(value) => Ok(value),
            Err(err) => Err(self.suppress_after_logout(spec.requires_auth, err)),
        }
    }

    /// Streams a multipart upload with progress reporting. Uploads are
    /// creation operations and are never retried; they use the longer
    /// processing-aware timeout.
    pub async fn upload_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        field: &str,
        file_name: &str,
        mime: &str,
        payload: Bytes,
        progress: ProgressFn,
    ) -> Result<T, ClientError> {
        if !self.session.is_signed_in() {
            return Err(ClientError::Auth);
        }

        let total = payload.len() as u64;
        let stream = report_as_sent(chunk_payload(&payload), total, Arc::clone(&progress));

        let part = reqwest::multipart::Part::stream_with_length(
            reqwest::Body::wrap_stream(stream),
            total,
        )
        .file_name(file_name.to_string())
        .mime_str(mime)
        .context("invalid MIME type for upload part")?;
        let form = reqwest::multipart::Form::new().part(field.to_string(), part);

        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .http
            .post(&url)
            .multipart(form)
            .timeout(self.upload_timeout);
        if let Some(token) = self.session.token() {
            req = req.bearer_auth(token);
        }

        let result = match req.send().await {
            Ok(response) => self.classify_response(response).await,
            Err(err) => Err(classify_send_error(err)),
        };
        match result {
            Ok(value) => decode(path, value),
            Err(err) => Err(self.suppress_after_logout(true, err)),
        }
    }

    async fn classify_response(&self, response: reqwest::Response) -> Result<Value, ClientError> {
        let status = response.status();
        if status.as_u16() == 401 {
            self.handle_auth_failure().await;
            return Err(ClientError::Auth);
        }
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ClientError::Server {
                status: status.as_u16(),
                message: extract_detail(&text),
            });
        }
        if text.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }

    /// Global 401 side effect: purge the credential and every cache entry.
    /// No derived state may outlive the session.
    pub(crate) async fn handle_auth_failure(&self) {
        self.session.expire();
        self.cache.clear().await;
    }

    /// Errors raised by authenticated requests still in flight when the
    /// session died are not worth surfacing; the logout already happened.
    /// Unauthenticated requests (login) always report their own failure.
    fn suppress_after_logout(&self, required_auth: bool, err: ClientError) -> ClientError {
        if !required_auth || matches!(err, ClientError::Auth) || self.session.is_signed_in() {
            return err;
        }
        debug!(error = %err, "suppressing late error after session expiry");
        ClientError::Auth
    }
}

/// Runs `attempt_fn` once, plus exactly one retry after a fixed backoff
/// when the first attempt fails with a network error and the request is
/// idempotency-safe. All other error classes propagate immediately.
pub(crate) async fn with_retry<T, F, Fut>(
    idempotency: Idempotency,
    mut attempt_fn: F,
) -> Result<T, ClientError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let attempts = match idempotency {
        Idempotency::Idempotent => 2,
        Idempotency::NonIdempotent => 1,
    };

    let mut last_error = None;
    for attempt in 0..attempts {
        if attempt > 0 {
            warn!(
                "network error on attempt {}, retrying after {}ms",
                attempt,
                RETRY_BACKOFF.as_millis()
            );
            tokio::time::sleep(RETRY_BACKOFF).await;
        }
        match attempt_fn(attempt).await {
            Ok(value) => return Ok(value),
            Err(err @ ClientError::Network(_)) if attempt + 1 < attempts => {
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_error.unwrap_or_else(|| ClientError::Network("request failed".to_string())))
}

fn chunk_payload(payload: &Bytes) -> Vec<Bytes> {
    (0..payload.len())
        .step_by(UPLOAD_CHUNK_BYTES)
        .map(|start| payload.slice(start..payload.len().min(start + UPLOAD_CHUNK_BYTES)))
        .collect()
}

/// Annotates the upload body with progress callbacks. The connection pulls
/// a chunk only after writing the previous one, so each callback reports
/// the bytes already handed off, never the chunk still in flight; the
/// closing 99 fires once the whole payload has been pulled.
pub(crate) fn report_as_sent(
    chunks: Vec<Bytes>,
    total: u64,
    progress: ProgressFn,
) -> impl futures_util::Stream<Item = Result<Bytes, std::convert::Infallible>> {
    let tail = Arc::clone(&progress);
    let mut sent: u64 = 0;
    futures_util::stream::iter(chunks)
        .map(move |chunk| {
            let pct = if total == 0 {
                0
            } else {
                ((sent * 100) / total).min(98) as u8
            };
            progress(pct);
            sent += chunk.len() as u64;
            Ok(chunk)
        })
        .chain(futures_util::stream::once(async move {
            tail(99);
            Ok(Bytes::new())
        }))
}

fn classify_send_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Network(err.to_string())
    }
}

/// Pulls the backend's `detail` field out of an error body, falling back
/// to the raw text.
fn extract_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value)
        .with_context(|| format!("unexpected response shape from {path}"))
        .map_err(ClientError::from)
}
