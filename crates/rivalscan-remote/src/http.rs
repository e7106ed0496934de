//! Shared HTTP client for the Supabase adapters.
//!
//! One client is configured per process and shared by the store and
//! functions adapters. It carries the project headers (`apikey` plus the
//! caller's bearer token), normalizes the base URL, and collapses transport
//! outcomes into [`HttpFailure`] so each adapter can map status codes into
//! its own error taxonomy. Retries are deliberately NOT done here; the
//! engine composes rate limiting, circuit breaking, and retry around whole
//! invocations.

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use rivalscan_utils::error::StoreError;
use rivalscan_utils::redact::redact_secrets;
use std::time::Duration;

/// Connect timeout applied to every request.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error-body excerpt carried into error messages.
const MAX_BODY_SNIPPET: usize = 300;

/// How a single HTTP exchange failed, before adapter-specific mapping.
#[derive(Debug)]
pub(crate) enum HttpFailure {
    /// 401 or 403: the platform rejected our credentials.
    Denied { status: StatusCode, detail: String },
    /// Any other non-2xx status.
    Status { status: StatusCode, detail: String },
    /// The request never produced a response.
    Network(String),
}

/// HTTP client bound to one Supabase project and one caller.
pub struct HttpClient {
    client: Client,
    base_url: String,
    anon_key: String,
    access_token: String,
}

impl HttpClient {
    /// Build a client for `base_url` with the project `anon_key` and the
    /// caller's `access_token`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Transport` if the underlying client cannot be
    /// constructed.
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .use_rustls_tls()
            .build()
            .map_err(|e| StoreError::Transport(format!("failed to build HTTP client: {e}")))?;

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self {
            client,
            base_url,
            anon_key: anon_key.into(),
            access_token: access_token.into(),
        })
    }

    pub(crate) fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
    }

    pub(crate) fn patch(&self, path: &str) -> RequestBuilder {
        self.request(Method::PATCH, path)
    }

    pub(crate) fn delete(&self, path: &str) -> RequestBuilder {
        self.request(Method::DELETE, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.access_token)
    }

    /// Send a request and classify the outcome.
    ///
    /// A 2xx response is returned untouched for the adapter to decode; any
    /// other outcome becomes an [`HttpFailure`] with a redacted detail
    /// string safe to log and to embed in error messages.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response, HttpFailure> {
        let response = request
            .send()
            .await
            .map_err(|e| HttpFailure::Network(redact_secrets(&e.to_string())))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = redact_secrets(snippet(&body));

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(HttpFailure::Denied { status, detail });
        }
        Err(HttpFailure::Status { status, detail })
    }
}

/// Truncate an error body to a loggable excerpt on a char boundary.
fn snippet(body: &str) -> &str {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_BODY_SNIPPET) {
        Some((offset, _)) => &trimmed[..offset],
        None => trimmed,
    }
}
