//! Edge-function gateway adapter.
//!
//! Functions are invoked as `POST {base}/functions/v1/{name}` with a JSON
//! payload. The error split matters to the engine's soft-fail policy: a
//! failure that never reached the function body (network, platform auth,
//! infrastructure status) is `Transport` and may be waived by preflight
//! checks, while a function that answered with an error payload is `Remote`
//! and stays hard.

use crate::http::{HttpClient, HttpFailure};
use crate::ports::FunctionGateway;
use async_trait::async_trait;
use rivalscan_utils::error::GatewayError;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// [`FunctionGateway`] backed by the Supabase functions endpoint.
pub struct SupabaseFunctions {
    http: Arc<HttpClient>,
}

impl SupabaseFunctions {
    #[must_use]
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl FunctionGateway for SupabaseFunctions {
    async fn invoke(&self, function: &str, payload: Value) -> Result<Value, GatewayError> {
        debug!(function, "Invoking edge function");

        let request = self
            .http
            .post(&format!("/functions/v1/{function}"))
            .json(&payload);
        let response = self
            .http
            .send(request)
            .await
            .map_err(|failure| map_invoke_failure(function, failure))?;

        response.json().await.map_err(|e| GatewayError::Decode {
            function: function.to_string(),
            message: e.to_string(),
        })
    }
}

fn map_invoke_failure(function: &str, failure: HttpFailure) -> GatewayError {
    match failure {
        // Platform-edge auth rejection; the function body never ran.
        HttpFailure::Denied { status, .. } => GatewayError::Transport {
            function: function.to_string(),
            message: format!("authentication rejected: {status}"),
        },
        HttpFailure::Status { status, detail } => match remote_error_message(&detail) {
            Some(message) => GatewayError::Remote {
                function: function.to_string(),
                message,
            },
            None => GatewayError::Transport {
                function: function.to_string(),
                message: format!("HTTP {status}: {detail}"),
            },
        },
        HttpFailure::Network(message) => GatewayError::Transport {
            function: function.to_string(),
            message,
        },
    }
}

/// Error text from a function's `{ "error": "..." }` response body, if the
/// body has that shape.
fn remote_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("error")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn error_payloads_become_remote_errors() {
        let failure = HttpFailure::Status {
            status: StatusCode::BAD_REQUEST,
            detail: r#"{"error": "unknown provider: mistral"}"#.to_string(),
        };
        let error = map_invoke_failure("competitor-analysis-gate", failure);
        assert!(!error.is_transport());
        assert!(error.to_string().contains("unknown provider"));
    }

    #[test]
    fn statuses_without_error_payloads_are_transport() {
        let failure = HttpFailure::Status {
            status: StatusCode::BAD_GATEWAY,
            detail: "<html>bad gateway</html>".to_string(),
        };
        let error = map_invoke_failure("competitor-analysis", failure);
        assert!(error.is_transport());
    }

    #[test]
    fn platform_auth_rejections_are_transport() {
        let failure = HttpFailure::Denied {
            status: StatusCode::UNAUTHORIZED,
            detail: r#"{"error": "bad jwt"}"#.to_string(),
        };
        let error = map_invoke_failure("unified-api-key-manager", failure);
        assert!(error.is_transport());
    }

    #[test]
    fn network_failures_are_transport() {
        let error = map_invoke_failure(
            "competitor-analysis",
            HttpFailure::Network("dns error".to_string()),
        );
        assert!(error.is_transport());
        assert!(error.to_string().contains("dns error"));
    }

    #[test]
    fn remote_error_extraction_requires_string_error_field() {
        assert_eq!(
            remote_error_message(r#"{"error": "boom"}"#).as_deref(),
            Some("boom")
        );
        assert!(remote_error_message(r#"{"error": {"code": 7}}"#).is_none());
        assert!(remote_error_message(r#"{"data": "fine"}"#).is_none());
        assert!(remote_error_message("not json").is_none());
    }
}
