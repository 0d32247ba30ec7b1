//! Remote Tool Client
//!
//! Every tool the sales agent can call is a thin wrapper around one HTTP POST
//! to a hosted endpoint. This module owns that contract: one request per
//! invocation, a hard timeout, the response body handed back verbatim, and a
//! single error type for anything that goes wrong on the way.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Upper bound for a single tool round-trip, connection through body.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// The hosted service that backs the agent's tools.
pub const DEFAULT_TOOLS_BASE_URL: &str =
    "https://salesforce-faq-server-5mfb9qxso-tg73084-9847s-projects.vercel.app";

/// The fixed set of remote endpoints the agent talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolEndpoint {
    MurfTts,
    FaqSearch,
    SaveLead,
    SaveSummary,
}

impl ToolEndpoint {
    /// The name the language model uses to call this tool.
    pub fn tool_name(&self) -> &'static str {
        match self {
            ToolEndpoint::MurfTts => "murf_tts",
            ToolEndpoint::FaqSearch => "faq_search",
            ToolEndpoint::SaveLead => "save_lead",
            ToolEndpoint::SaveSummary => "save_summary",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            ToolEndpoint::MurfTts => "/api/murf",
            ToolEndpoint::FaqSearch => "/api/faq-search",
            ToolEndpoint::SaveLead => "/api/save-lead",
            ToolEndpoint::SaveSummary => "/api/save-summary",
        }
    }
}

/// The one failure kind surfaced to the agent's reasoning loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// The endpoint answered with a status of 400 or above.
    #[error("error: HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// The request never produced a response (connect failure, timeout, reset).
    #[error("error: {0}")]
    Transport(String),
    /// The arguments were rejected before any request was made.
    #[error("error: invalid arguments: {0}")]
    InvalidArguments(String),
}

impl ToolError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ToolError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// HTTP client for the hosted tool endpoints.
#[derive(Clone, Debug)]
pub struct ToolClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ToolClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// POSTs `payload` as JSON to the endpoint and returns the raw body.
    pub async fn invoke<P>(&self, endpoint: ToolEndpoint, payload: &P) -> Result<String, ToolError>
    where
        P: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, endpoint.path());
        debug!(tool = endpoint.tool_name(), %url, "Calling remote tool");

        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| transport_error(endpoint, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(endpoint, e))?;

        if status.as_u16() >= 400 {
            warn!(tool = endpoint.tool_name(), status = status.as_u16(), "Remote tool returned an error status");
            return Err(ToolError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

fn transport_error(endpoint: ToolEndpoint, err: reqwest::Error) -> ToolError {
    warn!(tool = endpoint.tool_name(), error = %err, timeout = err.is_timeout(), "Remote tool request failed");
    ToolError::Transport(err.to_string())
}

/// Tracks whether the current spoken turn may be interrupted.
///
/// The watched value is the number of outstanding holds; the turn is
/// interruptible only while it is zero.
#[derive(Clone, Debug)]
pub struct InterruptionGate {
    holds: Arc<watch::Sender<usize>>,
}

impl Default for InterruptionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptionGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { holds: Arc::new(tx) }
    }

    /// Blocks interruptions until the returned guard is dropped.
    pub fn disallow(&self) -> InterruptionGuard {
        self.holds.send_modify(|holds| *holds += 1);
        InterruptionGuard {
            holds: self.holds.clone(),
        }
    }

    pub fn allows_interruptions(&self) -> bool {
        *self.holds.borrow() == 0
    }

    /// A receiver whose value is the outstanding hold count.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.holds.subscribe()
    }
}

#[must_use = "interruptions are allowed again as soon as the guard is dropped"]
#[derive(Debug)]
pub struct InterruptionGuard {
    holds: Arc<watch::Sender<usize>>,
}

impl Drop for InterruptionGuard {
    fn drop(&mut self) {
        self.holds
            .send_modify(|holds| *holds = holds.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_invoke_returns_body_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/faq-search"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"query": "pricing"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"answer":"Starts at $25","id":"faq-3"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = ToolClient::new(server.uri(), DEFAULT_TOOL_TIMEOUT);
        let body = client
            .invoke(ToolEndpoint::FaqSearch, &json!({"query": "pricing"}))
            .await
            .unwrap();
        assert_eq!(body, r#"{"answer":"Starts at $25","id":"faq-3"}"#);
    }

    #[tokio::test]
    async fn test_error_status_carries_status_and_body() {
        let server = MockServer::start().await;
        for (endpoint, status) in [
            (ToolEndpoint::MurfTts, 400),
            (ToolEndpoint::FaqSearch, 404),
            (ToolEndpoint::SaveLead, 422),
            (ToolEndpoint::SaveSummary, 503),
        ] {
            Mock::given(method("POST"))
                .and(path(endpoint.path()))
                .respond_with(ResponseTemplate::new(status).set_body_string("upstream says no"))
                .mount(&server)
                .await;

            let client = ToolClient::new(server.uri(), DEFAULT_TOOL_TIMEOUT);
            let err = client.invoke(endpoint, &json!({})).await.unwrap_err();
            assert_eq!(
                err,
                ToolError::Http {
                    status,
                    body: "upstream says no".to_string()
                }
            );
            assert_eq!(
                err.to_string(),
                format!("error: HTTP {}: upstream says no", status)
            );
        }
    }

    #[tokio::test]
    async fn test_timeout_is_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/murf"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let client = ToolClient::new(server.uri(), Duration::from_millis(200));
        let started = Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(3),
            client.invoke(ToolEndpoint::MurfTts, &json!({"text": "hi"})),
        )
        .await
        .expect("tool call must not hang past its timeout");

        assert!(matches!(result, Err(ToolError::Transport(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let client = ToolClient::new("http://127.0.0.1:9", Duration::from_secs(2));
        let err = client
            .invoke(ToolEndpoint::SaveLead, &json!({"name": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Transport(_)));
        assert!(err.to_string().starts_with("error: "));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ToolClient::new("https://tools.example.com/", DEFAULT_TOOL_TIMEOUT);
        assert_eq!(client.base_url(), "https://tools.example.com");
    }

    #[test]
    fn test_gate_counts_nested_holds() {
        let gate = InterruptionGate::new();
        assert!(gate.allows_interruptions());

        let first = gate.disallow();
        let second = gate.disallow();
        assert!(!gate.allows_interruptions());

        drop(first);
        assert!(!gate.allows_interruptions());
        drop(second);
        assert!(gate.allows_interruptions());
    }

    #[tokio::test]
    async fn test_gate_notifies_subscribers() {
        let gate = InterruptionGate::new();
        let mut rx = gate.subscribe();

        let guard = gate.disallow();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);

        drop(guard);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 0);
    }
}
