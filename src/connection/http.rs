//! Collaborator seams of the transport and their HTTP implementations.
//!
//! [`StreamConnector`] opens the event stream and hands back raw body bytes;
//! [`SubscriptionRpc`] registers and removes server-side subscriptions for a
//! session. The transport only talks to these traits, so tests drive it with
//! in-process fakes.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use log::{debug, warn};
use serde_json::Value as JsonValue;
use std::pin::Pin;
use std::time::{Duration, Instant};

use crate::auth::apply_bearer;
use crate::cursor::EventCursor;
use crate::error::{LinkError, Result};
use crate::models::{SessionIdentity, SubscriptionRequest};
use crate::timeouts::LinkTimeouts;

/// Path of the event stream endpoint.
pub const EVENTS_PATH: &str = "/api/v1/sse/events";
pub const SUBSCRIBE_PATH: &str = "/api/v1/sse/subscribe";
pub const UNSUBSCRIBE_PATH: &str = "/api/v1/sse/unsubscribe";

/// Header carrying the session identity on RPCs.
pub const CONNECTION_ID_HEADER: &str = "X-Connection-ID";
pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";
pub const LAST_EVENT_ID_QUERY: &str = "last_event_id";

/// Raw body of an open event stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Opens the event stream.
#[async_trait::async_trait]
pub trait StreamConnector: Send + Sync + 'static {
    /// Open a stream authenticated with `token`, resuming after `cursor`.
    ///
    /// Resolves once the server has accepted the stream (response headers
    /// received); events then flow through the returned byte stream.
    async fn open(&self, token: &str, cursor: Option<&EventCursor>) -> Result<ByteStream>;
}

/// Server-side subscription registry for a session.
#[async_trait::async_trait]
pub trait SubscriptionRpc: Send + Sync + 'static {
    async fn subscribe(
        &self,
        session: &SessionIdentity,
        token: &str,
        request: &SubscriptionRequest,
    ) -> Result<()>;

    async fn unsubscribe(
        &self,
        session: &SessionIdentity,
        token: &str,
        request: &SubscriptionRequest,
    ) -> Result<()>;
}

fn build_http_client(timeouts: &LinkTimeouts) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if !LinkTimeouts::is_no_timeout(timeouts.connection_timeout) {
        builder = builder.connect_timeout(timeouts.connection_timeout);
    }
    builder
        .build()
        .map_err(|e| LinkError::ConfigurationError(format!("Failed to build HTTP client: {}", e)))
}

fn normalize_base_url(base_url: &str) -> Result<String> {
    let trimmed = base_url.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(LinkError::ConfigurationError(format!(
            "Base URL must start with http:// or https://, got '{}'",
            base_url
        )));
    }
    Ok(trimmed.to_string())
}

/// Pull a readable message out of an error body.
///
/// Accepts `{"error":{"message":..}}`, `{"message":..}` or falls back to the
/// raw text.
fn extract_error_message(body: &str) -> String {
    match serde_json::from_str::<JsonValue>(body) {
        Ok(json) => json
            .pointer("/error/message")
            .or_else(|| json.get("message"))
            .or_else(|| json.get("error"))
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        Err(_) if body.trim().is_empty() => "Unknown error".to_string(),
        Err(_) => body.to_string(),
    }
}

async fn error_from_response(response: reqwest::Response) -> LinkError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(&body);
    match status.as_u16() {
        401 | 403 => LinkError::AuthenticationError(format!("{} ({})", message, status)),
        code => LinkError::ServerError {
            status_code: code,
            message,
        },
    }
}

/// Event stream over HTTP server-sent events.
#[derive(Debug, Clone)]
pub struct HttpSseConnector {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpSseConnector {
    pub fn new(base_url: &str, timeouts: &LinkTimeouts) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            http_client: build_http_client(timeouts)?,
        })
    }

    pub fn events_url(&self) -> String {
        format!("{}{}", self.base_url, EVENTS_PATH)
    }

    pub(crate) fn build_request(
        &self,
        token: &str,
        cursor: Option<&EventCursor>,
    ) -> reqwest::RequestBuilder {
        let mut request = self
            .http_client
            .get(self.events_url())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache");
        request = apply_bearer(request, token);
        if let Some(cursor) = cursor {
            request = request
                .header(LAST_EVENT_ID_HEADER, cursor.as_str())
                .query(&[(LAST_EVENT_ID_QUERY, cursor.as_str())]);
        }
        request
    }
}

#[async_trait::async_trait]
impl StreamConnector for HttpSseConnector {
    async fn open(&self, token: &str, cursor: Option<&EventCursor>) -> Result<ByteStream> {
        let url = self.events_url();
        debug!(
            "[skyclust-link] Opening event stream {} (resume_from={:?})",
            url,
            cursor.map(EventCursor::as_str)
        );
        let started = Instant::now();

        // The transport bounds the whole open; this only bounds the dial.
        let response = self.build_request(token, cursor).send().await?;

        let status = response.status();
        debug!(
            "[skyclust-link] Event stream response: status={} duration_ms={}",
            status,
            started.elapsed().as_millis()
        );
        if !status.is_success() {
            let err = error_from_response(response).await;
            warn!("[skyclust-link] Event stream refused: {}", err);
            return Err(err);
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| LinkError::StreamError(e.to_string())));
        Ok(Box::pin(stream))
    }
}

/// Subscribe/unsubscribe RPCs over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSubscriptionRpc {
    base_url: String,
    http_client: reqwest::Client,
    rpc_timeout: Duration,
}

impl HttpSubscriptionRpc {
    pub fn new(base_url: &str, timeouts: &LinkTimeouts) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            http_client: build_http_client(timeouts)?,
            rpc_timeout: timeouts.rpc_timeout,
        })
    }

    async fn post(
        &self,
        path: &str,
        session: &SessionIdentity,
        token: &str,
        request: &SubscriptionRequest,
    ) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .http_client
            .post(&url)
            .header(CONNECTION_ID_HEADER, session.as_str())
            .json(request);
        builder = apply_bearer(builder, token);
        if !LinkTimeouts::is_no_timeout(self.rpc_timeout) {
            builder = builder.timeout(self.rpc_timeout);
        }

        debug!(
            "[skyclust-link] POST {} event_type={} session={}",
            url, request.event_type, session.id
        );
        let response = builder.send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let err = error_from_response(response).await;
            warn!(
                "[skyclust-link] {} '{}' failed: {}",
                path, request.event_type, err
            );
            Err(err)
        }
    }
}

#[async_trait::async_trait]
impl SubscriptionRpc for HttpSubscriptionRpc {
    async fn subscribe(
        &self,
        session: &SessionIdentity,
        token: &str,
        request: &SubscriptionRequest,
    ) -> Result<()> {
        self.post(SUBSCRIBE_PATH, session, token, request).await
    }

    async fn unsubscribe(
        &self,
        session: &SessionIdentity,
        token: &str,
        request: &SubscriptionRequest,
    ) -> Result<()> {
        self.post(UNSUBSCRIBE_PATH, session, token, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_validation() {
        let timeouts = LinkTimeouts::default();
        assert!(HttpSseConnector::new("localhost:8080", &timeouts).is_err());
        let connector = HttpSseConnector::new("https://api.example.com/", &timeouts).unwrap();
        assert_eq!(connector.events_url(), "https://api.example.com/api/v1/sse/events");
    }

    #[test]
    fn test_stream_request_carries_cursor_and_auth() {
        let connector = HttpSseConnector::new("http://localhost:8080", &LinkTimeouts::default()).unwrap();
        let cursor = EventCursor::new("1700000000-5");
        let request = connector
            .build_request("tok", Some(&cursor))
            .build()
            .unwrap();

        let headers = request.headers();
        assert_eq!(headers.get("last-event-id").unwrap(), "1700000000-5");
        assert_eq!(headers.get("accept").unwrap(), "text/event-stream");
        assert_eq!(headers.get("authorization").unwrap(), "Bearer tok");
        assert_eq!(request.url().query(), Some("last_event_id=1700000000-5"));
    }

    #[test]
    fn test_stream_request_without_cursor() {
        let connector = HttpSseConnector::new("http://localhost:8080", &LinkTimeouts::default()).unwrap();
        let request = connector.build_request("tok", None).build().unwrap();
        assert!(request.headers().get("last-event-id").is_none());
        assert!(request.url().query().is_none());
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(
            extract_error_message(r#"{"success":false,"error":{"code":"NOT_FOUND","message":"No active SSE connection found"}}"#),
            "No active SSE connection found"
        );
        assert_eq!(extract_error_message(r#"{"message":"bad"}"#), "bad");
        assert_eq!(extract_error_message("plain text"), "plain text");
        assert_eq!(extract_error_message(""), "Unknown error");
    }
}
