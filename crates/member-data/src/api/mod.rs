//! HTTP access with bounded retry.
//!
//! Every CRM and forum call goes through [`ApiClient`], which retries
//! rate-limit (429) and bad-gateway (502) responses with exponential backoff
//! and treats every other non-200 status as terminal for that call. The wire
//! itself sits behind [`Transport`] so the retry and pagination logic can be
//! driven without a network.

pub mod pagination;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::backoff::RetryPolicy;

pub use pagination::{Page, Pagination, Paginator};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{path} returned status {status}")]
    Status {
        path: String,
        status: StatusCode,
        body: String,
    },
    #[error("{path} still returned {status} after {attempts} attempts")]
    RetriesExhausted {
        path: String,
        attempts: u32,
        status: StatusCode,
    },
    #[error("Failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("Unexpected payload from {path}: {reason}")]
    Malformed { path: String, reason: String },
}

/// Coarse classification of [`ApiError`] for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rate limiting or gateway errors outlasted the retry budget.
    Transient,
    /// A non-retriable status.
    Terminal,
    /// Connection, TLS or timeout failure below HTTP.
    Transport,
    /// The response arrived but did not have the expected shape.
    Malformed,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Request(_) => ErrorKind::Transport,
            ApiError::Status { .. } => ErrorKind::Terminal,
            ApiError::RetriesExhausted { .. } => ErrorKind::Transient,
            ApiError::Decode { .. } | ApiError::Malformed { .. } => ErrorKind::Malformed,
        }
    }

    /// The last HTTP status seen, if the call got that far.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } | ApiError::RetriesExhausted { status, .. } => {
                Some(*status)
            }
            ApiError::Request(e) => e.status(),
            ApiError::Decode { .. } | ApiError::Malformed { .. } => None,
        }
    }
}

/// Statuses worth waiting out.
pub fn is_transient(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::BAD_GATEWAY
    )
}

/// A request relative to a service base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Copy of this request addressed at one page.
    ///
    /// JSON bodies carry paging in a `pagination` object; everything else
    /// uses `currentPage`/`pageSize` query parameters.
    pub fn for_page(&self, current_page: u32, page_size: u32) -> Self {
        let mut request = self.clone();
        match request.body.as_mut() {
            Some(Value::Object(body)) => {
                body.insert(
                    "pagination".to_string(),
                    json!({ "currentPage": current_page, "pageSize": page_size }),
                );
            }
            _ => {
                request
                    .query
                    .retain(|(key, _)| key != "currentPage" && key != "pageSize");
                request
                    .query
                    .push(("currentPage".to_string(), current_page.to_string()));
                request
                    .query
                    .push(("pageSize".to_string(), page_size.to_string()));
            }
        }
        request
    }
}

/// A response before status handling.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Sends one request, once. Retry is layered on top by [`ApiClient`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ApiError>;
}

/// `reqwest`-backed transport bound to one service.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    basic_auth: Option<(String, String)>,
}

impl HttpTransport {
    /// Creates a transport with default headers applied to every request.
    pub fn new(
        base_url: impl Into<String>,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            basic_auth: None,
        })
    }

    pub fn with_basic_auth(mut self, user: impl Into<String>, key: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), key.into()));
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.path))
            .query(&request.query);

        if let Some((user, key)) = &self.basic_auth {
            builder = builder.basic_auth(user, Some(key));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }
}

/// Explicit per-run context: the transport plus the retry discipline.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Sends a request until it returns 200, a terminal status, or the retry
    /// budget runs out. Returns the response body.
    pub async fn send(&self, request: &ApiRequest) -> Result<String, ApiError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let response = self.transport.send(request).await?;
            let status = response.status;

            if status == StatusCode::OK {
                if attempt > 0 {
                    debug!(path = %request.path, attempt, "request succeeded after retry");
                }
                return Ok(response.body);
            }

            if !is_transient(status) {
                warn!(path = %request.path, %status, "request failed");
                return Err(ApiError::Status {
                    path: request.path.clone(),
                    status,
                    body: response.body,
                });
            }

            let delay = self.retry.backoff.delay(attempt);
            warn!(
                path = %request.path,
                %status,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "transient response, backing off"
            );
            tokio::time::sleep(delay).await;

            attempt += 1;
            if attempt >= max_attempts {
                return Err(ApiError::RetriesExhausted {
                    path: request.path.clone(),
                    attempts: max_attempts,
                    status,
                });
            }
        }
    }

    /// Fetches and decodes a single resource.
    pub async fn fetch<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let body = self.send(request).await?;
        decode(&request.path, &body)
    }

    /// Lazily walks a paginated collection whose items live under
    /// `results_key`.
    pub fn paginate<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
        results_key: &'static str,
        page_size: u32,
    ) -> Paginator<T> {
        Paginator::new(self.clone(), request, results_key, page_size)
    }
}

pub(crate) fn decode<T: DeserializeOwned>(path: &str, body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|source| ApiError::Decode {
        path: path.to_string(),
        source,
        body: body.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient(StatusCode::BAD_GATEWAY));
        assert!(!is_transient(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_transient(StatusCode::NOT_FOUND));
        assert!(!is_transient(StatusCode::OK));
    }

    #[test]
    fn test_for_page_sets_query() {
        let request = ApiRequest::get("/v2/accounts").query("userType", "INDIVIDUAL");
        let paged = request.for_page(2, 200);

        assert_eq!(
            paged.query,
            vec![
                ("userType".to_string(), "INDIVIDUAL".to_string()),
                ("currentPage".to_string(), "2".to_string()),
                ("pageSize".to_string(), "200".to_string()),
            ]
        );
        // Re-paging replaces rather than duplicates.
        assert_eq!(paged.for_page(3, 200).query.len(), 3);
    }

    #[test]
    fn test_for_page_sets_body_pagination() {
        let request = ApiRequest::post_json("/v2/accounts/search", json!({ "outputFields": [] }));
        let paged = request.for_page(1, 50);

        assert!(paged.query.is_empty());
        let body = paged.body.unwrap();
        assert_eq!(body["pagination"]["currentPage"], 1);
        assert_eq!(body["pagination"]["pageSize"], 50);
        assert!(body["outputFields"].is_array());
    }

    #[test]
    fn test_error_kinds() {
        let terminal = ApiError::Status {
            path: "/v2/accounts/1".into(),
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        };
        assert_eq!(terminal.kind(), ErrorKind::Terminal);
        assert_eq!(terminal.status(), Some(StatusCode::NOT_FOUND));

        let exhausted = ApiError::RetriesExhausted {
            path: "/v2/accounts".into(),
            attempts: 10,
            status: StatusCode::TOO_MANY_REQUESTS,
        };
        assert_eq!(exhausted.kind(), ErrorKind::Transient);

        let malformed = ApiError::Malformed {
            path: "/v2/accounts/1".into(),
            reason: "no individualAccount".into(),
        };
        assert_eq!(malformed.kind(), ErrorKind::Malformed);
        assert_eq!(malformed.status(), None);
    }

    #[test]
    fn test_decode_keeps_raw_body() {
        let err = decode::<Value>("/v2/events/9", "<html>oops</html>").unwrap_err();
        match err {
            ApiError::Decode { path, body, .. } => {
                assert_eq!(path, "/v2/events/9");
                assert_eq!(body, "<html>oops</html>");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
