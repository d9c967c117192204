//! Backend API client.
//!
//! A single "fetch JSON" primitive over the Pony Mail backend with:
//! - an opt-in response cache keyed by URL (moka, bounded and expiring),
//! - escrow tracking of every in-flight request, so superseded or cancelled
//!   responses are dropped instead of delivered,
//! - backend error envelopes and HTTP errors mapped to [`ApiError`].
//!
//! Thread loading goes through the [`EmailSource`] trait so it can run
//! against an in-memory source in tests.

pub mod escrow;
pub mod types;

use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use regex::Regex;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::config::{BackendConfig, CacheConfig};

pub use escrow::{Escrow, EscrowGuard, Ticket};
pub use types::{Attachment, EmailRecord, ListQuery, ListResponse, ThreadResponse};

use types::ErrorEnvelope;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<.*?>").expect("tag pattern is valid"));

const PERMISSION_HINT: &str =
    "\n\nYou may need to be logged in with additional permissions in order to view this resource.";

const DEFAULT_SCOPE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("An error occurred while trying to fetch {url}: {message}")]
    Transport { url: String, message: String },

    #[error("An error code {status} occurred while trying to fetch {url}:\n{message}")]
    Status {
        status: u16,
        url: String,
        message: String,
    },

    #[error("Invalid response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("{0}")]
    Backend(String),

    #[error("Response superseded by a newer request")]
    Superseded,
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }
}

/// Where the thread loader gets its data from.
#[async_trait]
pub trait EmailSource: Send + Sync {
    async fn fetch_email(&self, id: &str) -> Result<EmailRecord, ApiError>;

    async fn fetch_thread(&self, id: &str) -> Result<ThreadResponse, ApiError>;

    async fn fetch_list(&self, query: &ListQuery) -> Result<ListResponse, ApiError>;

    /// A handle whose in-flight requests are tracked under `scope`, for sources that track them.
    fn with_scope(&self, _scope: &str) -> Option<Arc<dyn EmailSource>> {
        None
    }
}

/// URLs of backend resources, and of the pages this server renders from them.
#[derive(Debug, Clone)]
pub struct Links {
    base_url: String,
    thread_path: String,
    email_path: String,
    source_path: String,
    stats_path: String,
}

impl Links {
    pub fn new(backend: &BackendConfig) -> Self {
        Self {
            base_url: backend.base_url(),
            thread_path: backend.thread_path.clone(),
            email_path: backend.email_path.clone(),
            source_path: backend.source_path.clone(),
            stats_path: backend.stats_path.clone(),
        }
    }

    pub fn thread_url(&self, id: &str) -> String {
        format!("{}{}?id={}", self.base_url, self.thread_path, urlencoding::encode(id))
    }

    pub fn email_url(&self, id: &str) -> String {
        format!("{}{}?id={}", self.base_url, self.email_path, urlencoding::encode(id))
    }

    pub fn source_url(&self, mid: &str) -> String {
        format!("{}{}?id={}", self.base_url, self.source_path, urlencoding::encode(mid))
    }

    pub fn stats_url(&self, query: &ListQuery) -> String {
        let mut url = format!(
            "{}{}?list={}&domain={}",
            self.base_url,
            self.stats_path,
            urlencoding::encode(&query.list),
            urlencoding::encode(&query.domain)
        );
        if let Some(month) = &query.month {
            url.push_str("&d=");
            url.push_str(&urlencoding::encode(month));
        }
        url
    }

    /// Threaded overview of a list, e.g. `dev@example.org`, served by this server.
    pub fn list_url(&self, list: &str) -> String {
        format!("/list?list={}", urlencoding::encode(list))
    }

    pub fn attachment_url(&self, mid: &str, hash: &str) -> String {
        format!(
            "{}{}?attachment=true&id={}&file={}",
            self.base_url,
            self.email_path,
            urlencoding::encode(mid),
            urlencoding::encode(hash)
        )
    }
}

/// HTTP client for the backend API.
///
/// Cheap to clone; clones share the response cache and the escrow table.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    links: Links,
    perm_error_postface: Option<String>,
    cache: Cache<String, Arc<Value>>,
    escrow: Arc<Escrow>,
    /// Prefix of escrow keys; re-requesting a URL within one scope supersedes the earlier call
    scope: String,
}

impl ApiClient {
    pub fn new(
        backend: &BackendConfig,
        cache_config: &CacheConfig,
        escrow: Arc<Escrow>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(backend.request_timeout_seconds))
            .user_agent(concat!("ponymail-view/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Transport {
                url: backend.api_url.clone(),
                message: e.to_string(),
            })?;

        let cache = Cache::builder()
            .max_capacity(cache_config.max_entries)
            .time_to_live(Duration::from_secs(cache_config.ttl_seconds))
            .build();

        Ok(Self {
            http,
            links: Links::new(backend),
            perm_error_postface: backend.perm_error_postface.clone(),
            cache,
            escrow,
            scope: DEFAULT_SCOPE.to_string(),
        })
    }

    /// A clone whose escrow keys are prefixed with `scope` (usually a request id).
    pub fn scoped(&self, scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            ..self.clone()
        }
    }

    pub fn escrow(&self) -> &Arc<Escrow> {
        &self.escrow
    }

    pub fn links(&self) -> &Links {
        &self.links
    }

    fn escrow_key(&self, url: &str) -> String {
        format!("GET-{}-{}", self.scope, url)
    }

    /// Cancel an in-flight GET of `url` in this scope; its response will be dropped.
    pub fn cancel(&self, url: &str) -> bool {
        self.escrow.cancel(&self.escrow_key(url))
    }

    /// Fetch a JSON document. With `cached`, a previously fetched copy is reused.
    #[instrument(
        name = "api.get_json",
        skip(self),
        fields(cache_hit = false, duration_ms)
    )]
    pub async fn get_json(&self, url: &str, cached: bool) -> Result<Arc<Value>, ApiError> {
        let start = Instant::now();
        if cached {
            if let Some(value) = self.cache.get(url).await {
                tracing::Span::current().record("cache_hit", true);
                tracing::Span::current().record("duration_ms", start.elapsed().as_millis() as u64);
                return Ok(value);
            }
        }

        tracing::debug!(%url, "Fetching JSON resource");
        let guard = self.escrow.guard(&self.escrow_key(url));
        let result = self.http.get(url).send().await;

        // The request may have been cancelled or superseded while in flight.
        if !guard.finish() {
            tracing::debug!(%url, "Dropping superseded response");
            return Err(ApiError::Superseded);
        }
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(%url, error = %e, "Backend request failed");
                return Err(ApiError::Transport {
                    url: url.to_string(),
                    message: e.to_string(),
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%url, status = status.as_u16(), "Backend returned an error status");
            tracing::Span::current().record("duration_ms", start.elapsed().as_millis() as u64);
            return Err(self.status_error(status, url, &body));
        }

        let value: Value = response.json().await.map_err(|e| ApiError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if value.is_object() {
            if let Some(message) = ErrorEnvelope::deserialize(&value)
                .ok()
                .and_then(ErrorEnvelope::into_message)
            {
                tracing::warn!(%url, %message, "Backend reported an error");
                return Err(ApiError::Backend(message));
            }
        }

        let value = Arc::new(value);
        self.cache.insert(url.to_string(), Arc::clone(&value)).await;
        tracing::Span::current().record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(value)
    }

    /// Fetch and decode a JSON document.
    pub async fn get<T: DeserializeOwned>(&self, url: &str, cached: bool) -> Result<T, ApiError> {
        let value = self.get_json(url, cached).await?;
        T::deserialize(value.as_ref()).map_err(|e| ApiError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    fn status_error(&self, status: StatusCode, url: &str, body: &str) -> ApiError {
        let mut message = HTML_TAG.replace_all(body, "").trim().to_string();
        if status == StatusCode::NOT_FOUND {
            message.push_str(PERMISSION_HINT);
            if let Some(postface) = &self.perm_error_postface {
                message.push_str(postface);
            }
        }
        ApiError::Status {
            status: status.as_u16(),
            url: url.to_string(),
            message,
        }
    }
}

#[async_trait]
impl EmailSource for ApiClient {
    async fn fetch_email(&self, id: &str) -> Result<EmailRecord, ApiError> {
        // Emails never change once archived.
        self.get(&self.links.email_url(id), true).await
    }

    async fn fetch_thread(&self, id: &str) -> Result<ThreadResponse, ApiError> {
        self.get(&self.links.thread_url(id), false).await
    }

    async fn fetch_list(&self, query: &ListQuery) -> Result<ListResponse, ApiError> {
        self.get(&self.links.stats_url(query), false).await
    }

    fn with_scope(&self, scope: &str) -> Option<Arc<dyn EmailSource>> {
        Some(Arc::new(self.scoped(scope)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn client(api_url: &str) -> ApiClient {
        let config = AppConfig::from_toml(&format!(
            r#"
[http]
host = "127.0.0.1"
port = 0

[backend]
api_url = "{}"
request_timeout_seconds = 2
perm_error_postface = " Contact the list owner."
"#,
            api_url
        ))
        .unwrap();
        ApiClient::new(
            &config.backend,
            &config.cache,
            Arc::new(Escrow::new(Duration::from_millis(250))),
        )
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let api = client("https://lists.example.org");
        let links = api.links();
        assert_eq!(
            links.thread_url("abc"),
            "https://lists.example.org/api/thread.lua?id=abc"
        );
        assert_eq!(
            links.email_url("<a@b>"),
            "https://lists.example.org/api/email.lua?id=%3Ca%40b%3E"
        );
        assert_eq!(
            links.source_url("abc"),
            "https://lists.example.org/api/source.lua?id=abc"
        );
        assert_eq!(
            links.attachment_url("abc", "f00"),
            "https://lists.example.org/api/email.lua?attachment=true&id=abc&file=f00"
        );
        assert_eq!(links.list_url("dev@example.org"), "/list?list=dev%40example.org");

        let query = ListQuery::parse("dev@example.org", None).unwrap();
        assert_eq!(
            links.stats_url(&query),
            "https://lists.example.org/api/stats.lua?list=dev&domain=example.org"
        );
        let query = ListQuery::parse("dev@example.org", Some("2024-3")).unwrap();
        assert_eq!(
            links.stats_url(&query),
            "https://lists.example.org/api/stats.lua?list=dev&domain=example.org&d=2024-3"
        );
    }

    #[test]
    fn test_not_found_message() {
        let api = client("https://lists.example.org/");
        let err = api.status_error(
            StatusCode::NOT_FOUND,
            "https://lists.example.org/api/email.lua?id=x",
            "<html><body><h1>Email not found</h1></body></html>",
        );
        let ApiError::Status { status, message, .. } = &err else {
            panic!("unexpected error {:?}", err);
        };
        assert_eq!(*status, 404);
        assert!(message.starts_with("Email not found"));
        assert!(message.contains("additional permissions"));
        assert!(message.ends_with("Contact the list owner."));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_server_error_has_no_permission_hint() {
        let api = client("https://lists.example.org/");
        let err = api.status_error(StatusCode::INTERNAL_SERVER_ERROR, "u", "<p>boom</p>");
        assert_eq!(
            err,
            ApiError::Status {
                status: 500,
                url: "u".to_string(),
                message: "boom".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_cached_fetch_skips_network() {
        let api = client("http://127.0.0.1:1/");
        let url = api.links().email_url("cached");
        api.cache
            .insert(url.clone(), Arc::new(serde_json::json!({"mid": "cached", "subject": "Hi"})))
            .await;

        let email = api.fetch_email("cached").await.unwrap();
        assert_eq!(email.subject, "Hi");
        assert_eq!(api.escrow().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_leaves_escrow_empty() {
        let api = client("http://127.0.0.1:1/");
        let err = api.fetch_thread("nope").await.unwrap_err();
        assert!(matches!(err, ApiError::Transport { .. }));
        assert_eq!(api.escrow().in_flight(), 0);
    }

    /// A backend that accepts connections and never answers.
    async fn silent_backend() -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        (format!("http://{}/", addr), handle)
    }

    async fn wait_for_in_flight(api: &ApiClient, expected: usize) {
        for _ in 0..200 {
            if api.escrow().in_flight() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("escrow never reached {} in-flight requests", expected);
    }

    #[tokio::test]
    async fn test_aborted_fetch_leaves_escrow_empty() {
        let (api_url, backend) = silent_backend().await;
        let api = client(&api_url);
        let scoped = api.scoped("req-1");

        let task = tokio::spawn(async move { scoped.fetch_thread("x").await });
        wait_for_in_flight(&api, 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert_eq!(api.escrow().in_flight(), 0);
        assert!(!api.escrow().check_at(Instant::now() + Duration::from_secs(10)));
        assert!(!api.escrow().is_loading());
        backend.abort();
    }

    #[tokio::test]
    async fn test_cancelled_fetch_is_superseded() {
        let (api_url, backend) = silent_backend().await;
        let api = client(&api_url);
        let url = api.links().thread_url("x");

        let task = {
            let api = api.clone();
            let url = url.clone();
            tokio::spawn(async move { api.get_json(&url, false).await })
        };
        wait_for_in_flight(&api, 1).await;
        assert!(api.cancel(&url));

        // Closing the held connections makes the pending send fail
        backend.abort();
        let result = task.await.unwrap();
        assert_eq!(result.unwrap_err(), ApiError::Superseded);
        assert_eq!(api.escrow().in_flight(), 0);
    }

    #[test]
    fn test_scoped_keys() {
        let api = client("https://lists.example.org/");
        assert_eq!(api.escrow_key("u"), "GET-default-u");
        assert_eq!(api.scoped("req-1").escrow_key("u"), "GET-req-1-u");
        assert!(api.with_scope("req-2").is_some());
    }
}
