use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::retry::{is_retryable_status, with_retry, RetryConfig};

pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// GitHub caps search pages at 100 items
const MAX_PER_PAGE: u32 = 100;

#[derive(Error, Debug)]
pub enum GitHubError {
    #[error("API request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Repository not found: {0}")]
    NotFound(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseError(#[from] serde_json::Error),
}

impl GitHubError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            GitHubError::RequestFailed { status, .. } => reqwest::StatusCode::from_u16(*status)
                .map(is_retryable_status)
                .unwrap_or(false),
            GitHubError::NetworkError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, GitHubError>;

/// Envelope of `GET /search/repositories`. Items are passed through untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    pub items: Vec<Value>,
}

/// Sort keys accepted by the repository search endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSort {
    Stars,
    Forks,
    Updated,
}

impl SearchSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchSort::Stars => "stars",
            SearchSort::Forks => "forks",
            SearchSort::Updated => "updated",
        }
    }
}

pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    retry_config: RetryConfig,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::with_base_url(token, GITHUB_API_BASE.to_string())
    }

    /// For GitHub Enterprise or a local test server
    pub fn with_base_url(token: Option<String>, base_url: String) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("CodeHub/0.1.0"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );

        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| GitHubError::AuthRequired)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_config: RetryConfig::default(),
        })
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Search repositories; results come back as raw JSON objects
    pub async fn search_repositories(
        &self,
        query: &str,
        sort: Option<SearchSort>,
        per_page: u32,
    ) -> Result<SearchResponse> {
        let url = format!("{}/search/repositories", self.base_url);
        let per_page = per_page.clamp(1, MAX_PER_PAGE).to_string();

        with_retry(&self.retry_config, GitHubError::is_retryable, || async {
            let mut params = vec![("q", query), ("per_page", per_page.as_str())];
            if let Some(sort) = sort {
                params.push(("sort", sort.as_str()));
                params.push(("order", "desc"));
            }

            let response = self.client.get(&url).query(&params).send().await?;
            let response = check_status(response, query).await?;
            let body: SearchResponse = serde_json::from_str(&response.text().await?)?;

            debug!(
                "GitHub search '{}' returned {} of {} results",
                query,
                body.items.len(),
                body.total_count
            );
            Ok::<_, GitHubError>(body)
        })
        .await
    }

    /// Fetch a single repository by owner and name
    pub async fn get_repository(&self, owner: &str, name: &str) -> Result<Value> {
        let full_name = format!("{}/{}", owner, name);
        let url = format!("{}/repos/{}", self.base_url, full_name);

        with_retry(&self.retry_config, GitHubError::is_retryable, || async {
            let response = self.client.get(&url).send().await?;
            let response = check_status(response, &full_name).await?;
            let repo: Value = serde_json::from_str(&response.text().await?)?;
            Ok::<_, GitHubError>(repo)
        })
        .await
    }
}

async fn check_status(response: reqwest::Response, subject: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(GitHubError::NotFound(subject.to_string()));
    }

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(GitHubError::AuthRequired);
    }

    // GitHub reports an exhausted quota as 403 with a zeroed remaining header
    let quota_exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "0")
        .unwrap_or(false);
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || (status == reqwest::StatusCode::FORBIDDEN && quota_exhausted)
    {
        return Err(GitHubError::RateLimitExceeded);
    }

    let body = response.text().await.unwrap_or_default();
    Err(GitHubError::RequestFailed {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_response_keeps_items_opaque() {
        let raw = r#"{
            "total_count": 2,
            "incomplete_results": false,
            "items": [
                {"id": 1, "full_name": "tokio-rs/tokio", "custom_field": [1, 2]},
                {"id": "abc", "full_name": "serde-rs/serde"}
            ]
        }"#;

        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.total_count, 2);
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(parsed.items[0]["custom_field"][1], 2);
        assert_eq!(parsed.items[1]["id"], "abc");
    }

    #[test]
    fn test_retryable_errors() {
        let server = GitHubError::RequestFailed {
            status: 503,
            body: String::new(),
        };
        let client = GitHubError::RequestFailed {
            status: 422,
            body: "Validation Failed".into(),
        };

        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(!GitHubError::RateLimitExceeded.is_retryable());
        assert!(!GitHubError::NotFound("a/b".into()).is_retryable());
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client =
            GitHubClient::with_base_url(None, "https://ghe.example.com/api/v3/".into()).unwrap();
        assert_eq!(client.base_url(), "https://ghe.example.com/api/v3");
    }

    #[test]
    fn test_sort_keys() {
        assert_eq!(SearchSort::Stars.as_str(), "stars");
        assert_eq!(SearchSort::Updated.as_str(), "updated");
    }
}
