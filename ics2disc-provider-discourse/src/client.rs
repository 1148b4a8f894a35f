//! Authenticated HTTP access to a Discourse instance.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ics2disc_core::backoff::{Backoff, is_retryable_status, parse_retry_after};
use ics2disc_core::{ForumError, ForumResult};
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::types::CurrentSession;

pub const DEFAULT_API_USERNAME: &str = "system";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct DiscourseConfig {
    pub base_url: Url,
    pub api_key: String,
    pub api_username: String,
    /// Per-request timeout
    pub timeout: Duration,
    pub backoff: Backoff,
}

impl DiscourseConfig {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        DiscourseConfig {
            base_url,
            api_key: api_key.into(),
            api_username: DEFAULT_API_USERNAME.to_string(),
            timeout: DEFAULT_TIMEOUT,
            backoff: Backoff::default(),
        }
    }
}

pub struct DiscourseClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    backoff: Backoff,
    /// `bumped_at` of topics as they were just before this run edited them
    pub(crate) bumped_before_edit: Mutex<HashMap<u64, Option<DateTime<Utc>>>>,
}

impl DiscourseClient {
    pub fn new(config: DiscourseConfig) -> ForumResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("api-key"),
            header_value("Api-Key", &config.api_key)?,
        );
        headers.insert(
            HeaderName::from_static("api-username"),
            header_value("Api-Username", &config.api_username)?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ForumError::Http(format!("Failed to build HTTP client: {e}")))?;

        Ok(DiscourseClient {
            http,
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            timeout: config.timeout,
            backoff: config.backoff,
            bumped_before_edit: Mutex::new(HashMap::new()),
        })
    }

    /// Check that the API key works. Returns the acting username.
    pub async fn verify_credentials(&self) -> ForumResult<String> {
        let session: CurrentSession = self.get_json("/session/current.json", &[]).await?;
        Ok(session.current_user.username)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ForumResult<T> {
        let response = self.send(Method::GET, path, query, None).await?;
        decode(path, response).await
    }

    pub(crate) async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> ForumResult<T> {
        let response = self.send(Method::POST, path, &[], Some(form)).await?;
        decode(path, response).await
    }

    /// PUT a form. Discourse answers some of these with an empty body, so the
    /// response is not decoded.
    pub(crate) async fn put_form(&self, path: &str, form: &[(String, String)]) -> ForumResult<()> {
        self.send(Method::PUT, path, &[], Some(form)).await?;
        Ok(())
    }

    /// Send a request, retrying 429, 5xx and transport failures per `Backoff`.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        form: Option<&[(String, String)]>,
    ) -> ForumResult<Response> {
        let url = format!("{}{}", self.base_url, path);
        let attempts = self.backoff.attempts.max(1);

        for attempt in 0..attempts {
            let last = attempt + 1 == attempts;
            let mut request = self.http.request(method.clone(), &url).query(query);
            if let Some(form) = form {
                request = request.form(form);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    tokio::time::sleep(self.backoff.courtesy_pause).await;
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    if last || !is_retryable_status(status) {
                        return Err(status_error(path, response).await);
                    }
                    let retry_after = response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_retry_after);
                    let delay = self.backoff.delay(attempt, retry_after);
                    tracing::debug!(%method, path, status, ?delay, "retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    let retryable = err.is_timeout() || err.is_connect();
                    if last || !retryable {
                        return Err(self.transport_error(err));
                    }
                    let delay = self.backoff.delay(attempt, None);
                    tracing::debug!(%method, path, error = %err, ?delay, "retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(ForumError::Http(format!("No attempts made for {path}")))
    }

    fn transport_error(&self, err: reqwest::Error) -> ForumError {
        if err.is_timeout() {
            ForumError::Timeout(self.timeout.as_secs())
        } else {
            ForumError::Http(err.to_string())
        }
    }
}

fn header_value(name: &str, value: &str) -> ForumResult<HeaderValue> {
    HeaderValue::from_str(value.trim())
        .map_err(|_| ForumError::Http(format!("Invalid {name} header value")))
}

async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> ForumResult<T> {
    let text = response
        .text()
        .await
        .map_err(|e| ForumError::Http(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| ForumError::Decode(format!("{path}: {e}")))
}

async fn status_error(path: &str, response: Response) -> ForumError {
    let status = response.status().as_u16();
    match status {
        403 => ForumError::PermissionDenied(path.to_string()),
        404 => ForumError::NotFound(path.to_string()),
        _ => ForumError::Status {
            status,
            path: path.to_string(),
            body: truncate(&response.text().await.unwrap_or_default(), 300),
        },
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
