//! Loading the calendar feed from disk or over HTTP.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use ics2disc_core::RawEvent;
use ics2disc_core::backoff::{Backoff, is_retryable_status, parse_retry_after};
use ics2disc_core::ics::parse_events;
use reqwest::header::RETRY_AFTER;

#[derive(Debug, PartialEq, Eq)]
enum FeedSource {
    Url(String),
    Path(PathBuf),
}

impl FeedSource {
    /// `webcal://` is plain HTTPS under another name.
    fn parse(source: &str) -> FeedSource {
        let source = source.trim();
        if has_scheme(source, "webcal://") {
            return FeedSource::Url(format!("https://{}", &source["webcal://".len()..]));
        }
        if has_scheme(source, "http://") || has_scheme(source, "https://") {
            return FeedSource::Url(source.to_string());
        }
        FeedSource::Path(PathBuf::from(source))
    }
}

fn has_scheme(source: &str, scheme: &str) -> bool {
    source
        .get(..scheme.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
}

/// Read `source` and parse every VEVENT in it. Any failure here ends the run.
pub async fn fetch_and_parse(
    source: &str,
    timeout: Duration,
    backoff: &Backoff,
) -> Result<Vec<RawEvent>> {
    let text = match FeedSource::parse(source) {
        FeedSource::Url(url) => download(&url, timeout, backoff).await?,
        FeedSource::Path(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read feed {}", path.display()))?,
    };

    let events = parse_events(&text).with_context(|| format!("Failed to parse feed {source}"))?;
    tracing::info!(source, events = events.len(), "feed loaded");
    Ok(events)
}

async fn download(url: &str, timeout: Duration, backoff: &Backoff) -> Result<String> {
    let http = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")?;
    let attempts = backoff.attempts.max(1);
    let mut attempt = 0;

    loop {
        let last = attempt + 1 >= attempts;
        let retry_after = match http.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                return response
                    .text()
                    .await
                    .with_context(|| format!("Failed to read feed body from {url}"));
            }
            Ok(response) => {
                let status = response.status();
                if last || !is_retryable_status(status.as_u16()) {
                    bail!("Feed request to {url} failed with {status}");
                }
                response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after)
            }
            Err(err) => {
                if last || !(err.is_timeout() || err.is_connect()) {
                    return Err(err).with_context(|| format!("Failed to fetch feed from {url}"));
                }
                None
            }
        };

        let delay = backoff.delay(attempt, retry_after);
        tracing::debug!(url, attempt, ?delay, "retrying feed download");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
