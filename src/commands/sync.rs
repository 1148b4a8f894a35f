use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ics2disc_core::run_guard::default_lock_path;
use ics2disc_core::{Acquire, RunGuard, SyncStats, sync_events};

use super::connect;
use crate::SyncArgs;
use crate::config::Settings;
use crate::feed::fetch_and_parse;
use crate::render::Render;

pub async fn run(args: &SyncArgs, lock_file: Option<PathBuf>) -> Result<()> {
    let settings = Settings::load(args)?;
    let lock_path = match lock_file.or_else(|| settings.lock_file.clone()) {
        Some(path) => path,
        None => default_lock_path().context("Could not determine lock file location")?,
    };

    if let Some(stats) = run_locked(&lock_path, sync_feed(args, &settings)).await? {
        println!("{}", stats.render());
    }
    Ok(())
}

/// Run `body` while holding the lock at `path`.
///
/// Returns `None`, without polling `body`, when another run holds the lock.
pub async fn run_locked<T>(path: &Path, body: impl Future<Output = Result<T>>) -> Result<Option<T>> {
    let guard = match RunGuard::acquire(path)
        .with_context(|| format!("Failed to take lock {}", path.display()))?
    {
        Acquire::Acquired(guard) => guard,
        Acquire::Busy => {
            tracing::info!(lock = %path.display(), "another sync is running, exiting");
            return Ok(None);
        }
    };
    tracing::debug!(lock = %guard.path().display(), "lock acquired");

    let result = body.await;
    drop(guard);
    result.map(Some)
}

async fn sync_feed(args: &SyncArgs, settings: &Settings) -> Result<SyncStats> {
    let client = connect(settings).await?;
    let events = fetch_and_parse(&args.ics, settings.discourse.timeout, &settings.discourse.backoff).await?;
    Ok(sync_events(events, &client, &settings.sync).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfig;
    use ics2disc_core::backoff::Backoff;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn settings_for(server: &mockito::ServerGuard) -> Settings {
        let server_url = server.url();
        let env = move |key: &str| match key {
            "DISCOURSE_BASE_URL" => Some(server_url.clone()),
            "DISCOURSE_API_KEY" => Some("secret".to_string()),
            "DISCOURSE_CATEGORY_ID" => Some("4".to_string()),
            _ => None,
        };
        let args = SyncArgs {
            ics: "unused".to_string(),
            ..SyncArgs::default()
        };
        let mut settings = Settings::resolve(&args, FileConfig::default(), env).unwrap();
        settings.discourse.backoff = Backoff::immediate();
        settings
    }

    fn args_for(feed: &Path) -> SyncArgs {
        SyncArgs {
            ics: feed.to_str().unwrap().to_string(),
            ..SyncArgs::default()
        }
    }

    #[tokio::test]
    async fn busy_lock_skips_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.lock");
        let _held = RunGuard::acquire(&path).unwrap();
        let ran = AtomicBool::new(false);

        let result = run_locked(&path, async {
            ran.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();

        assert!(result.is_none());
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn lock_is_released_after_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.lock");

        let first = run_locked(&path, async { Ok(1) }).await.unwrap();
        let second = run_locked(&path, async { Ok(2) }).await.unwrap();

        assert_eq!(first, Some(1));
        assert_eq!(second, Some(2));
    }

    #[tokio::test]
    async fn lock_is_released_when_the_run_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.lock");

        let failed = run_locked(&path, async { Err::<(), _>(anyhow::anyhow!("feed unavailable")) }).await;
        assert!(failed.is_err());

        assert!(matches!(RunGuard::acquire(&path).unwrap(), Acquire::Acquired(_)));
    }

    #[tokio::test]
    async fn rejected_credentials_stop_before_the_feed_is_read() {
        let mut server = mockito::Server::new_async().await;
        let session = server
            .mock("GET", "/session/current.json")
            .with_status(403)
            .create_async()
            .await;
        let settings = settings_for(&server);
        let dir = tempfile::tempdir().unwrap();

        // the feed path does not exist, so reaching it would fail differently
        let err = sync_feed(&args_for(&dir.path().join("missing.ics")), &settings)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Could not authenticate"));
        session.assert_async().await;
    }

    #[tokio::test]
    async fn empty_feed_makes_no_forum_writes() {
        let mut server = mockito::Server::new_async().await;
        let session = server
            .mock("GET", "/session/current.json")
            .with_status(200)
            .with_body(r#"{"current_user": {"id": 1, "username": "system"}}"#)
            .create_async()
            .await;
        let writes = server
            .mock("POST", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let settings = settings_for(&server);
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("cal.ics");
        std::fs::write(&feed, "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nEND:VCALENDAR\r\n").unwrap();

        let stats = sync_feed(&args_for(&feed), &settings).await.unwrap();

        assert_eq!(stats, SyncStats::default());
        session.assert_async().await;
        writes.assert_async().await;
    }
}
