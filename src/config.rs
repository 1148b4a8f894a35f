//! Run settings, resolved from (lowest to highest precedence) built-in
//! defaults, ~/.config/ics2disc/config.toml, the environment, and flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;
use ics2disc_core::config::{DEFAULT_SCAN_PAGES, DEFAULT_SITE_TZ};
use ics2disc_core::{DedupeMode, SyncConfig};
use ics2disc_provider_discourse::{DEFAULT_API_USERNAME, DEFAULT_TIMEOUT, DiscourseConfig};
use serde::Deserialize;
use url::Url;

use crate::SyncArgs;

/// Contents of config.toml. Every key is optional.
///
/// ```toml
/// [discourse]
/// base_url = "https://forum.example.org"
/// api_key = "..."
/// category_id = 12
/// default_tags = ["calendar"]
///
/// [sync]
/// site_tz = "Europe/London"
/// default_duration = "1h"
/// ```
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct FileConfig {
    pub discourse: DiscourseSection,
    pub sync: SyncSection,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct DiscourseSection {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub api_username: Option<String>,
    pub category_id: Option<u64>,
    pub default_tags: Vec<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct SyncSection {
    pub site_tz: Option<String>,
    pub scan_pages: Option<u32>,
    pub time_only_dedupe: bool,
    /// humantime format, e.g. "90m"
    pub default_duration: Option<String>,
    pub timeout: Option<String>,
    pub lock_file: Option<PathBuf>,
}

impl FileConfig {
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
            .join("ics2disc");

        Ok(config_dir.join("config.toml"))
    }

    /// Load `explicit`, which must exist, or the default file if there is one.
    pub fn load(explicit: Option<&Path>) -> Result<FileConfig> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::config_path() {
                Ok(path) if path.exists() => path,
                _ => return Ok(FileConfig::default()),
            },
        };

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub discourse: DiscourseConfig,
    pub sync: SyncConfig,
    pub lock_file: Option<PathBuf>,
}

impl Settings {
    /// Load the config file named by `args` and resolve against the process environment.
    pub fn load(args: &SyncArgs) -> Result<Settings> {
        let file = FileConfig::load(args.config.as_deref())?;
        Settings::resolve(args, file, |key| std::env::var(key).ok())
    }

    pub fn resolve(
        args: &SyncArgs,
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Settings> {
        let env = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let FileConfig { discourse, sync } = file;

        let base_url = env("DISCOURSE_BASE_URL")
            .or(discourse.base_url)
            .ok_or_else(|| anyhow!("Discourse base URL is not set (DISCOURSE_BASE_URL)"))?;
        let base_url = Url::parse(&base_url)
            .with_context(|| format!("Invalid Discourse base URL '{base_url}'"))?;
        let api_key = env("DISCOURSE_API_KEY")
            .or(discourse.api_key)
            .ok_or_else(|| anyhow!("Discourse API key is not set (DISCOURSE_API_KEY)"))?;

        let mut forum = DiscourseConfig::new(base_url, api_key);
        forum.api_username = env("DISCOURSE_API_USERNAME")
            .or(discourse.api_username)
            .unwrap_or_else(|| DEFAULT_API_USERNAME.to_string());
        forum.timeout = match args.timeout {
            Some(timeout) => timeout,
            None => parse_duration_opt("timeout", sync.timeout.as_deref())?.unwrap_or(DEFAULT_TIMEOUT),
        };

        let category_id = match (args.category_id, env("DISCOURSE_CATEGORY_ID")) {
            (Some(id), _) => Some(id),
            (None, Some(raw)) => Some(
                raw.parse::<u64>()
                    .with_context(|| format!("Invalid DISCOURSE_CATEGORY_ID '{raw}'"))?,
            ),
            (None, None) => discourse.category_id,
        };

        let default_tags = match env("DISCOURSE_DEFAULT_TAGS") {
            Some(raw) => raw.split(',').map(str::to_string).collect(),
            None => discourse.default_tags,
        };
        let tags = SyncConfig::merge_tags([default_tags.as_slice(), args.static_tags.as_slice()]);

        let site_tz = match args.site_tz.clone().or_else(|| env("SITE_TZ")).or(sync.site_tz) {
            Some(name) => parse_tz(&name)?,
            None => DEFAULT_SITE_TZ,
        };

        let dedupe = if args.time_only_dedupe || sync.time_only_dedupe {
            DedupeMode::TimeOnly
        } else {
            DedupeMode::Strict
        };

        let mut config = SyncConfig {
            site_tz,
            category_id,
            tags,
            scan_pages: args.scan_pages.or(sync.scan_pages).unwrap_or(DEFAULT_SCAN_PAGES),
            dedupe,
            ..SyncConfig::default()
        };
        let default_duration = match args.default_duration {
            Some(d) => Some(d),
            None => parse_duration_opt("default_duration", sync.default_duration.as_deref())?,
        };
        if let Some(d) = default_duration {
            config.default_duration = chrono::Duration::from_std(d)
                .context("Default event duration is out of range")?;
        }

        Ok(Settings {
            discourse: forum,
            sync: config,
            lock_file: sync.lock_file,
        })
    }
}

fn parse_tz(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| anyhow!("Unknown timezone '{name}': {e}"))
}

fn parse_duration_opt(key: &str, raw: Option<&str>) -> Result<Option<Duration>> {
    raw.map(|s| {
        humantime::parse_duration(s.trim()).with_context(|| format!("Invalid {key} '{s}' in config"))
    })
    .transpose()
}
