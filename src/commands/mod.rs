pub mod status;
pub mod sync;

use anyhow::{Context, Result};
use ics2disc_provider_discourse::DiscourseClient;

use crate::config::Settings;

/// Build a client and make sure the API key is accepted before anything else runs.
pub async fn connect(settings: &Settings) -> Result<DiscourseClient> {
    let client = DiscourseClient::new(settings.discourse.clone())
        .context("Failed to set up Discourse client")?;
    let username = client
        .verify_credentials()
        .await
        .with_context(|| format!("Could not authenticate with {}", settings.discourse.base_url))?;
    tracing::info!(%username, base_url = %settings.discourse.base_url, "connected to Discourse");
    Ok(client)
}
