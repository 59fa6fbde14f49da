use anyhow::{Context, Result};
use listing_extractor::backends::credentials::{env_key, env_value};
use listing_extractor::{ApiKey, Credentials};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Model provider credentials
    pub credentials: Credentials,
    pub rapidapi_key: Option<ApiKey>,
    /// Key for the POST scrape API, falling back to `rapidapi_key`
    pub scrape_api_key: Option<ApiKey>,
    pub firecrawl_key: Option<ApiKey>,
    /// OAuth token for the Sheets API
    pub sheets_token: Option<ApiKey>,
    /// Parent of the per-run output folders
    pub output_root: PathBuf,
    /// Per-call deadline for fetches and model calls
    pub call_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let call_timeout = match env_value("SCRAPER_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(
                secs.parse()
                    .context("SCRAPER_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            None => listing_extractor::batch::DEFAULT_CALL_TIMEOUT,
        };

        Ok(Self {
            credentials: Credentials::from_env(),
            rapidapi_key: env_key("RAPIDAPI_KEY"),
            scrape_api_key: env_key("NEW_API_KEY").or_else(|| env_key("RAPIDAPI_KEY")),
            firecrawl_key: env_key("FIRECRAWL_API_KEY"),
            sheets_token: env_key("GOOGLE_SHEETS_TOKEN"),
            output_root: env_value("SCRAPER_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("output")),
            call_timeout,
        })
    }
}
