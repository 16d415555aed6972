use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use common_cache::TtlCache;

use crate::api::{FlagError, ServerResponse};
use crate::config::Config;
use crate::flag_models::FlagSet;

/// Upper bound on one flags round trip. A request past this is aborted and
/// handled as a network failure.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub const HEADER_PROJECT_ID: &str = "x-project-id";
pub const HEADER_AGENT_ID: &str = "x-agent-id";
pub const HEADER_ENVIRONMENT_ID: &str = "x-environment-id";

/// What a single fetch attempt produced. The caller (the refresh loop)
/// decides how each outcome lands in the applied state; no variant carries
/// an error out of the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// A response was received and decoded.
    Fetched(ServerResponse),
    /// A fresh cache entry already matches the applied set; the network was
    /// not touched.
    Unchanged,
    /// No identity parameters are configured; the network was not touched.
    Skipped,
    /// The fetch failed but a valid cache entry stood in for it.
    ServedFromCache(FlagSet),
    /// The fetch failed and no cached data was available; the applied set
    /// stays whatever it was.
    Failed,
}

/// Performs the network round trip for the current flag set, backed by a
/// TTL cache keyed on the caller identity.
pub struct Fetcher {
    url: reqwest::Url,
    http: reqwest::Client,
    config: Config,
    cache: TtlCache<FlagSet>,
    cache_key: String,
}

impl Fetcher {
    pub fn new(config: Config) -> Result<Fetcher, FlagError> {
        let url = config.endpoint()?;
        let http = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        let cache_key = config.cache_key();
        Ok(Fetcher {
            url,
            http,
            config,
            cache: TtlCache::new(),
            cache_key,
        })
    }

    /// One fetch attempt against the applied flag set.
    ///
    /// Skips the network entirely when no caller identity is configured, or
    /// when a fresh cache entry is element-wise equal to `applied`. On
    /// success the raw flag set is written to the cache with a TTL of one
    /// refresh period. On any failure a valid cache entry is served instead
    /// when one exists, so a failed fetch never overrides good known data.
    pub async fn fetch_once(&mut self, applied: &FlagSet) -> FetchOutcome {
        if !self.config.has_identity() {
            return FetchOutcome::Skipped;
        }

        if let Some(entry) = self.cache.get(&self.cache_key) {
            if entry.data == *applied {
                return FetchOutcome::Unchanged;
            }
        }

        match self.request().await {
            Ok(response) => {
                if self.config.enable_logs {
                    debug!(
                        flags = response.flags.len(),
                        interval = response.interval_allowed,
                        "flags fetched"
                    );
                }
                if response.flags != *applied {
                    self.cache.set(
                        self.cache_key.clone(),
                        response.flags.clone(),
                        Duration::from_millis(response.interval_allowed.saturating_mul(1000)),
                    );
                }
                FetchOutcome::Fetched(response)
            }
            Err(err) => {
                if self.config.enable_logs {
                    warn!(
                        error = %err,
                        timeout = err.is_timeout(),
                        url = %self.url,
                        "error fetching flags"
                    );
                }
                if let Some(entry) = self.cache.get(&self.cache_key) {
                    return FetchOutcome::ServedFromCache(entry.data.clone());
                }
                FetchOutcome::Failed
            }
        }
    }

    async fn request(&self) -> Result<ServerResponse, FlagError> {
        let mut request = self
            .http
            .get(self.url.clone())
            .header(CONTENT_TYPE, "application/json");
        if let Some(id) = &self.config.project_id {
            request = request.header(HEADER_PROJECT_ID, id);
        }
        if let Some(id) = &self.config.agent_id {
            request = request.header(HEADER_AGENT_ID, id);
        }
        if let Some(id) = &self.config.environment_id {
            request = request.header(HEADER_ENVIRONMENT_ID, id);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FlagError::Response { status, body });
        }
        ServerResponse::from_json(&body)
    }
}
