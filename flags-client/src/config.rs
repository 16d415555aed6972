use envconfig::Envconfig;

use crate::api::FlagError;

pub const DEFAULT_FLAGS_URL: &str = "https://api.example.com/flags";

/// Client configuration.
///
/// Constructible from the environment via [`Envconfig::init_from_env`] or
/// programmatically through the `with_*` builders. The three identity ids
/// are all optional, but a flag set requires at least one caller identity:
/// when none is set the client never touches the network and serves
/// default/override flags only.
#[derive(Envconfig, Debug, Clone)]
pub struct Config {
    #[envconfig(from = "FLAGS_URL", default = "https://api.example.com/flags")]
    pub flags_url: String,

    #[envconfig(from = "FLAGS_PROJECT_ID")]
    pub project_id: Option<String>,

    #[envconfig(from = "FLAGS_AGENT_ID")]
    pub agent_id: Option<String>,

    #[envconfig(from = "FLAGS_ENVIRONMENT_ID")]
    pub environment_id: Option<String>,

    /// Opt-in info-level logging of fetch traffic. Warnings and errors are
    /// always emitted.
    #[envconfig(from = "FLAGS_ENABLE_LOGS", default = "false")]
    pub enable_logs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            flags_url: DEFAULT_FLAGS_URL.to_string(),
            project_id: None,
            agent_id: None,
            environment_id: None,
            enable_logs: false,
        }
    }
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    pub fn with_flags_url(mut self, url: impl Into<String>) -> Config {
        self.flags_url = url.into();
        self
    }

    pub fn with_project_id(mut self, id: impl Into<String>) -> Config {
        self.project_id = Some(id.into());
        self
    }

    pub fn with_agent_id(mut self, id: impl Into<String>) -> Config {
        self.agent_id = Some(id.into());
        self
    }

    pub fn with_environment_id(mut self, id: impl Into<String>) -> Config {
        self.environment_id = Some(id.into());
        self
    }

    pub fn with_logs_enabled(mut self, enable_logs: bool) -> Config {
        self.enable_logs = enable_logs;
        self
    }

    /// Whether at least one of project/agent/environment id is configured.
    pub fn has_identity(&self) -> bool {
        self.project_id.is_some() || self.agent_id.is_some() || self.environment_id.is_some()
    }

    /// Cache key derived from the three identity parameters; unset ids
    /// contribute an empty segment.
    pub fn cache_key(&self) -> String {
        format!(
            "flags_{}_{}_{}",
            self.project_id.as_deref().unwrap_or_default(),
            self.agent_id.as_deref().unwrap_or_default(),
            self.environment_id.as_deref().unwrap_or_default()
        )
    }

    /// Validates the configured endpoint, rejecting unparseable URLs before
    /// the first request is ever built.
    pub(crate) fn endpoint(&self) -> Result<reqwest::Url, FlagError> {
        Ok(self.flags_url.parse()?)
    }
}
