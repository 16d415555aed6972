use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::flag_models::{Flag, FlagSet};

/// Refresh interval applied when a successful response does not carry one.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 900;

/// One style override applied by the debug overlay. Opaque name/value pair;
/// parsing and layering are the overlay's problem, not ours.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SecretMenuStyle {
    pub name: String,
    pub value: String,
}

/// Debug-overlay parameters delivered alongside the flag set: the keyboard
/// activation sequence and any style overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SecretMenuConfig {
    pub sequence: Vec<String>,
    pub styles: Vec<SecretMenuStyle>,
}

/// A successfully decoded flag service response. Produced once per fetch and
/// consumed immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerResponse {
    pub interval_allowed: u64,
    pub secret_menu: SecretMenuConfig,
    pub flags: FlagSet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawServerResponse {
    interval_allowed: Option<u64>,
    #[serde(default)]
    secret_menu: SecretMenuConfig,
    #[serde(default)]
    flags: Vec<serde_json::Value>,
}

impl ServerResponse {
    /// Decodes a response body.
    ///
    /// The body must be a JSON object. Individual flag records that fail to
    /// decode (e.g. a missing name) are skipped with a warning rather than
    /// failing the whole fetch.
    pub fn from_json(body: &str) -> Result<ServerResponse, FlagError> {
        let value: serde_json::Value = serde_json::from_str(body)?;
        if !value.is_object() {
            return Err(FlagError::InvalidResponse(
                "response body is not a JSON object".to_string(),
            ));
        }
        let raw: RawServerResponse = serde_json::from_value(value)?;

        let mut flags = FlagSet::with_capacity(raw.flags.len());
        for record in raw.flags {
            match serde_json::from_value::<Flag>(record) {
                Ok(flag) if flag.details.name.is_empty() => {
                    warn!("skipping flag record with an empty name");
                }
                Ok(flag) => {
                    flags.insert(flag.details.name.clone(), flag);
                }
                Err(e) => {
                    warn!(error = %e, "skipping malformed flag record");
                }
            }
        }

        Ok(ServerResponse {
            interval_allowed: raw
                .interval_allowed
                .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS),
            secret_menu: raw.secret_menu,
            flags,
        })
    }
}

/// Failures produced while fetching or applying flag state.
///
/// None of these escape the refresh loop: every failure is logged at its
/// origin and downgraded to keep-previous-state behavior.
#[derive(Error, Debug)]
pub enum FlagError {
    #[error("flags request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("flags request returned {status}: {body}")]
    Response { status: StatusCode, body: String },

    #[error("failed to parse flags response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid flags response: {0}")]
    InvalidResponse(String),

    #[error("invalid flags URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl FlagError {
    /// Timeouts surface through reqwest as request errors; exposed so the
    /// scheduler can log them distinctly.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FlagError::Request(e) if e.is_timeout())
    }
}
