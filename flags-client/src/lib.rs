//! Client-side feature-flag consumption.
//!
//! Fetches named boolean flags from a remote service on a recurring timer,
//! caches them with a TTL, persists end-user overrides across sessions, and
//! merges all three into one effective view behind a small read/toggle API:
//!
//! ```rust,no_run
//! use flags_client::{Config, FlagsClient};
//!
//! # async fn example() -> Result<(), flags_client::FlagError> {
//! let config = Config::new().with_project_id("p1");
//! let client = FlagsClient::new(config)?;
//! let refresh = client.start();
//!
//! if client.is("new-checkout").enabled() {
//!     // render the new thing
//! }
//!
//! client.shutdown();
//! refresh.await.ok();
//! # Ok(())
//! # }
//! ```
//!
//! Every failure mode (network, protocol, malformed data, storage I/O) is
//! absorbed inside the engine: readers always get an answer, defaulting to
//! disabled.

pub mod api;
pub mod client;
pub mod config;
pub mod fetch;
pub mod flag_models;
pub mod overrides;
pub mod reconcile;

pub use api::{FlagError, SecretMenuConfig, SecretMenuStyle, ServerResponse};
pub use client::{FlagChecker, FlagsClient};
pub use config::Config;
pub use flag_models::{Flag, FlagDetails, FlagSet};
pub use overrides::{
    FileOverrideStore, FlagOverride, MemoryOverrideStore, OverrideSet, OverrideStore,
};
