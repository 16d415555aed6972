use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The applied flag set, keyed by flag name. Keys are unique and carry no
/// ordering significance.
pub type FlagSet = HashMap<String, Flag>;

/// Stable identity of a flag: the unique name plus an informational id
/// assigned by the server, or synthesized locally on first use.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FlagDetails {
    pub name: String,
    #[serde(default)]
    pub id: String,
}

/// A named boolean feature toggle.
///
/// Immutable value record: every mutation produces a new `Flag`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Flag {
    #[serde(default)]
    pub enabled: bool,
    pub details: FlagDetails,
}

impl Flag {
    pub fn new(name: impl Into<String>, id: impl Into<String>, enabled: bool) -> Flag {
        Flag {
            enabled,
            details: FlagDetails {
                name: name.into(),
                id: id.into(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    /// Copy of this flag with a different effective value.
    pub fn with_enabled(&self, enabled: bool) -> Flag {
        Flag {
            enabled,
            details: self.details.clone(),
        }
    }
}
