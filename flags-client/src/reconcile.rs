//! Pure merge of server-driven flags and user overrides.

use crate::flag_models::FlagSet;
use crate::overrides::OverrideSet;

/// Derives the effective view: every flag in `flags` with its `enabled`
/// replaced by the override when one exists for that name.
///
/// Overrides for names absent from `flags` are not surfaced; an override
/// only applies to a known flag. Pure and idempotent.
pub fn compute_effective(flags: &FlagSet, overrides: &OverrideSet) -> FlagSet {
    flags
        .iter()
        .map(|(name, flag)| {
            let flag = match overrides.get(name) {
                Some(ov) => flag.with_enabled(ov.enabled),
                None => flag.clone(),
            };
            (name.clone(), flag)
        })
        .collect()
}

/// Publish gate for a freshly fetched set.
///
/// True when at least one server-driven value changed or a new flag name
/// appeared, comparing `enabled` only and ignoring overrides. Identical data
/// framed differently does not trigger downstream work. A fetch whose only
/// difference is a removed name does not force a publish on its own.
pub fn should_publish(prev: &FlagSet, incoming: &FlagSet) -> bool {
    incoming.iter().any(|(name, flag)| {
        prev.get(name)
            .map(|p| p.enabled != flag.enabled)
            .unwrap_or(true)
    })
}
