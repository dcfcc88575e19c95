//! Firmware version consistency.

use std::collections::BTreeMap;

/// Component whose version the others are compared against.
pub const REFERENCE_COMPONENT: &str = "git";

/// `true` when the host's git version starts with the version of every
/// other component.
///
/// A plain string-prefix test: `v0.12.0-85-gd785b396` is consistent with an
/// MCU reporting `v0.12.0-85-gd785b396` or `v0.12.0`. Without a reference
/// or without any other component there is nothing to compare, which is
/// reported as inconsistent.
pub fn is_consistent(versions: &BTreeMap<String, String>) -> bool {
    let Some(reference) = versions.get(REFERENCE_COMPONENT) else {
        return false;
    };
    let mut others = versions
        .iter()
        .filter(|(component, _)| component.as_str() != REFERENCE_COMPONENT)
        .peekable();
    others.peek().is_some() && others.all(|(_, version)| reference.starts_with(version.as_str()))
}
