//! Three-layer merge of plugin configuration

use serde_json::Value;

use super::ConfigTree;

/// Build the tree handed to a plugin.
///
/// Caller overrides are merged into the plugin's own section and win on
/// overlapping keys. Shared defaults then fill top-level keys that are still
/// missing; they never replace a value from either of the other layers.
#[must_use]
pub fn merge(
    plugin_config: &ConfigTree,
    shared_defaults: &ConfigTree,
    overrides: &ConfigTree,
) -> ConfigTree {
    let mut merged = plugin_config.clone();
    merge_into(&mut merged, overrides);

    for (key, value) in shared_defaults {
        if !merged.contains_key(key) {
            merged.insert(key.clone(), value.clone());
        }
    }

    merged
}

/// Write `source` into `target`, descending into mappings present on both
/// sides. Every other overlap is resolved in favour of `source`.
pub fn merge_into(target: &mut ConfigTree, source: &ConfigTree) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
