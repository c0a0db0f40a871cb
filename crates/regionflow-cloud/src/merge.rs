//! Typed merge of a base configuration with one region's overrides

use serde_json::{Map, Value};

/// Untyped resource configuration as supplied by the caller
pub type ConfigMap = Map<String, Value>;

/// List fields whose region entries extend the base list instead of replacing it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdditiveField {
    Protocols,
    Endpoints,
    CustomDomains,
}

impl AdditiveField {
    pub const ALL: [AdditiveField; 3] = [
        AdditiveField::Protocols,
        AdditiveField::Endpoints,
        AdditiveField::CustomDomains,
    ];

    pub fn key(self) -> &'static str {
        match self {
            AdditiveField::Protocols => "protocols",
            AdditiveField::Endpoints => "endpoints",
            AdditiveField::CustomDomains => "customDomains",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }
}

/// Merge `overrides` over `base`
///
/// - keys only in `overrides` are added
/// - keys in both take the override value, except [`AdditiveField`] lists,
///   which get the override entries appended unless a structurally equal entry
///   is already present
/// - `region` is never taken from overrides
pub fn merge_region_config(base: &ConfigMap, overrides: &ConfigMap) -> ConfigMap {
    let mut merged = base.clone();

    for (key, value) in overrides {
        if key == "region" {
            continue;
        }

        if AdditiveField::from_key(key).is_some() {
            if let (Some(Value::Array(existing)), Value::Array(extra)) = (merged.get_mut(key), value)
            {
                append_unique(existing, extra);
                continue;
            }
        }

        merged.insert(key.clone(), value.clone());
    }

    merged
}

// Value equality compares objects by key set, not by insertion order.
fn append_unique(existing: &mut Vec<Value>, extra: &[Value]) {
    for entry in extra {
        if !existing.contains(entry) {
            existing.push(entry.clone());
        }
    }
}
