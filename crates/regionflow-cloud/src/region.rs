//! Deployment requests and their region targets

use crate::error::{CloudError, Result};
use crate::merge::{ConfigMap, merge_region_config};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Overrides for one target region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub region: String,

    #[serde(default)]
    pub overrides: ConfigMap,
}

impl RegionConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            overrides: ConfigMap::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: ConfigMap) -> Self {
        self.overrides = overrides;
        self
    }
}

/// Where a deployment goes
#[derive(Debug, Clone, PartialEq)]
pub enum RegionTarget {
    Single(String),
    /// Ordered; one deployment per entry
    Many(Vec<RegionConfig>),
}

/// A logical deployment across one or more regions
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawDeploymentRequest")]
pub struct DeploymentRequest {
    base: ConfigMap,
    target: RegionTarget,
}

impl DeploymentRequest {
    /// Validate and build a request
    ///
    /// `base` must not carry a `region` key; the region list must be non-empty
    /// and free of duplicates.
    pub fn new(base: ConfigMap, target: RegionTarget) -> Result<Self> {
        if base.contains_key("region") {
            return Err(CloudError::InvalidConfig(
                "base configuration must not contain `region`; use the region target".into(),
            ));
        }

        if let RegionTarget::Many(regions) = &target {
            if regions.is_empty() {
                return Err(CloudError::InvalidConfig("no target regions".into()));
            }
            let mut seen = HashSet::new();
            for region in regions {
                if !seen.insert(region.region.as_str()) {
                    return Err(CloudError::InvalidConfig(format!(
                        "region {} is targeted more than once",
                        region.region
                    )));
                }
            }
        }

        Ok(Self { base, target })
    }

    pub fn single(base: ConfigMap, region: impl Into<String>) -> Result<Self> {
        Self::new(base, RegionTarget::Single(region.into()))
    }

    pub fn multi(base: ConfigMap, regions: Vec<RegionConfig>) -> Result<Self> {
        Self::new(base, RegionTarget::Many(regions))
    }

    /// Lift a region-keyed configuration into an explicit request
    ///
    /// Top-level keys accepted by `is_region` are per-region override blocks.
    /// The target regions come from the `region` key (a string or a list of
    /// strings) when present, otherwise from the override blocks found.
    /// Blocks for regions not listed in `region` are dropped.
    pub fn from_legacy(mut config: ConfigMap, is_region: impl Fn(&str) -> bool) -> Result<Self> {
        let declared = match config.remove("region") {
            None | Some(Value::Null) => None,
            Some(Value::String(region)) => Some(vec![region]),
            Some(Value::Array(items)) => Some(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(region) => Ok(region),
                        other => Err(CloudError::InvalidConfig(format!(
                            "region entries must be strings, got {}",
                            other
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            Some(other) => {
                return Err(CloudError::InvalidConfig(format!(
                    "region must be a string or a list, got {}",
                    other
                )));
            }
        };

        let block_keys: Vec<String> = config.keys().filter(|k| is_region(k)).cloned().collect();
        let mut blocks = Vec::with_capacity(block_keys.len());
        for key in block_keys {
            match config.remove(&key) {
                Some(Value::Object(overrides)) => blocks.push((key, overrides)),
                Some(other) => {
                    return Err(CloudError::InvalidConfig(format!(
                        "override block for {} must be an object, got {}",
                        key, other
                    )));
                }
                None => {}
            }
        }

        let regions = match declared {
            Some(names) => {
                for (key, _) in &blocks {
                    if !names.contains(key) {
                        tracing::warn!(region = %key, "Ignoring overrides for undeclared region");
                    }
                }
                names
                    .into_iter()
                    .map(|name| {
                        let overrides = blocks
                            .iter()
                            .find(|(key, _)| *key == name)
                            .map(|(_, o)| o.clone())
                            .unwrap_or_default();
                        RegionConfig::new(name).with_overrides(overrides)
                    })
                    .collect()
            }
            None => blocks
                .into_iter()
                .map(|(name, overrides)| RegionConfig::new(name).with_overrides(overrides))
                .collect(),
        };

        Self::multi(config, regions)
    }

    pub fn base(&self) -> &ConfigMap {
        &self.base
    }

    pub fn target(&self) -> &RegionTarget {
        &self.target
    }

    /// Effective regions, in request order
    pub fn regions(&self) -> Vec<RegionConfig> {
        match &self.target {
            RegionTarget::Single(region) => vec![RegionConfig::new(region.clone())],
            RegionTarget::Many(regions) => regions.clone(),
        }
    }

    /// Per-region merged configurations, in request order
    pub fn merged(&self) -> Vec<(String, ConfigMap)> {
        self.regions()
            .into_iter()
            .map(|rc| {
                let merged = merge_region_config(&self.base, &rc.overrides);
                (rc.region, merged)
            })
            .collect()
    }
}

/// On-disk request shape
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDeploymentRequest {
    #[serde(default)]
    config: ConfigMap,
    region: Option<String>,
    regions: Option<Vec<RegionConfig>>,
}

impl TryFrom<RawDeploymentRequest> for DeploymentRequest {
    type Error = CloudError;

    fn try_from(raw: RawDeploymentRequest) -> Result<Self> {
        match (raw.region, raw.regions) {
            (Some(region), None) => Self::single(raw.config, region),
            (None, Some(regions)) => Self::multi(raw.config, regions),
            (Some(_), Some(_)) => Err(CloudError::InvalidConfig(
                "specify either `region` or `regions`, not both".into(),
            )),
            (None, None) => Err(CloudError::InvalidConfig(
                "one of `region` or `regions` is required".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> ConfigMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn is_region(key: &str) -> bool {
        matches!(key, "ap-guangzhou" | "ap-shanghai" | "ap-beijing")
    }

    #[test]
    fn test_single_region() {
        let request = DeploymentRequest::single(map(json!({ "fsName": "a" })), "ap-guangzhou")
            .unwrap();
        let regions = request.regions();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].region, "ap-guangzhou");
        assert!(regions[0].overrides.is_empty());
    }

    #[test]
    fn test_rejects_region_in_base() {
        let result = DeploymentRequest::single(map(json!({ "region": "ap-beijing" })), "ap-guangzhou");
        assert!(matches!(result, Err(CloudError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_duplicate_and_empty_regions() {
        let dup = DeploymentRequest::multi(
            ConfigMap::new(),
            vec![RegionConfig::new("ap-guangzhou"), RegionConfig::new("ap-guangzhou")],
        );
        assert!(matches!(dup, Err(CloudError::InvalidConfig(_))));

        let empty = DeploymentRequest::multi(ConfigMap::new(), vec![]);
        assert!(matches!(empty, Err(CloudError::InvalidConfig(_))));
    }

    #[test]
    fn test_merged_keeps_request_order() {
        let request = DeploymentRequest::multi(
            map(json!({ "fsName": "base", "protocols": ["http"] })),
            vec![
                RegionConfig::new("ap-shanghai")
                    .with_overrides(map(json!({ "protocols": ["https"] }))),
                RegionConfig::new("ap-guangzhou").with_overrides(map(json!({ "fsName": "gz" }))),
            ],
        )
        .unwrap();

        let merged = request.merged();
        assert_eq!(merged[0].0, "ap-shanghai");
        assert_eq!(merged[0].1["protocols"], json!(["http", "https"]));
        assert_eq!(merged[1].0, "ap-guangzhou");
        assert_eq!(merged[1].1["fsName"], json!("gz"));
    }

    #[test]
    fn test_legacy_declared_regions() {
        let legacy = map(json!({
            "region": ["ap-guangzhou", "ap-shanghai"],
            "fsName": "base",
            "ap-shanghai": { "fsName": "sh" },
            "ap-beijing": { "fsName": "bj" }
        }));

        let request = DeploymentRequest::from_legacy(legacy, is_region).unwrap();
        assert!(!request.base().contains_key("ap-shanghai"));
        assert!(!request.base().contains_key("ap-beijing"));
        assert!(!request.base().contains_key("region"));

        let regions = request.regions();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].region, "ap-guangzhou");
        assert!(regions[0].overrides.is_empty());
        assert_eq!(regions[1].overrides["fsName"], json!("sh"));
    }

    #[test]
    fn test_legacy_inferred_regions() {
        let legacy = map(json!({
            "fsName": "base",
            "ap-beijing": { "fsName": "bj" },
            "ap-guangzhou": {}
        }));

        let request = DeploymentRequest::from_legacy(legacy, is_region).unwrap();
        let names: Vec<_> = request.regions().into_iter().map(|r| r.region).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"ap-beijing".to_string()));
        assert!(names.contains(&"ap-guangzhou".to_string()));
    }

    #[test]
    fn test_legacy_single_string_region() {
        let legacy = map(json!({ "region": "ap-guangzhou", "fsName": "base" }));
        let request = DeploymentRequest::from_legacy(legacy, is_region).unwrap();
        assert_eq!(request.regions()[0].region, "ap-guangzhou");
    }

    #[test]
    fn test_legacy_without_regions_fails() {
        let legacy = map(json!({ "fsName": "base" }));
        assert!(DeploymentRequest::from_legacy(legacy, is_region).is_err());
    }

    #[test]
    fn test_deserialize_request_file_shape() {
        let request: DeploymentRequest = serde_json::from_value(json!({
            "config": { "fsName": "data" },
            "regions": [
                { "region": "ap-guangzhou" },
                { "region": "ap-shanghai", "overrides": { "zone": "ap-shanghai-2" } }
            ]
        }))
        .unwrap();

        assert_eq!(request.regions().len(), 2);
        assert_eq!(request.regions()[1].overrides["zone"], json!("ap-shanghai-2"));

        let both = serde_json::from_value::<DeploymentRequest>(json!({
            "region": "ap-guangzhou",
            "regions": [{ "region": "ap-shanghai" }]
        }));
        assert!(both.is_err());
    }
}
