//! Request file loading

use anyhow::Context;
use regionflow_cloud::DeploymentRequest;
use regionflow_cloud_tencent::is_region;
use serde_json::Value;
use std::path::Path;

/// Read a deployment request from a YAML or JSON file
///
/// With `legacy`, top-level keys naming a region are treated as that region's
/// override block and `region` may list the targets.
pub fn load(path: &Path, legacy: bool) -> anyhow::Result<DeploymentRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {}", path.display()))?;

    let value: Value = if is_json(path) {
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML in {}", path.display()))?
    };
    tracing::debug!(path = %path.display(), legacy, "Loaded request file");

    let request = if legacy {
        let Value::Object(config) = value else {
            anyhow::bail!("{}: a legacy request must be a mapping", path.display());
        };
        DeploymentRequest::from_legacy(config, is_region)?
    } else {
        serde_json::from_value(value)
            .with_context(|| format!("Invalid deployment request in {}", path.display()))?
    };

    Ok(request)
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regionflow_cloud::RegionTarget;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_yaml_regions() {
        let file = write(
            ".yaml",
            r#"
config:
  fsName: shared
  zone: ap-guangzhou-3
regions:
  - region: ap-guangzhou
  - region: ap-shanghai
    overrides:
      zone: ap-shanghai-2
"#,
        );

        let request = load(file.path(), false).unwrap();
        let merged = request.merged();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].0, "ap-shanghai");
        assert_eq!(merged[1].1["zone"], json!("ap-shanghai-2"));
        assert_eq!(merged[0].1["fsName"], json!("shared"));
    }

    #[test]
    fn test_load_json_single_region() {
        let file = write(
            ".json",
            r#"{ "config": { "layerName": "deps" }, "region": "ap-tokyo" }"#,
        );

        let request = load(file.path(), false).unwrap();
        assert_eq!(request.target(), &RegionTarget::Single("ap-tokyo".into()));
    }

    #[test]
    fn test_load_legacy_blocks() {
        let file = write(
            ".yml",
            r#"
fsName: shared
ap-guangzhou:
  zone: ap-guangzhou-3
ap-singapore:
  zone: ap-singapore-1
"#,
        );

        let request = load(file.path(), true).unwrap();
        let regions: Vec<String> = request.regions().into_iter().map(|r| r.region).collect();
        assert_eq!(regions.len(), 2);
        assert!(regions.contains(&"ap-guangzhou".to_string()));
        assert!(regions.contains(&"ap-singapore".to_string()));
        assert!(!request.base().contains_key("ap-guangzhou"));
    }

    #[test]
    fn test_rejects_unknown_top_level_keys() {
        let file = write(".yaml", "config: {}\nregion: ap-tokyo\nregoins: []\n");
        assert!(load(file.path(), false).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = load(Path::new("/nonexistent/request.yaml"), false).unwrap_err();
        assert!(err.to_string().contains("Failed to read request file"));
    }
}
