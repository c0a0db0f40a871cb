//! SCF layer version driver
//!
//! Layer versions are immutable. A pinned `version` that already exists is
//! left alone; anything else publishes a new version and waits for it to
//! become `Active`.

use crate::missing_field;
use async_trait::async_trait;
use regionflow_cloud::{
    ActionRequest, CloudError, Dispatcher, LifecycleState, PollSample, PollSettings, PollSpec,
    PollTarget, ResourceDriver, Result, transition, wait_for,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

pub const SERVICE: &str = "scf";
pub const API_VERSION: &str = "2018-04-16";

const KIND: &str = "layer";
const STATUS_FIELD: &str = "Status";
const STATUS_ACTIVE: &str = "Active";
const STATUS_PUBLISH_FAILED: &str = "PublishFailed";

pub const DEFAULT_POLL_SETTINGS: PollSettings = PollSettings {
    interval: Duration::from_secs(1),
    timeout: Duration::from_secs(120),
};

/// Desired layer version
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfig {
    pub layer_name: String,

    /// Pinned version; redeploying a pinned, existing version is a no-op
    #[serde(default)]
    pub version: Option<u64>,

    #[serde(default)]
    pub content: Option<LayerContent>,

    #[serde(default)]
    pub compatible_runtimes: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub license_info: Option<String>,
}

/// Layer code location: a COS object or an inline base64 zip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase", serialize = "PascalCase"))]
pub struct LayerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cos_bucket_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cos_object_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cos_bucket_region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_file: Option<String>,
}

/// Normalized layer version, built from a `GetLayerVersion` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase", deserialize = "PascalCase"))]
pub struct LayerSnapshot {
    pub layer_name: String,
    pub layer_version: u64,
    pub status: String,

    #[serde(default)]
    pub compatible_runtimes: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub code_sha256: Option<String>,

    #[serde(default)]
    pub add_time: Option<String>,
}

impl LayerSnapshot {
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

/// Lifecycle driver for SCF layer versions
#[derive(Debug, Clone)]
pub struct LayerDriver {
    poll: PollSettings,
}

impl Default for LayerDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerDriver {
    pub fn new() -> Self {
        Self {
            poll: DEFAULT_POLL_SETTINGS,
        }
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    async fn publish(&self, api: &Dispatcher, config: &LayerConfig) -> Result<u64> {
        let content = config.content.as_ref().ok_or_else(|| {
            CloudError::InvalidConfig(format!(
                "layer {}: `content` is required to publish a version",
                config.layer_name
            ))
        })?;
        if config.compatible_runtimes.is_empty() {
            return Err(CloudError::InvalidConfig(format!(
                "layer {}: `compatibleRuntimes` must not be empty",
                config.layer_name
            )));
        }

        let mut request = ActionRequest::new(SERVICE, API_VERSION, "PublishLayerVersion")
            .param("LayerName", config.layer_name.as_str())
            .param("CompatibleRuntimes", config.compatible_runtimes.clone())
            .param("Content", serde_json::to_value(content)?);
        if let Some(description) = &config.description {
            request = request.param("Description", description.as_str());
        }
        if let Some(license) = &config.license_info {
            request = request.param("LicenseInfo", license.as_str());
        }

        let response = api.dispatch(request).await?;
        response
            .get("LayerVersion")
            .ok_or_else(|| missing_field(SERVICE, "PublishLayerVersion", "LayerVersion"))
    }

    async fn wait_active(&self, api: &Dispatcher, name: &str, version: u64) -> Result<Map<String, Value>> {
        let spec = PollSpec::new(
            format!("layer {}:{}", name, version),
            move || probe(api, name, version),
            PollTarget::field(STATUS_FIELD, STATUS_ACTIVE),
            self.poll,
        )
        .fail_on(STATUS_PUBLISH_FAILED);

        wait_for(spec)
            .await?
            .into_fields()
            .ok_or_else(|| missing_field(SERVICE, "GetLayerVersion", STATUS_FIELD))
    }
}

#[async_trait]
impl ResourceDriver for LayerDriver {
    type Config = LayerConfig;
    type Snapshot = LayerSnapshot;

    fn kind(&self) -> &str {
        KIND
    }

    fn identity_field(&self) -> Option<&str> {
        Some("version")
    }

    async fn deploy(&self, api: &Dispatcher, config: &LayerConfig) -> Result<LayerSnapshot> {
        let name = config.layer_name.as_str();

        if let Some(version) = config.version {
            match probe(api, name, version).await? {
                PollSample::Present(fields) => {
                    let status = fields.get(STATUS_FIELD).and_then(Value::as_str);
                    if status == Some(STATUS_PUBLISH_FAILED) {
                        return Err(CloudError::ResourceFailed {
                            resource: format!("layer {}:{}", name, version),
                            state: STATUS_PUBLISH_FAILED.to_string(),
                        });
                    }

                    let fields = if status == Some(STATUS_ACTIVE) {
                        tracing::debug!(layer = name, version, "Layer version already active");
                        fields
                    } else {
                        self.wait_active(api, name, version).await?
                    };
                    return LayerSnapshot::from_fields(fields);
                }
                PollSample::Absent => {
                    tracing::warn!(
                        layer = name,
                        version,
                        "Pinned layer version not found; publishing a new version"
                    );
                }
            }
        }

        let published = self.publish(api, config).await?;
        let id = format!("{}:{}", name, published);
        if config.version.is_some_and(|pinned| pinned != published) {
            tracing::warn!(layer = name, published, "Published version differs from the pinned one");
        }

        transition(KIND, &id, LifecycleState::Absent, LifecycleState::Creating);
        let fields = self.wait_active(api, name, published).await?;
        transition(KIND, &id, LifecycleState::Creating, LifecycleState::Stable);

        LayerSnapshot::from_fields(fields)
    }

    async fn remove(&self, api: &Dispatcher, config: &LayerConfig) -> Result<()> {
        let name = config.layer_name.as_str();
        let version = config.version.ok_or_else(|| {
            CloudError::InvalidConfig(format!(
                "layer {}: `version` is required to remove a layer version",
                name
            ))
        })?;
        let id = format!("{}:{}", name, version);

        if probe(api, name, version).await?.is_absent() {
            tracing::info!(layer = name, version, "Layer version already absent");
            return Ok(());
        }

        transition(KIND, &id, LifecycleState::Stable, LifecycleState::Deleting);
        match api
            .dispatch(
                ActionRequest::new(SERVICE, API_VERSION, "DeleteLayerVersion")
                    .param("LayerName", name)
                    .param("LayerVersion", version),
            )
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        wait_for(PollSpec::new(
            format!("layer {}", id),
            move || probe(api, name, version),
            PollTarget::Absent,
            self.poll,
        ))
        .await?;
        transition(KIND, &id, LifecycleState::Deleting, LifecycleState::Absent);

        Ok(())
    }
}

async fn probe(api: &Dispatcher, name: &str, version: u64) -> Result<PollSample> {
    let response = match api
        .dispatch(
            ActionRequest::new(SERVICE, API_VERSION, "GetLayerVersion")
                .param("LayerName", name)
                .param("LayerVersion", version),
        )
        .await
    {
        Ok(response) => response,
        Err(e) if e.is_not_found() => return Ok(PollSample::Absent),
        Err(e) => return Err(e),
    };

    let mut fields = response.payload;
    fields
        .entry("LayerName")
        .or_insert_with(|| Value::from(name));
    fields
        .entry("LayerVersion")
        .or_insert_with(|| Value::from(version));

    Ok(PollSample::Present(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regionflow_cloud::testing::ScriptedTransport;
    use serde_json::json;
    use std::sync::Arc;

    fn config(value: Value) -> LayerConfig {
        serde_json::from_value(value).unwrap()
    }

    fn envelope(payload: Value) -> Value {
        let mut response = payload.as_object().cloned().unwrap_or_default();
        response.insert("RequestId".into(), json!("r"));
        json!({ "Response": response })
    }

    fn layer(version: u64, status: &str) -> Value {
        envelope(json!({
            "LayerName": "deps",
            "LayerVersion": version,
            "Status": status,
            "CompatibleRuntimes": ["Python3.9"],
            "CodeSha256": "abc"
        }))
    }

    fn not_found() -> Value {
        envelope(json!({
            "Error": { "Code": "ResourceNotFound.LayerVersion", "Message": "no such version" }
        }))
    }

    fn fast() -> LayerDriver {
        LayerDriver::new().with_poll_settings(PollSettings::new(
            Duration::from_millis(100),
            Duration::from_secs(5),
        ))
    }

    fn publishable(version: Option<u64>) -> LayerConfig {
        config(json!({
            "layerName": "deps",
            "version": version,
            "content": { "cosBucketName": "bucket", "cosObjectName": "/deps.zip" },
            "compatibleRuntimes": ["Python3.9"]
        }))
    }

    #[test]
    fn test_content_uses_api_names() {
        let content = publishable(None).content.unwrap();
        assert_eq!(
            serde_json::to_value(content).unwrap(),
            json!({ "CosBucketName": "bucket", "CosObjectName": "/deps.zip" })
        );
    }

    #[tokio::test]
    async fn test_existing_pinned_version_is_noop() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(layer(3, "Active"));
        let api = Dispatcher::new(transport.clone());

        let snapshot = fast().deploy(&api, &publishable(Some(3))).await.unwrap();
        assert_eq!(snapshot.layer_version, 3);
        assert_eq!(snapshot.status, "Active");
        assert_eq!(transport.actions(), ["GetLayerVersion"]);

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["layerName"], json!("deps"));
        assert_eq!(value["codeSha256"], json!("abc"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_waits_for_active() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(envelope(json!({ "LayerVersion": 1 })));
        transport.push_ok(layer(1, "Publishing"));
        transport.push_ok(layer(1, "Active"));
        let api = Dispatcher::new(transport.clone());

        let snapshot = fast().deploy(&api, &publishable(None)).await.unwrap();
        assert_eq!(snapshot.layer_version, 1);
        assert_eq!(
            transport.actions(),
            ["PublishLayerVersion", "GetLayerVersion", "GetLayerVersion"]
        );

        let publish = &transport.requests()[0];
        assert_eq!(publish.parameters["CompatibleRuntimes"], json!(["Python3.9"]));
        assert_eq!(publish.parameters["Content"]["CosBucketName"], json!("bucket"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failed_is_terminal() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(envelope(json!({ "LayerVersion": 2 })));
        transport.push_ok(layer(2, "PublishFailed"));
        let api = Dispatcher::new(transport);

        let err = fast().deploy(&api, &publishable(None)).await.unwrap_err();
        assert!(matches!(err, CloudError::ResourceFailed { ref state, .. } if state == "PublishFailed"));
    }

    #[tokio::test]
    async fn test_publish_needs_content() {
        let transport = Arc::new(ScriptedTransport::new());
        let api = Dispatcher::new(transport.clone());

        let err = fast()
            .deploy(&api, &config(json!({ "layerName": "deps", "compatibleRuntimes": ["Go1"] })))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::InvalidConfig(_)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_waits_for_absence() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(layer(3, "Active"));
        transport.push_ok(envelope(json!({})));
        transport.push_ok(layer(3, "Deleting"));
        transport.push_ok(not_found());
        let api = Dispatcher::new(transport.clone());

        fast().remove(&api, &publishable(Some(3))).await.unwrap();
        assert_eq!(
            transport.actions(),
            [
                "GetLayerVersion",
                "DeleteLayerVersion",
                "GetLayerVersion",
                "GetLayerVersion"
            ]
        );
    }

    #[tokio::test]
    async fn test_remove_absent_and_unpinned() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(not_found());
        let api = Dispatcher::new(transport.clone());

        tokio_test::assert_ok!(fast().remove(&api, &publishable(Some(3))).await);
        assert_eq!(transport.actions(), ["GetLayerVersion"]);

        let err = fast().remove(&api, &publishable(None)).await.unwrap_err();
        assert!(matches!(err, CloudError::InvalidConfig(_)));
    }
}
