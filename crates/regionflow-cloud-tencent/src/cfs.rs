//! CFS file system driver
//!
//! A file system is looked up by `fileSystemId` when given, otherwise by its
//! unique `fsName`. Name, permission group and size limit are reconciled in
//! place, one field at a time, each change followed by a wait for
//! `available`.

use crate::missing_field;
use async_trait::async_trait;
use regionflow_cloud::{
    ActionRequest, CloudError, Dispatcher, LifecycleState, PollSample, PollSettings, PollSpec,
    PollTarget, ResourceDriver, Result, diff_field, transition, wait_for,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::time::Duration;

pub const SERVICE: &str = "cfs";
pub const API_VERSION: &str = "2019-07-19";

const KIND: &str = "cfs";
const STATE_FIELD: &str = "LifeCycleState";
const STATE_AVAILABLE: &str = "available";
const STATE_CREATE_FAILED: &str = "create_failed";
const PAGE_SIZE: u64 = 100;

/// File systems usually settle within a minute; creation can take longer
pub const DEFAULT_POLL_SETTINGS: PollSettings = PollSettings {
    interval: Duration::from_secs(2),
    timeout: Duration::from_secs(300),
};

/// Desired file system
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CfsConfig {
    /// Existing file system to manage
    #[serde(default)]
    pub file_system_id: Option<String>,

    #[serde(default)]
    pub fs_name: Option<String>,

    /// Availability zone, required to create
    #[serde(default)]
    pub zone: Option<String>,

    #[serde(default = "default_net_interface")]
    pub net_interface: String,

    /// Permission group
    #[serde(default)]
    pub p_group_id: Option<String>,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(default = "default_storage_type")]
    pub storage_type: String,

    #[serde(default)]
    pub vpc_id: Option<String>,

    #[serde(default)]
    pub subnet_id: Option<String>,

    #[serde(default)]
    pub mount_ip: Option<String>,

    /// Size limit in GiB
    #[serde(default)]
    pub fs_limit: Option<u64>,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

fn default_net_interface() -> String {
    "VPC".to_string()
}

fn default_protocol() -> String {
    "NFS".to_string()
}

fn default_storage_type() -> String {
    "SD".to_string()
}

/// Normalized file system, built from a `DescribeCfsFileSystems` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase", deserialize = "PascalCase"))]
pub struct CfsSnapshot {
    pub file_system_id: String,

    #[serde(default)]
    pub fs_name: String,

    pub life_cycle_state: String,

    #[serde(default)]
    pub zone: String,

    #[serde(default)]
    pub protocol: String,

    #[serde(default)]
    pub storage_type: String,

    #[serde(default)]
    pub size_byte: u64,

    #[serde(default)]
    pub size_limit: u64,

    #[serde(
        default,
        rename(deserialize = "PGroup"),
        deserialize_with = "permission_group_id"
    )]
    pub p_group_id: Option<String>,
}

impl CfsSnapshot {
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

fn permission_group_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct PGroup {
        #[serde(rename = "PGroupId")]
        id: Option<String>,
    }

    Ok(Option::<PGroup>::deserialize(deserializer)?.and_then(|group| group.id))
}

/// Fields updated in place, in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MutableField {
    FsName,
    PGroupId,
    FsLimit,
}

impl MutableField {
    const ALL: [MutableField; 3] = [
        MutableField::FsName,
        MutableField::PGroupId,
        MutableField::FsLimit,
    ];

    /// Request parameter carrying the new value
    fn param(self) -> &'static str {
        match self {
            MutableField::FsName => "FsName",
            MutableField::PGroupId => "PGroupId",
            MutableField::FsLimit => "FsLimit",
        }
    }

    fn action(self) -> &'static str {
        match self {
            MutableField::FsName => "UpdateCfsFileSystemName",
            MutableField::PGroupId => "UpdateCfsFileSystemPGroup",
            MutableField::FsLimit => "UpdateCfsFileSystemSizeLimit",
        }
    }

    fn current(self, fields: &Map<String, Value>) -> Option<&Value> {
        match self {
            MutableField::FsName => fields.get("FsName"),
            MutableField::PGroupId => fields.get("PGroup").and_then(|g| g.get("PGroupId")),
            MutableField::FsLimit => fields.get("SizeLimit"),
        }
    }

    fn desired(self, config: &CfsConfig) -> Option<Value> {
        match self {
            MutableField::FsName => config.fs_name.clone().map(Value::from),
            MutableField::PGroupId => config.p_group_id.clone().map(Value::from),
            MutableField::FsLimit => config.fs_limit.map(Value::from),
        }
    }
}

/// Lifecycle driver for CFS file systems
#[derive(Debug, Clone)]
pub struct CfsDriver {
    poll: PollSettings,
}

impl Default for CfsDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl CfsDriver {
    pub fn new() -> Self {
        Self {
            poll: DEFAULT_POLL_SETTINGS,
        }
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    async fn find(&self, api: &Dispatcher, config: &CfsConfig) -> Result<PollSample> {
        match (&config.file_system_id, &config.fs_name) {
            (Some(id), _) => probe_by_id(api, id).await,
            (None, Some(name)) => probe_by_name(api, name).await,
            (None, None) => Err(CloudError::InvalidConfig(
                "cfs: either `fileSystemId` or `fsName` must be set".into(),
            )),
        }
    }

    async fn create(&self, api: &Dispatcher, config: &CfsConfig) -> Result<Map<String, Value>> {
        if let Some(id) = &config.file_system_id {
            return Err(CloudError::InvalidConfig(format!(
                "cfs: file system {} does not exist; drop `fileSystemId` to create a new one",
                id
            )));
        }

        let response = api.dispatch(create_request(config)?).await?;
        let id: String = response
            .get("FileSystemId")
            .ok_or_else(|| missing_field(SERVICE, "CreateCfsFileSystem", "FileSystemId"))?;

        transition(KIND, &id, LifecycleState::Absent, LifecycleState::Creating);
        let fields = self.wait_available(api, &id).await?;
        transition(KIND, &id, LifecycleState::Creating, LifecycleState::Stable);

        Ok(fields)
    }

    /// Wait out a file system found mid-transition
    async fn settle(&self, api: &Dispatcher, fields: Map<String, Value>) -> Result<Map<String, Value>> {
        let id = file_system_id(&fields)?;
        let state = fields
            .get(STATE_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);

        match state.as_deref() {
            Some(STATE_AVAILABLE) => Ok(fields),
            Some(STATE_CREATE_FAILED) => Err(CloudError::ResourceFailed {
                resource: format!("cfs file system {}", id),
                state: STATE_CREATE_FAILED.to_string(),
            }),
            state => {
                tracing::info!(
                    file_system_id = %id,
                    state = state.unwrap_or("-"),
                    "Waiting for file system to settle"
                );
                self.wait_available(api, &id).await
            }
        }
    }

    /// Apply every differing mutable field, one at a time
    async fn reconcile(
        &self,
        api: &Dispatcher,
        config: &CfsConfig,
        mut fields: Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        let id = file_system_id(&fields)?;

        for field in MutableField::ALL {
            let Some(change) = diff_field(field.param(), field.current(&fields), field.desired(config))
            else {
                continue;
            };

            transition(KIND, &id, LifecycleState::Stable, LifecycleState::Updating);
            let from = change.current.clone().unwrap_or(Value::Null);
            tracing::info!(
                file_system_id = %id,
                field = change.field,
                "Changing {} -> {}",
                from,
                change.desired
            );

            api.dispatch(
                ActionRequest::new(SERVICE, API_VERSION, field.action())
                    .param("FileSystemId", id.as_str())
                    .param(change.field, change.desired),
            )
            .await?;

            fields = self.wait_available(api, &id).await?;
            transition(KIND, &id, LifecycleState::Updating, LifecycleState::Stable);
        }

        Ok(fields)
    }

    async fn wait_available(&self, api: &Dispatcher, id: &str) -> Result<Map<String, Value>> {
        let spec = PollSpec::new(
            format!("cfs file system {}", id),
            move || probe_by_id(api, id),
            PollTarget::field(STATE_FIELD, STATE_AVAILABLE),
            self.poll,
        )
        .fail_on(STATE_CREATE_FAILED);

        wait_for(spec)
            .await?
            .into_fields()
            .ok_or_else(|| missing_field(SERVICE, "DescribeCfsFileSystems", "FileSystems"))
    }

    /// Delete every mount target and wait until none are listed
    async fn delete_mount_targets(&self, api: &Dispatcher, id: &str) -> Result<()> {
        let targets = match probe_mount_targets(api, id).await? {
            PollSample::Absent => return Ok(()),
            PollSample::Present(fields) => fields
                .get("MountTargets")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        };

        for target in &targets {
            let Some(mount_target_id) = target.get("MountTargetId").and_then(Value::as_str) else {
                continue;
            };

            tracing::info!(file_system_id = %id, mount_target_id, "Deleting mount target");
            match api
                .dispatch(
                    ActionRequest::new(SERVICE, API_VERSION, "DeleteMountTarget")
                        .param("FileSystemId", id)
                        .param("MountTargetId", mount_target_id),
                )
                .await
            {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        wait_for(PollSpec::new(
            format!("mount targets of cfs file system {}", id),
            move || probe_mount_targets(api, id),
            PollTarget::Absent,
            self.poll,
        ))
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ResourceDriver for CfsDriver {
    type Config = CfsConfig;
    type Snapshot = CfsSnapshot;

    fn kind(&self) -> &str {
        KIND
    }

    fn identity_field(&self) -> Option<&str> {
        Some("fileSystemId")
    }

    async fn deploy(&self, api: &Dispatcher, config: &CfsConfig) -> Result<CfsSnapshot> {
        let mut sample = self.find(api, config).await?;
        if let (true, Some(id), Some(name)) =
            (sample.is_absent(), &config.file_system_id, &config.fs_name)
        {
            tracing::warn!(
                file_system_id = %id,
                fs_name = %name,
                "File system id not found; looking it up by name"
            );
            sample = probe_by_name(api, name).await?;
        }

        let fields = match sample {
            PollSample::Absent => self.create(api, config).await?,
            PollSample::Present(fields) => self.settle(api, fields).await?,
        };

        let fields = self.reconcile(api, config, fields).await?;
        CfsSnapshot::from_fields(fields)
    }

    async fn remove(&self, api: &Dispatcher, config: &CfsConfig) -> Result<()> {
        let fields = match self.find(api, config).await? {
            PollSample::Absent => {
                tracing::info!(
                    file_system_id = config.file_system_id.as_deref().unwrap_or("-"),
                    fs_name = config.fs_name.as_deref().unwrap_or("-"),
                    "File system already absent"
                );
                return Ok(());
            }
            PollSample::Present(fields) => fields,
        };
        let id = file_system_id(&fields)?;

        transition(KIND, &id, LifecycleState::Stable, LifecycleState::Deleting);
        self.delete_mount_targets(api, &id).await?;

        match api
            .dispatch(
                ActionRequest::new(SERVICE, API_VERSION, "DeleteCfsFileSystem")
                    .param("FileSystemId", id.as_str()),
            )
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let id_ref = id.as_str();
        wait_for(PollSpec::new(
            format!("cfs file system {}", id),
            move || probe_by_id(api, id_ref),
            PollTarget::Absent,
            self.poll,
        ))
        .await?;
        transition(KIND, &id, LifecycleState::Deleting, LifecycleState::Absent);

        Ok(())
    }
}

fn create_request(config: &CfsConfig) -> Result<ActionRequest> {
    let zone = config.zone.as_deref().ok_or_else(|| {
        CloudError::InvalidConfig("cfs: `zone` is required to create a file system".into())
    })?;

    let mut request = ActionRequest::new(SERVICE, API_VERSION, "CreateCfsFileSystem")
        .param("Zone", zone)
        .param("NetInterface", config.net_interface.as_str())
        .param("Protocol", config.protocol.as_str())
        .param("StorageType", config.storage_type.as_str());

    let optional = [
        ("FsName", &config.fs_name),
        ("PGroupId", &config.p_group_id),
        ("VpcId", &config.vpc_id),
        ("SubnetId", &config.subnet_id),
        ("MountIP", &config.mount_ip),
    ];
    for (param, value) in optional {
        if let Some(value) = value {
            request = request.param(param, value.as_str());
        }
    }

    if !config.tags.is_empty() {
        let tags: Vec<Value> = config
            .tags
            .iter()
            .map(|(key, value)| json!({ "TagKey": key, "TagValue": value }))
            .collect();
        request = request.param("ResourceTags", tags);
    }

    Ok(request)
}

fn file_system_id(fields: &Map<String, Value>) -> Result<String> {
    fields
        .get("FileSystemId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing_field(SERVICE, "DescribeCfsFileSystems", "FileSystemId"))
}

async fn probe_by_id(api: &Dispatcher, id: &str) -> Result<PollSample> {
    let response = match api
        .dispatch(
            ActionRequest::new(SERVICE, API_VERSION, "DescribeCfsFileSystems")
                .param("FileSystemId", id),
        )
        .await
    {
        Ok(response) => response,
        Err(e) if e.is_not_found() => return Ok(PollSample::Absent),
        Err(e) => return Err(e),
    };

    let file_systems: Vec<Map<String, Value>> = response.get("FileSystems").unwrap_or_default();
    Ok(file_systems
        .into_iter()
        .find(|fs| fs.get("FileSystemId").and_then(Value::as_str) == Some(id))
        .map_or(PollSample::Absent, PollSample::Present))
}

/// Mount targets of file system `id`; absent once none are left
async fn probe_mount_targets(api: &Dispatcher, id: &str) -> Result<PollSample> {
    let response = match api
        .dispatch(
            ActionRequest::new(SERVICE, API_VERSION, "DescribeMountTargets")
                .param("FileSystemId", id),
        )
        .await
    {
        Ok(response) => response,
        Err(e) if e.is_not_found() => return Ok(PollSample::Absent),
        Err(e) => return Err(e),
    };

    let targets: Vec<Value> = response.get("MountTargets").unwrap_or_default();
    if targets.is_empty() {
        return Ok(PollSample::Absent);
    }

    let mut fields = Map::new();
    fields.insert("MountTargets".into(), Value::Array(targets));
    Ok(PollSample::Present(fields))
}

/// Page through every file system in the region and match on `FsName`
async fn probe_by_name(api: &Dispatcher, name: &str) -> Result<PollSample> {
    let mut matches = Vec::new();
    let mut offset = 0u64;

    loop {
        let response = api
            .dispatch(
                ActionRequest::new(SERVICE, API_VERSION, "DescribeCfsFileSystems")
                    .param("Offset", offset)
                    .param("Limit", PAGE_SIZE),
            )
            .await?;

        let page: Vec<Map<String, Value>> = response.get("FileSystems").unwrap_or_default();
        let total: u64 = response.get("TotalCount").unwrap_or(0);
        let count = page.len() as u64;

        matches.extend(
            page.into_iter()
                .filter(|fs| fs.get("FsName").and_then(Value::as_str) == Some(name)),
        );

        offset += count;
        if count == 0 || offset >= total {
            break;
        }
    }

    match matches.len() {
        0 => Ok(PollSample::Absent),
        1 => Ok(matches.pop().map_or(PollSample::Absent, PollSample::Present)),
        n => Err(CloudError::InvalidConfig(format!(
            "cfs: {} file systems are named {}; set `fileSystemId`",
            n, name
        ))),
    }
}
