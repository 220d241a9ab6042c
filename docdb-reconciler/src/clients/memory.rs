//! In-process control plane simulation.
//!
//! Behaves like the remote service: new and changed resources pass through a
//! transitional status that only settles after a number of describe calls,
//! deletes linger in `deleting` before vanishing. Every call is journaled and
//! failures can be injected per operation.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    ClusterApi, CreateClusterRequest, CreateInstanceRequest, InstanceApi, ModifyClusterRequest,
    ModifyInstanceRequest, RestoreClusterRequest, TagApi,
};
use crate::error::{RemoteError, RemoteResult};
use crate::model::{ClusterDescription, InstanceDescription, Lookup, ResourceStatus, Tags};

const REGION: &str = "us-east-1";
const ACCOUNT: &str = "000000000000";
const DEFAULT_PORT: u16 = 27017;
const DEFAULT_ENGINE_VERSION: &str = "4.0.0";

/// Operation names, used to select injected failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    DescribeCluster,
    CreateCluster,
    ModifyCluster,
    RestoreCluster,
    DeleteCluster,
    StartCluster,
    DescribeInstance,
    CreateInstance,
    ModifyInstance,
    DeleteInstance,
    ListTags,
    AddTags,
    RemoveTags,
}

/// One journaled call with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    DescribeCluster(String),
    CreateCluster(CreateClusterRequest),
    ModifyCluster(String, ModifyClusterRequest),
    RestoreCluster(RestoreClusterRequest),
    DeleteCluster {
        id: String,
        final_snapshot: Option<String>,
    },
    StartCluster(String),
    DescribeInstance(String),
    CreateInstance(CreateInstanceRequest),
    ModifyInstance(String, ModifyInstanceRequest),
    DeleteInstance(String),
    ListTags(String),
    AddTags(String, Tags),
    RemoveTags(String, Vec<String>),
}

impl Call {
    pub fn op(&self) -> Op {
        match self {
            Call::DescribeCluster(_) => Op::DescribeCluster,
            Call::CreateCluster(_) => Op::CreateCluster,
            Call::ModifyCluster(..) => Op::ModifyCluster,
            Call::RestoreCluster(_) => Op::RestoreCluster,
            Call::DeleteCluster { .. } => Op::DeleteCluster,
            Call::StartCluster(_) => Op::StartCluster,
            Call::DescribeInstance(_) => Op::DescribeInstance,
            Call::CreateInstance(_) => Op::CreateInstance,
            Call::ModifyInstance(..) => Op::ModifyInstance,
            Call::DeleteInstance(_) => Op::DeleteInstance,
            Call::ListTags(_) => Op::ListTags,
            Call::AddTags(..) => Op::AddTags,
            Call::RemoveTags(..) => Op::RemoveTags,
        }
    }

    /// True for calls that change remote state.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self.op(),
            Op::DescribeCluster | Op::DescribeInstance | Op::ListTags
        )
    }
}

#[derive(Debug, Clone)]
enum Settle {
    Status(ResourceStatus),
    Gone,
}

#[derive(Debug, Clone)]
struct Pending {
    remaining: u32,
    then: Settle,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    desc: T,
    pending: Option<Pending>,
}

impl<T> Entry<T> {
    fn settled(desc: T) -> Self {
        Self {
            desc,
            pending: None,
        }
    }
}

#[derive(Default)]
struct State {
    clusters: HashMap<String, Entry<ClusterDescription>>,
    instances: HashMap<String, Entry<InstanceDescription>>,
    tags: HashMap<String, Tags>,
    snapshots: HashSet<String>,
    failures: HashMap<Op, VecDeque<RemoteError>>,
    calls: Vec<Call>,
    /// Describe calls a transition takes before it settles.
    delay: u32,
}

impl State {
    fn record(&mut self, call: Call) -> RemoteResult<()> {
        let op = call.op();
        debug!("memory control plane: {:?}", call);
        self.calls.push(call);
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn pending(&self, then: Settle) -> Option<Pending> {
        Some(Pending {
            remaining: self.delay,
            then,
        })
    }

    fn arn_exists(&self, arn: &str) -> bool {
        self.clusters.values().any(|e| e.desc.arn == arn)
            || self.instances.values().any(|e| e.desc.arn == arn)
    }
}

/// Advance a pending transition by one observation. Returns false once the
/// entry has vanished.
fn observe<T>(entry: &mut Entry<T>, set_status: impl FnOnce(&mut T, ResourceStatus)) -> bool {
    let Some(pending) = entry.pending.as_mut() else {
        return true;
    };
    if pending.remaining > 0 {
        pending.remaining -= 1;
        return true;
    }
    let then = pending.then.clone();
    entry.pending = None;
    match then {
        Settle::Status(status) => {
            set_status(&mut entry.desc, status);
            true
        }
        Settle::Gone => false,
    }
}

fn cluster_arn(id: &str) -> String {
    format!("arn:aws:rds:{}:{}:cluster:{}", REGION, ACCOUNT, id)
}

fn instance_arn(id: &str) -> String {
    format!("arn:aws:rds:{}:{}:db:{}", REGION, ACCOUNT, id)
}

fn resource_id(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{}-{}", prefix, id)
}

fn cluster_not_found(id: &str) -> RemoteError {
    RemoteError::NotFound(format!("DBClusterNotFoundFault: cluster {} not found", id))
}

fn instance_not_found(id: &str) -> RemoteError {
    RemoteError::NotFound(format!("DBInstanceNotFound: instance {} not found", id))
}

/// Simulated control plane.
#[derive(Default)]
pub struct MemoryControlPlane {
    state: Mutex<State>,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of describe calls a create/modify/delete takes to settle.
    pub fn with_settle_delay(mut self, describes: u32) -> Self {
        self.state.get_mut().delay = describes;
        self
    }

    /// Seed an existing cluster; its tags are stored under its ARN.
    pub async fn insert_cluster(&self, desc: ClusterDescription, tags: Tags) {
        let mut state = self.state.lock().await;
        state.tags.insert(desc.arn.clone(), tags);
        state
            .clusters
            .insert(desc.cluster_id.clone(), Entry::settled(desc));
    }

    /// Seed an existing instance; its tags are stored under its ARN.
    pub async fn insert_instance(&self, desc: InstanceDescription, tags: Tags) {
        let mut state = self.state.lock().await;
        state.tags.insert(desc.arn.clone(), tags);
        state
            .instances
            .insert(desc.instance_id.clone(), Entry::settled(desc));
    }

    pub async fn add_snapshot(&self, snapshot: impl Into<String>) {
        self.state.lock().await.snapshots.insert(snapshot.into());
    }

    pub async fn has_snapshot(&self, snapshot: &str) -> bool {
        self.state.lock().await.snapshots.contains(snapshot)
    }

    /// Fail the next call of `op` with `err`. Queued failures are consumed in order.
    pub async fn fail_next(&self, op: Op, err: RemoteError) {
        self.state
            .lock()
            .await
            .failures
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Current cluster record, without journaling or advancing transitions.
    pub async fn cluster(&self, id: &str) -> Option<ClusterDescription> {
        let state = self.state.lock().await;
        state.clusters.get(id).map(|e| e.desc.clone())
    }

    pub async fn instance(&self, id: &str) -> Option<InstanceDescription> {
        let state = self.state.lock().await;
        state.instances.get(id).map(|e| e.desc.clone())
    }

    pub async fn tags(&self, arn: &str) -> Option<Tags> {
        self.state.lock().await.tags.get(arn).cloned()
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.calls.clone()
    }

    pub async fn count(&self, op: Op) -> usize {
        let state = self.state.lock().await;
        state.calls.iter().filter(|c| c.op() == op).count()
    }

    pub async fn mutations(&self) -> Vec<Call> {
        let state = self.state.lock().await;
        state
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }
}

#[async_trait]
impl TagApi for MemoryControlPlane {
    async fn list_tags(&self, arn: &str) -> RemoteResult<Tags> {
        let mut state = self.state.lock().await;
        state.record(Call::ListTags(arn.to_string()))?;
        if !state.arn_exists(arn) {
            return Err(RemoteError::NotFound(format!("resource {} not found", arn)));
        }
        Ok(state.tags.get(arn).cloned().unwrap_or_default())
    }

    async fn add_tags(&self, arn: &str, tags: &Tags) -> RemoteResult<()> {
        let mut state = self.state.lock().await;
        state.record(Call::AddTags(arn.to_string(), tags.clone()))?;
        if !state.arn_exists(arn) {
            return Err(RemoteError::NotFound(format!("resource {} not found", arn)));
        }
        let current = state.tags.entry(arn.to_string()).or_default();
        for (k, v) in tags.iter() {
            current.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    async fn remove_tags(&self, arn: &str, keys: &[String]) -> RemoteResult<()> {
        let mut state = self.state.lock().await;
        state.record(Call::RemoveTags(arn.to_string(), keys.to_vec()))?;
        if !state.arn_exists(arn) {
            return Err(RemoteError::NotFound(format!("resource {} not found", arn)));
        }
        if let Some(current) = state.tags.get_mut(arn) {
            for key in keys {
                current.remove(key);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterApi for MemoryControlPlane {
    async fn describe_cluster(&self, id: &str) -> RemoteResult<Lookup<ClusterDescription>> {
        let mut state = self.state.lock().await;
        state.record(Call::DescribeCluster(id.to_string()))?;
        let Some(entry) = state.clusters.get_mut(id) else {
            return Ok(Lookup::Absent);
        };
        if observe(entry, |d, s| d.status = s) {
            return Ok(Lookup::Found(entry.desc.clone()));
        }
        let arn = entry.desc.arn.clone();
        state.clusters.remove(id);
        state.tags.remove(&arn);
        Ok(Lookup::Absent)
    }

    async fn create_cluster(&self, req: &CreateClusterRequest) -> RemoteResult<ClusterDescription> {
        let mut state = self.state.lock().await;
        state.record(Call::CreateCluster(req.clone()))?;
        if state.clusters.contains_key(&req.cluster_id) {
            return Err(RemoteError::permanent(
                "DBClusterAlreadyExistsFault",
                format!("cluster {} already exists", req.cluster_id),
            ));
        }
        let desc = ClusterDescription {
            cluster_id: req.cluster_id.clone(),
            arn: cluster_arn(&req.cluster_id),
            status: ResourceStatus::Creating,
            engine: req.engine.clone(),
            engine_version: Some(
                req.engine_version
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ENGINE_VERSION.to_string()),
            ),
            port: Some(req.port.unwrap_or(DEFAULT_PORT)),
            availability_zones: req.availability_zones.clone().unwrap_or_default(),
            subnet_group: req.subnet_group.clone(),
            vpc_security_group_ids: req.vpc_security_group_ids.clone().unwrap_or_default(),
            parameter_group: req.parameter_group.clone(),
            master_username: req.master_username.clone(),
            endpoint: Some(format!("{}.cluster.{}.docdb.local", req.cluster_id, REGION)),
            resource_id: Some(resource_id("cluster")),
            created_at: Some(Utc::now()),
        };
        state
            .tags
            .insert(desc.arn.clone(), req.tags.clone().unwrap_or_default());
        let pending = state.pending(Settle::Status(ResourceStatus::Available));
        state.clusters.insert(
            desc.cluster_id.clone(),
            Entry {
                desc: desc.clone(),
                pending,
            },
        );
        Ok(desc)
    }

    async fn modify_cluster(
        &self,
        id: &str,
        req: &ModifyClusterRequest,
    ) -> RemoteResult<ClusterDescription> {
        let mut state = self.state.lock().await;
        state.record(Call::ModifyCluster(id.to_string(), req.clone()))?;
        let pending = state.pending(Settle::Status(ResourceStatus::Available));
        let entry = state
            .clusters
            .get_mut(id)
            .ok_or_else(|| cluster_not_found(id))?;
        let desc = &mut entry.desc;
        if let Some(v) = &req.engine_version {
            desc.engine_version = Some(v.clone());
        }
        if let Some(port) = req.port {
            desc.port = Some(port);
        }
        if let Some(groups) = &req.vpc_security_group_ids {
            desc.vpc_security_group_ids = groups.clone();
        }
        if let Some(group) = &req.parameter_group {
            desc.parameter_group = Some(group.clone());
        }
        desc.status = if req.master_password.is_some() {
            ResourceStatus::ResettingMasterCredentials
        } else {
            ResourceStatus::Modifying
        };
        entry.pending = pending;
        Ok(entry.desc.clone())
    }

    async fn restore_cluster_from_snapshot(
        &self,
        req: &RestoreClusterRequest,
    ) -> RemoteResult<ClusterDescription> {
        let mut state = self.state.lock().await;
        state.record(Call::RestoreCluster(req.clone()))?;
        if !state.snapshots.contains(&req.snapshot) {
            return Err(RemoteError::permanent(
                "DBClusterSnapshotNotFoundFault",
                format!("snapshot {} not found", req.snapshot),
            ));
        }
        if state.clusters.contains_key(&req.cluster_id) {
            return Err(RemoteError::permanent(
                "DBClusterAlreadyExistsFault",
                format!("cluster {} already exists", req.cluster_id),
            ));
        }
        let desc = ClusterDescription {
            cluster_id: req.cluster_id.clone(),
            arn: cluster_arn(&req.cluster_id),
            status: ResourceStatus::Creating,
            engine: req.engine.clone(),
            engine_version: Some(
                req.engine_version
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ENGINE_VERSION.to_string()),
            ),
            port: Some(req.port.unwrap_or(DEFAULT_PORT)),
            availability_zones: req.availability_zones.clone().unwrap_or_default(),
            subnet_group: req.subnet_group.clone(),
            vpc_security_group_ids: req.vpc_security_group_ids.clone().unwrap_or_default(),
            parameter_group: req.parameter_group.clone(),
            master_username: None,
            endpoint: Some(format!("{}.cluster.{}.docdb.local", req.cluster_id, REGION)),
            resource_id: Some(resource_id("cluster")),
            created_at: Some(Utc::now()),
        };
        state
            .tags
            .insert(desc.arn.clone(), req.tags.clone().unwrap_or_default());
        let pending = state.pending(Settle::Status(ResourceStatus::Available));
        state.clusters.insert(
            desc.cluster_id.clone(),
            Entry {
                desc: desc.clone(),
                pending,
            },
        );
        Ok(desc)
    }

    async fn delete_cluster(&self, id: &str, final_snapshot: Option<&str>) -> RemoteResult<()> {
        let mut state = self.state.lock().await;
        state.record(Call::DeleteCluster {
            id: id.to_string(),
            final_snapshot: final_snapshot.map(str::to_string),
        })?;
        let pending = state.pending(Settle::Gone);
        let entry = state
            .clusters
            .get_mut(id)
            .ok_or_else(|| cluster_not_found(id))?;
        entry.desc.status = ResourceStatus::Deleting;
        entry.pending = pending;
        if let Some(snapshot) = final_snapshot {
            state.snapshots.insert(snapshot.to_string());
        }
        Ok(())
    }

    async fn start_cluster(&self, id: &str) -> RemoteResult<()> {
        let mut state = self.state.lock().await;
        state.record(Call::StartCluster(id.to_string()))?;
        let pending = state.pending(Settle::Status(ResourceStatus::Available));
        let entry = state
            .clusters
            .get_mut(id)
            .ok_or_else(|| cluster_not_found(id))?;
        if entry.desc.status != ResourceStatus::Stopped {
            return Err(RemoteError::permanent(
                "InvalidDBClusterStateFault",
                format!("cluster {} is {}, not stopped", id, entry.desc.status),
            ));
        }
        entry.desc.status = ResourceStatus::Starting;
        entry.pending = pending;
        Ok(())
    }
}

#[async_trait]
impl InstanceApi for MemoryControlPlane {
    async fn describe_instance(&self, id: &str) -> RemoteResult<Lookup<InstanceDescription>> {
        let mut state = self.state.lock().await;
        state.record(Call::DescribeInstance(id.to_string()))?;
        let Some(entry) = state.instances.get_mut(id) else {
            return Ok(Lookup::Absent);
        };
        if observe(entry, |d, s| d.status = s) {
            return Ok(Lookup::Found(entry.desc.clone()));
        }
        let arn = entry.desc.arn.clone();
        state.instances.remove(id);
        state.tags.remove(&arn);
        Ok(Lookup::Absent)
    }

    async fn create_instance(
        &self,
        req: &CreateInstanceRequest,
    ) -> RemoteResult<InstanceDescription> {
        let mut state = self.state.lock().await;
        state.record(Call::CreateInstance(req.clone()))?;
        if !state.clusters.contains_key(&req.cluster_id) {
            return Err(RemoteError::permanent(
                "DBClusterNotFoundFault",
                format!("cluster {} not found", req.cluster_id),
            ));
        }
        if state.instances.contains_key(&req.instance_id) {
            return Err(RemoteError::permanent(
                "DBInstanceAlreadyExists",
                format!("instance {} already exists", req.instance_id),
            ));
        }
        let desc = InstanceDescription {
            instance_id: req.instance_id.clone(),
            arn: instance_arn(&req.instance_id),
            status: ResourceStatus::Creating,
            engine: req.engine.clone(),
            instance_class: req.instance_class.clone(),
            cluster_id: Some(req.cluster_id.clone()),
            availability_zone: req.availability_zone.clone(),
            preferred_maintenance_window: req.preferred_maintenance_window.clone(),
            endpoint: Some(format!("{}.{}.docdb.local", req.instance_id, REGION)),
            resource_id: Some(resource_id("db")),
            created_at: Some(Utc::now()),
        };
        state.tags.insert(desc.arn.clone(), req.tags.clone());
        let pending = state.pending(Settle::Status(ResourceStatus::Available));
        state.instances.insert(
            desc.instance_id.clone(),
            Entry {
                desc: desc.clone(),
                pending,
            },
        );
        Ok(desc)
    }

    async fn modify_instance(
        &self,
        id: &str,
        req: &ModifyInstanceRequest,
    ) -> RemoteResult<InstanceDescription> {
        let mut state = self.state.lock().await;
        state.record(Call::ModifyInstance(id.to_string(), req.clone()))?;
        let pending = state.pending(Settle::Status(ResourceStatus::Available));
        let entry = state
            .instances
            .get_mut(id)
            .ok_or_else(|| instance_not_found(id))?;
        if let Some(class) = &req.instance_class {
            entry.desc.instance_class = Some(class.clone());
        }
        if let Some(window) = &req.preferred_maintenance_window {
            entry.desc.preferred_maintenance_window = Some(window.clone());
        }
        entry.desc.status = ResourceStatus::Modifying;
        entry.pending = pending;
        Ok(entry.desc.clone())
    }

    async fn delete_instance(&self, id: &str) -> RemoteResult<()> {
        let mut state = self.state.lock().await;
        state.record(Call::DeleteInstance(id.to_string()))?;
        let pending = state.pending(Settle::Gone);
        let entry = state
            .instances
            .get_mut(id)
            .ok_or_else(|| instance_not_found(id))?;
        entry.desc.status = ResourceStatus::Deleting;
        entry.pending = pending;
        Ok(())
    }
}
