//! Declarative input for one invocation.
//!
//! A manifest names a resource kind and carries the module arguments for it.
//! It is validated into exactly one operation record before anything remote
//! happens.

use serde::Deserialize;

use crate::desired::{
    ClusterOperation, ClusterSpec, DeleteCluster, DeleteInstance, InstanceOperation, InstanceSpec,
    PasswordUpdate, StartCluster,
};
use crate::error::ValidationError;
use crate::model::{Password, Tags, WaitPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    #[default]
    Present,
    Absent,
    Running,
}

impl State {
    fn as_str(&self) -> &'static str {
        match self {
            State::Present => "present",
            State::Absent => "absent",
            State::Running => "running",
        }
    }
}

fn default_engine() -> String {
    crate::desired::ENGINE_DOCDB.to_string()
}

fn default_instance_wait_timeout() -> u64 {
    1200
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterManifest {
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub state: State,
    pub snapshot_arn: Option<String>,
    pub availability_zones: Option<Vec<String>>,
    #[serde(default = "default_engine")]
    pub engine: String,
    pub engine_version: Option<String>,
    pub master_username: Option<String>,
    pub master_password: Option<String>,
    #[serde(default)]
    pub force_update_password: bool,
    pub port: Option<u32>,
    pub subnet_group: Option<String>,
    pub cluster_parameter_group: Option<String>,
    pub tags: Option<Tags>,
    pub vpc_security_group_ids: Option<Vec<String>>,
    #[serde(default)]
    pub wait: bool,
    #[serde(default)]
    pub wait_timeout: u64,
    pub final_db_cluster_snapshot_identifier: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstanceManifest {
    pub instance_id: Option<String>,
    pub cluster_id: Option<String>,
    pub instance_type: Option<String>,
    #[serde(default = "default_engine")]
    pub engine: String,
    pub availability_zone: Option<String>,
    pub preferred_maintenance_window: Option<String>,
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub wait: bool,
    #[serde(default = "default_instance_wait_timeout")]
    pub wait_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Manifest {
    Cluster(ClusterManifest),
    Instance(InstanceManifest),
}

/// Validated operation for either resource kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Cluster(ClusterOperation),
    Instance(InstanceOperation),
}

impl Manifest {
    pub fn from_json(input: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(input).map_err(|e| ValidationError::Manifest(e.to_string()))
    }

    /// `strict_delete` narrows "already absent" on delete to not-found errors.
    pub fn into_operation(self, strict_delete: bool) -> Result<Operation, ValidationError> {
        match self {
            Manifest::Cluster(m) => m.into_operation(strict_delete).map(Operation::Cluster),
            Manifest::Instance(m) => m.into_operation(strict_delete).map(Operation::Instance),
        }
    }
}

fn checked_port(port: u32) -> Result<u16, ValidationError> {
    u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or(ValidationError::InvalidPort(port))
}

impl ClusterManifest {
    pub fn into_operation(self, strict_delete: bool) -> Result<ClusterOperation, ValidationError> {
        let id = self.cluster_id.ok_or(ValidationError::Required("cluster_id"))?;

        // A forced password update wins over the declared state.
        if self.force_update_password {
            let update = PasswordUpdate::new(id, self.master_password.map(Password::new))?
                .with_wait(WaitPolicy::from_secs(true, self.wait_timeout));
            return Ok(ClusterOperation::ForcePasswordUpdate(update));
        }

        match self.state {
            State::Absent => {
                let mut delete = DeleteCluster::new(id)?
                    .lenient(!strict_delete)
                    .with_wait(WaitPolicy::from_secs(self.wait, self.wait_timeout));
                if let Some(snapshot) = self.final_db_cluster_snapshot_identifier {
                    delete = delete.with_final_snapshot(snapshot);
                }
                Ok(ClusterOperation::Delete(delete))
            }
            State::Running => {
                let start = StartCluster::new(id)?
                    .with_wait(WaitPolicy::from_secs(true, self.wait_timeout));
                Ok(ClusterOperation::Start(start))
            }
            State::Present => {
                let mut spec = ClusterSpec::new(id)?
                    .with_engine(self.engine)?
                    .with_wait(WaitPolicy::from_secs(self.wait, self.wait_timeout));
                spec.engine_version = self.engine_version;
                spec.port = self.port.map(checked_port).transpose()?;
                spec.availability_zones = self.availability_zones;
                spec.subnet_group = self.subnet_group;
                spec.vpc_security_group_ids = self.vpc_security_group_ids;
                spec.parameter_group = self.cluster_parameter_group;
                spec.master_username = self.master_username;
                spec.master_password = self.master_password.map(Password::new);
                spec.tags = self.tags;
                spec.snapshot = self.snapshot_arn;
                Ok(ClusterOperation::Converge(spec))
            }
        }
    }
}

impl InstanceManifest {
    pub fn into_operation(self, strict_delete: bool) -> Result<InstanceOperation, ValidationError> {
        let id = self.instance_id.ok_or(ValidationError::Required("instance_id"))?;

        match self.state {
            State::Absent => {
                let delete = DeleteInstance::new(id)?.lenient(!strict_delete);
                Ok(InstanceOperation::Delete(delete))
            }
            State::Present => {
                let cluster_id = self.cluster_id.ok_or(ValidationError::Required("cluster_id"))?;
                let mut spec = InstanceSpec::new(id, cluster_id)?
                    .with_engine(self.engine)?
                    .with_tags(self.tags)
                    .with_wait(WaitPolicy::from_secs(self.wait, self.wait_timeout));
                spec.instance_class = self.instance_type;
                spec.availability_zone = self.availability_zone;
                spec.preferred_maintenance_window = self.preferred_maintenance_window;
                Ok(InstanceOperation::Converge(spec))
            }
            State::Running => Err(ValidationError::UnsupportedState {
                kind: "instance",
                state: self.state.as_str().to_string(),
            }),
        }
    }
}
