//! Desired-state records, one explicit configuration struct per operation.
//!
//! Every constructor validates its required fields, so a value of any of these
//! types always names exactly one resource.

use crate::error::ValidationError;
use crate::model::{Password, Tags, WaitPolicy};

/// The only engine the control plane accepts.
pub const ENGINE_DOCDB: &str = "docdb";

fn require_id(field: &'static str, id: impl Into<String>) -> Result<String, ValidationError> {
    let id = id.into();
    if id.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(id)
}

fn require_engine(engine: impl Into<String>) -> Result<String, ValidationError> {
    let engine = engine.into();
    if engine != ENGINE_DOCDB {
        return Err(ValidationError::UnsupportedEngine(engine));
    }
    Ok(engine)
}

/// Target shape of a cluster for the converge operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSpec {
    cluster_id: String,
    pub engine: String,
    pub engine_version: Option<String>,
    pub port: Option<u16>,
    pub availability_zones: Option<Vec<String>>,
    pub subnet_group: Option<String>,
    pub vpc_security_group_ids: Option<Vec<String>>,
    pub parameter_group: Option<String>,
    pub master_username: Option<String>,
    pub master_password: Option<Password>,
    pub tags: Option<Tags>,
    /// Snapshot to restore from when the cluster does not exist yet.
    pub snapshot: Option<String>,
    pub wait: WaitPolicy,
}

impl ClusterSpec {
    pub fn new(cluster_id: impl Into<String>) -> Result<Self, ValidationError> {
        Ok(Self {
            cluster_id: require_id("cluster_id", cluster_id)?,
            engine: ENGINE_DOCDB.to_string(),
            engine_version: None,
            port: None,
            availability_zones: None,
            subnet_group: None,
            vpc_security_group_ids: None,
            parameter_group: None,
            master_username: None,
            master_password: None,
            tags: None,
            snapshot: None,
            wait: WaitPolicy::disabled(),
        })
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Result<Self, ValidationError> {
        self.engine = require_engine(engine)?;
        Ok(self)
    }

    pub fn with_engine_version(mut self, version: impl Into<String>) -> Self {
        self.engine_version = Some(version.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_availability_zones(mut self, zones: Vec<String>) -> Self {
        self.availability_zones = Some(zones);
        self
    }

    pub fn with_subnet_group(mut self, group: impl Into<String>) -> Self {
        self.subnet_group = Some(group.into());
        self
    }

    pub fn with_security_groups(mut self, ids: Vec<String>) -> Self {
        self.vpc_security_group_ids = Some(ids);
        self
    }

    pub fn with_parameter_group(mut self, group: impl Into<String>) -> Self {
        self.parameter_group = Some(group.into());
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: Password) -> Self {
        self.master_username = Some(username.into());
        self.master_password = Some(password);
        self
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_snapshot(mut self, snapshot: impl Into<String>) -> Self {
        self.snapshot = Some(snapshot.into());
        self
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }
}

/// Cluster deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteCluster {
    cluster_id: String,
    /// Final snapshot to take; when set the delete does not skip the snapshot.
    pub final_snapshot: Option<String>,
    /// Treat every delete-time error as "already absent". On by default;
    /// when off only not-found counts as absent.
    pub lenient: bool,
    pub wait: WaitPolicy,
}

impl DeleteCluster {
    pub fn new(cluster_id: impl Into<String>) -> Result<Self, ValidationError> {
        Ok(Self {
            cluster_id: require_id("cluster_id", cluster_id)?,
            final_snapshot: None,
            lenient: true,
            wait: WaitPolicy::disabled(),
        })
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn with_final_snapshot(mut self, name: impl Into<String>) -> Self {
        self.final_snapshot = Some(name.into());
        self
    }

    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }
}

/// Start a stopped cluster. Waits for availability by default.
#[derive(Debug, Clone, PartialEq)]
pub struct StartCluster {
    cluster_id: String,
    pub wait: WaitPolicy,
}

impl StartCluster {
    pub fn new(cluster_id: impl Into<String>) -> Result<Self, ValidationError> {
        Ok(Self {
            cluster_id: require_id("cluster_id", cluster_id)?,
            wait: WaitPolicy::enabled(),
        })
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }
}

/// Forced master password rotation. Waits for availability by default.
#[derive(Debug, Clone, PartialEq)]
pub struct PasswordUpdate {
    cluster_id: String,
    password: Password,
    pub wait: WaitPolicy,
}

impl PasswordUpdate {
    pub fn new(
        cluster_id: impl Into<String>,
        password: Option<Password>,
    ) -> Result<Self, ValidationError> {
        let cluster_id = require_id("cluster_id", cluster_id)?;
        let password = password.ok_or(ValidationError::Required("master_password"))?;
        if password.expose().is_empty() {
            return Err(ValidationError::Empty {
                field: "master_password",
            });
        }
        Ok(Self {
            cluster_id,
            password,
            wait: WaitPolicy::enabled(),
        })
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn password(&self) -> &Password {
        &self.password
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }
}

/// Target shape of a cluster member instance.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceSpec {
    instance_id: String,
    cluster_id: String,
    pub engine: String,
    pub instance_class: Option<String>,
    pub availability_zone: Option<String>,
    pub preferred_maintenance_window: Option<String>,
    pub tags: Tags,
    pub wait: WaitPolicy,
}

impl InstanceSpec {
    /// An instance always belongs to a cluster.
    pub fn new(
        instance_id: impl Into<String>,
        cluster_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            instance_id: require_id("instance_id", instance_id)?,
            cluster_id: require_id("cluster_id", cluster_id)?,
            engine: ENGINE_DOCDB.to_string(),
            instance_class: None,
            availability_zone: None,
            preferred_maintenance_window: None,
            tags: Tags::new(),
            wait: WaitPolicy::disabled(),
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Result<Self, ValidationError> {
        self.engine = require_engine(engine)?;
        Ok(self)
    }

    pub fn with_instance_class(mut self, class: impl Into<String>) -> Self {
        self.instance_class = Some(class.into());
        self
    }

    pub fn with_availability_zone(mut self, zone: impl Into<String>) -> Self {
        self.availability_zone = Some(zone.into());
        self
    }

    pub fn with_maintenance_window(mut self, window: impl Into<String>) -> Self {
        self.preferred_maintenance_window = Some(window.into());
        self
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }
}

/// Instance deletion. Waits until the instance is gone by default.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteInstance {
    instance_id: String,
    pub lenient: bool,
    pub wait: WaitPolicy,
}

impl DeleteInstance {
    pub fn new(instance_id: impl Into<String>) -> Result<Self, ValidationError> {
        Ok(Self {
            instance_id: require_id("instance_id", instance_id)?,
            lenient: true,
            wait: WaitPolicy::enabled(),
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }
}

/// Operation selector for a cluster invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterOperation {
    Converge(ClusterSpec),
    Delete(DeleteCluster),
    Start(StartCluster),
    ForcePasswordUpdate(PasswordUpdate),
}

impl ClusterOperation {
    pub fn cluster_id(&self) -> &str {
        match self {
            ClusterOperation::Converge(s) => s.cluster_id(),
            ClusterOperation::Delete(d) => d.cluster_id(),
            ClusterOperation::Start(s) => s.cluster_id(),
            ClusterOperation::ForcePasswordUpdate(p) => p.cluster_id(),
        }
    }
}

/// Operation selector for an instance invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceOperation {
    Converge(InstanceSpec),
    Delete(DeleteInstance),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_identifier_rejected() {
        assert_eq!(
            ClusterSpec::new("  "),
            Err(ValidationError::Empty { field: "cluster_id" })
        );
        assert_eq!(
            InstanceSpec::new("i1", ""),
            Err(ValidationError::Empty { field: "cluster_id" })
        );
    }

    #[test]
    fn test_only_docdb_engine() {
        let spec = ClusterSpec::new("c1").unwrap();
        assert_eq!(spec.engine, ENGINE_DOCDB);
        assert_eq!(
            spec.with_engine("mysql"),
            Err(ValidationError::UnsupportedEngine("mysql".into()))
        );
    }

    #[test]
    fn test_password_update_requires_password() {
        assert_eq!(
            PasswordUpdate::new("c1", None),
            Err(ValidationError::Required("master_password"))
        );
        assert_eq!(
            PasswordUpdate::new("c1", Some(Password::new(""))),
            Err(ValidationError::Empty {
                field: "master_password"
            })
        );
        let update = PasswordUpdate::new("c1", Some(Password::new("s3cret"))).unwrap();
        assert!(update.wait.enabled);
    }

    #[test]
    fn test_delete_defaults_are_lenient() {
        let delete = DeleteCluster::new("c1").unwrap();
        assert!(delete.lenient);
        assert!(!delete.wait.enabled);
        assert!(delete.final_snapshot.is_none());
        assert!(!delete.lenient(false).lenient);

        let delete = DeleteInstance::new("i1").unwrap();
        assert!(delete.lenient);
        assert!(delete.wait.enabled);
    }
}
