//! Remote resource clients for the database control plane.
//!
//! The reconcilers only see the traits below:
//! - `ClusterApi`: describe, create, modify, restore, delete, start
//! - `InstanceApi`: describe, create, modify, delete
//! - `TagApi`: list, add and remove tags by ARN
//!
//! Two adapters are provided: `http::HttpControlPlane` talks JSON over HTTP,
//! `memory::MemoryControlPlane` simulates the control plane in process.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::RemoteResult;
use crate::model::{ClusterDescription, InstanceDescription, Lookup, Password, Tags};

pub use http::HttpControlPlane;
pub use memory::MemoryControlPlane;

/// Request to create an empty cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateClusterRequest {
    pub cluster_id: String,
    pub engine: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zones: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_security_group_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_password: Option<Password>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
}

/// Request to restore a new cluster from a snapshot. Carries no credentials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoreClusterRequest {
    pub cluster_id: String,
    pub snapshot: String,
    pub engine: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zones: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_security_group_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
}

/// Attribute changes applied to an existing cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModifyClusterRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_security_group_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_password: Option<Password>,
    pub apply_immediately: bool,
}

/// Request to create a cluster member instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateInstanceRequest {
    pub instance_id: String,
    pub cluster_id: String,
    pub engine: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_maintenance_window: Option<String>,
    pub tags: Tags,
}

/// Attribute changes applied to an existing instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModifyInstanceRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_maintenance_window: Option<String>,
    pub apply_immediately: bool,
}

/// Tag operations, addressed by ARN.
#[async_trait]
pub trait TagApi: Send + Sync {
    async fn list_tags(&self, arn: &str) -> RemoteResult<Tags>;

    async fn add_tags(&self, arn: &str, tags: &Tags) -> RemoteResult<()>;

    async fn remove_tags(&self, arn: &str, keys: &[String]) -> RemoteResult<()>;

    /// Remove every tag in `current`, then apply `desired`.
    async fn replace_tags(&self, arn: &str, current: &Tags, desired: &Tags) -> RemoteResult<()> {
        self.remove_tags(arn, &current.keys()).await?;
        self.add_tags(arn, desired).await
    }
}

/// Cluster operations.
#[async_trait]
pub trait ClusterApi: TagApi {
    async fn describe_cluster(&self, id: &str) -> RemoteResult<Lookup<ClusterDescription>>;

    async fn create_cluster(&self, req: &CreateClusterRequest) -> RemoteResult<ClusterDescription>;

    async fn modify_cluster(
        &self,
        id: &str,
        req: &ModifyClusterRequest,
    ) -> RemoteResult<ClusterDescription>;

    async fn restore_cluster_from_snapshot(
        &self,
        req: &RestoreClusterRequest,
    ) -> RemoteResult<ClusterDescription>;

    async fn delete_cluster(&self, id: &str, final_snapshot: Option<&str>) -> RemoteResult<()>;

    async fn start_cluster(&self, id: &str) -> RemoteResult<()>;
}

/// Instance operations.
#[async_trait]
pub trait InstanceApi: TagApi {
    async fn describe_instance(&self, id: &str) -> RemoteResult<Lookup<InstanceDescription>>;

    async fn create_instance(
        &self,
        req: &CreateInstanceRequest,
    ) -> RemoteResult<InstanceDescription>;

    async fn modify_instance(
        &self,
        id: &str,
        req: &ModifyInstanceRequest,
    ) -> RemoteResult<InstanceDescription>;

    async fn delete_instance(&self, id: &str) -> RemoteResult<()>;
}
