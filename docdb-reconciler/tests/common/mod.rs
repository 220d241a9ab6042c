//! Shared fixtures for reconciler integration tests.

#![allow(dead_code)]

use docdb_reconciler::clients::MemoryControlPlane;
use docdb_reconciler::model::{ClusterDescription, InstanceDescription, ResourceStatus, Tags};

pub const CLUSTER_ID: &str = "orders";
pub const INSTANCE_ID: &str = "orders-1";

pub fn cluster_arn(id: &str) -> String {
    format!("arn:aws:rds:us-east-1:000000000000:cluster:{}", id)
}

pub fn instance_arn(id: &str) -> String {
    format!("arn:aws:rds:us-east-1:000000000000:db:{}", id)
}

pub fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs.iter().copied().collect()
}

/// An available cluster as the control plane would describe it.
pub fn available_cluster(id: &str) -> ClusterDescription {
    ClusterDescription {
        cluster_id: id.to_string(),
        arn: cluster_arn(id),
        status: ResourceStatus::Available,
        engine: "docdb".to_string(),
        engine_version: Some("4.0.0".to_string()),
        port: Some(27017),
        availability_zones: vec!["us-east-1a".to_string(), "us-east-1b".to_string()],
        subnet_group: Some("private".to_string()),
        vpc_security_group_ids: vec!["sg-a".to_string(), "sg-b".to_string()],
        parameter_group: Some("default.docdb4.0".to_string()),
        master_username: Some("admin".to_string()),
        endpoint: Some(format!("{}.cluster.us-east-1.docdb.local", id)),
        resource_id: Some("cluster-TEST".to_string()),
        created_at: None,
    }
}

pub fn available_instance(id: &str, cluster_id: &str) -> InstanceDescription {
    InstanceDescription {
        instance_id: id.to_string(),
        arn: instance_arn(id),
        status: ResourceStatus::Available,
        engine: "docdb".to_string(),
        instance_class: Some("db.r5.large".to_string()),
        cluster_id: Some(cluster_id.to_string()),
        availability_zone: Some("us-east-1a".to_string()),
        preferred_maintenance_window: None,
        endpoint: Some(format!("{}.us-east-1.docdb.local", id)),
        resource_id: Some("db-TEST".to_string()),
        created_at: None,
    }
}

/// Control plane holding one available cluster.
pub async fn plane_with_cluster(desc: ClusterDescription, tags: Tags) -> MemoryControlPlane {
    let plane = MemoryControlPlane::new().with_settle_delay(2);
    plane.insert_cluster(desc, tags).await;
    plane
}

/// Control plane holding the default cluster and one instance in it.
pub async fn plane_with_instance(desc: InstanceDescription, tags: Tags) -> MemoryControlPlane {
    let plane = plane_with_cluster(available_cluster(CLUSTER_ID), Tags::new()).await;
    plane.insert_instance(desc, tags).await;
    plane
}
