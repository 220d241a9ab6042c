//! State differ: the minimal set of attribute changes to converge.
//!
//! Only attributes the caller supplied are compared. Credentials and tags are
//! never part of a diff; passwords change only through a forced update, and
//! tags are governed by `TagPolicy`.

use std::collections::BTreeSet;

use crate::clients::{ModifyClusterRequest, ModifyInstanceRequest};
use crate::desired::{ClusterSpec, InstanceSpec};
use crate::model::{ClusterDescription, InstanceDescription};

/// Changes to apply to an existing cluster. Empty means no-op.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterChanges {
    pub engine_version: Option<String>,
    pub port: Option<u16>,
    pub vpc_security_group_ids: Option<Vec<String>>,
    pub parameter_group: Option<String>,
}

impl ClusterChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Names of the changed attributes, for logs.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.engine_version.is_some() {
            fields.push("engine_version");
        }
        if self.port.is_some() {
            fields.push("port");
        }
        if self.vpc_security_group_ids.is_some() {
            fields.push("vpc_security_group_ids");
        }
        if self.parameter_group.is_some() {
            fields.push("parameter_group");
        }
        fields
    }

    pub fn into_request(self) -> ModifyClusterRequest {
        ModifyClusterRequest {
            engine_version: self.engine_version,
            port: self.port,
            vpc_security_group_ids: self.vpc_security_group_ids,
            parameter_group: self.parameter_group,
            master_password: None,
            apply_immediately: false,
        }
    }
}

fn changed<T: PartialEq + Clone>(observed: Option<&T>, desired: Option<&T>) -> Option<T> {
    match desired {
        Some(d) if observed != Some(d) => Some(d.clone()),
        _ => None,
    }
}

/// Security group membership is compared as a set.
fn same_members(observed: &[String], desired: &[String]) -> bool {
    let observed: BTreeSet<&str> = observed.iter().map(String::as_str).collect();
    let desired: BTreeSet<&str> = desired.iter().map(String::as_str).collect();
    observed == desired
}

pub fn cluster_changes(observed: &ClusterDescription, desired: &ClusterSpec) -> ClusterChanges {
    let vpc_security_group_ids = desired
        .vpc_security_group_ids
        .as_ref()
        .filter(|groups| !same_members(&observed.vpc_security_group_ids, groups))
        .cloned();

    ClusterChanges {
        engine_version: changed(
            observed.engine_version.as_ref(),
            desired.engine_version.as_ref(),
        ),
        port: changed(observed.port.as_ref(), desired.port.as_ref()),
        vpc_security_group_ids,
        parameter_group: changed(
            observed.parameter_group.as_ref(),
            desired.parameter_group.as_ref(),
        ),
    }
}

/// Changes to apply to an existing instance.
///
/// No instance attribute is diffed yet, so this is always empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceChanges {
    pub instance_class: Option<String>,
    pub preferred_maintenance_window: Option<String>,
}

impl InstanceChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn into_request(self) -> ModifyInstanceRequest {
        ModifyInstanceRequest {
            instance_class: self.instance_class,
            preferred_maintenance_window: self.preferred_maintenance_window,
            apply_immediately: false,
        }
    }
}

pub fn instance_changes(
    _observed: &InstanceDescription,
    _desired: &InstanceSpec,
) -> InstanceChanges {
    InstanceChanges::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Password, ResourceStatus, Tags};

    fn observed() -> ClusterDescription {
        ClusterDescription {
            cluster_id: "c1".to_string(),
            arn: "arn:aws:rds:us-east-1:000000000000:cluster:c1".to_string(),
            status: ResourceStatus::Available,
            engine: "docdb".to_string(),
            engine_version: Some("4.0.0".to_string()),
            port: Some(27017),
            availability_zones: vec!["us-east-1a".to_string()],
            subnet_group: Some("sg1".to_string()),
            vpc_security_group_ids: vec!["sg-a".to_string(), "sg-b".to_string()],
            parameter_group: Some("default.docdb4.0".to_string()),
            master_username: Some("admin".to_string()),
            endpoint: None,
            resource_id: None,
            created_at: None,
        }
    }

    fn groups(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_security_group_order_is_irrelevant() {
        let spec = ClusterSpec::new("c1")
            .unwrap()
            .with_security_groups(groups(&["sg-b", "sg-a"]));
        assert!(cluster_changes(&observed(), &spec).is_empty());
    }

    #[test]
    fn test_security_group_membership_change() {
        let spec = ClusterSpec::new("c1")
            .unwrap()
            .with_security_groups(groups(&["sg-a", "sg-c"]));
        let changes = cluster_changes(&observed(), &spec);
        assert_eq!(changes.vpc_security_group_ids, Some(groups(&["sg-a", "sg-c"])));
        assert_eq!(changes.fields(), vec!["vpc_security_group_ids"]);
    }

    #[test]
    fn test_unspecified_attributes_never_change() {
        let spec = ClusterSpec::new("c1").unwrap();
        assert!(cluster_changes(&observed(), &spec).is_empty());
    }

    #[test]
    fn test_port_version_and_parameter_group() {
        let spec = ClusterSpec::new("c1")
            .unwrap()
            .with_port(27018)
            .with_engine_version("5.0.0")
            .with_parameter_group("custom");
        let changes = cluster_changes(&observed(), &spec);
        assert_eq!(
            changes,
            ClusterChanges {
                engine_version: Some("5.0.0".to_string()),
                port: Some(27018),
                vpc_security_group_ids: None,
                parameter_group: Some("custom".to_string()),
            }
        );
        let request = changes.into_request();
        assert!(!request.apply_immediately);
        assert!(request.master_password.is_none());
    }

    #[test]
    fn test_tags_and_credentials_excluded() {
        let mut tags = Tags::new();
        tags.insert("Env", "prod");
        let spec = ClusterSpec::new("c1")
            .unwrap()
            .with_tags(tags)
            .with_credentials("root", Password::new("different"))
            .with_availability_zones(groups(&["us-east-1b"]));
        assert!(cluster_changes(&observed(), &spec).is_empty());
    }
}
