//! Tag reconciliation strategy per resource kind.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info};

use crate::clients::TagApi;
use crate::error::{RemoteResult, ValidationError};
use crate::model::Tags;

/// How an existing resource's tags are brought in line with the desired set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagPolicy {
    /// Never read or write tags on an existing resource.
    Ignore,
    /// Issue the minimal removals and additions, nothing when equal.
    ReconcileIfChanged,
    /// Remove every current tag and add every desired tag on each pass.
    ReconcileAlways,
}

impl TagPolicy {
    /// Cluster tags are applied at creation only.
    pub const CLUSTER_DEFAULT: TagPolicy = TagPolicy::Ignore;
    pub const INSTANCE_DEFAULT: TagPolicy = TagPolicy::ReconcileAlways;

    /// Apply the policy. Returns whether the effective tag set changed.
    pub async fn apply<C>(&self, client: &C, arn: &str, desired: Option<&Tags>) -> RemoteResult<bool>
    where
        C: TagApi + ?Sized,
    {
        let Some(desired) = desired else {
            return Ok(false);
        };

        match self {
            TagPolicy::Ignore => Ok(false),
            TagPolicy::ReconcileAlways => {
                let current = client.list_tags(arn).await?;
                info!("Replacing {} tags on {}", current.len(), arn);
                client.replace_tags(arn, &current, desired).await?;
                Ok(current != *desired)
            }
            TagPolicy::ReconcileIfChanged => {
                let current = client.list_tags(arn).await?;
                let plan = TagPlan::between(&current, desired);
                if plan.is_empty() {
                    debug!("Tags on {} already match", arn);
                    return Ok(false);
                }
                info!(
                    remove = plan.remove.len(),
                    add = plan.add.len(),
                    "Updating tags on {}",
                    arn
                );
                if !plan.remove.is_empty() {
                    client.remove_tags(arn, &plan.remove).await?;
                }
                if !plan.add.is_empty() {
                    client.add_tags(arn, &plan.add).await?;
                }
                Ok(true)
            }
        }
    }
}

impl fmt::Display for TagPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TagPolicy::Ignore => "ignore",
            TagPolicy::ReconcileIfChanged => "reconcile-if-changed",
            TagPolicy::ReconcileAlways => "reconcile-always",
        })
    }
}

impl FromStr for TagPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(TagPolicy::Ignore),
            "reconcile-if-changed" => Ok(TagPolicy::ReconcileIfChanged),
            "reconcile-always" => Ok(TagPolicy::ReconcileAlways),
            other => Err(ValidationError::UnknownTagPolicy(other.to_string())),
        }
    }
}

/// Minimal tag changes between two sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagPlan {
    /// Keys absent from the desired set.
    pub remove: Vec<String>,
    /// New keys and keys whose value differs.
    pub add: Tags,
}

impl TagPlan {
    pub fn between(current: &Tags, desired: &Tags) -> Self {
        let remove = current
            .iter()
            .filter(|(k, _)| desired.get(k).is_none())
            .map(|(k, _)| k.clone())
            .collect();
        let add = desired
            .iter()
            .filter(|(k, v)| current.get(k) != Some(v.as_str()))
            .collect();
        Self { remove, add }
    }

    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::memory::{Call, MemoryControlPlane, Op};
    use crate::model::{InstanceDescription, ResourceStatus};

    const ARN: &str = "arn:aws:rds:us-east-1:000000000000:db:i1";

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs.iter().copied().collect()
    }

    async fn plane_with(current: Tags) -> MemoryControlPlane {
        let plane = MemoryControlPlane::new();
        plane
            .insert_instance(
                InstanceDescription {
                    instance_id: "i1".to_string(),
                    arn: ARN.to_string(),
                    status: ResourceStatus::Available,
                    engine: "docdb".to_string(),
                    instance_class: None,
                    cluster_id: Some("c1".to_string()),
                    availability_zone: None,
                    preferred_maintenance_window: None,
                    endpoint: None,
                    resource_id: None,
                    created_at: None,
                },
                current,
            )
            .await;
        plane
    }

    #[test]
    fn test_plan_between() {
        let plan = TagPlan::between(
            &tags(&[("Env", "dev"), ("Owner", "me"), ("Name", "c1")]),
            &tags(&[("Env", "prod"), ("Name", "c1"), ("Team", "db")]),
        );
        assert_eq!(plan.remove, vec!["Owner".to_string()]);
        assert_eq!(plan.add, tags(&[("Env", "prod"), ("Team", "db")]));
    }

    #[test]
    fn test_policy_parse_roundtrip() {
        for policy in [
            TagPolicy::Ignore,
            TagPolicy::ReconcileIfChanged,
            TagPolicy::ReconcileAlways,
        ] {
            assert_eq!(policy.to_string().parse::<TagPolicy>().unwrap(), policy);
        }
        assert!("sometimes".parse::<TagPolicy>().is_err());
    }

    #[tokio::test]
    async fn test_always_rewrites_equal_tags() {
        let current = tags(&[("Env", "dev")]);
        let plane = plane_with(current.clone()).await;

        let changed = TagPolicy::ReconcileAlways
            .apply(&plane, ARN, Some(&current))
            .await
            .unwrap();

        assert!(!changed);
        assert_eq!(
            plane.calls().await,
            vec![
                Call::ListTags(ARN.to_string()),
                Call::RemoveTags(ARN.to_string(), vec!["Env".to_string()]),
                Call::AddTags(ARN.to_string(), current.clone()),
            ]
        );
    }

    #[tokio::test]
    async fn test_if_changed_skips_equal_tags() {
        let current = tags(&[("Env", "dev")]);
        let plane = plane_with(current.clone()).await;

        let changed = TagPolicy::ReconcileIfChanged
            .apply(&plane, ARN, Some(&current))
            .await
            .unwrap();

        assert!(!changed);
        assert_eq!(plane.mutations().await, vec![]);
    }

    #[tokio::test]
    async fn test_if_changed_applies_minimal_plan() {
        let plane = plane_with(tags(&[("Env", "dev"), ("Old", "x")])).await;

        let changed = TagPolicy::ReconcileIfChanged
            .apply(&plane, ARN, Some(&tags(&[("Env", "prod")])))
            .await
            .unwrap();

        assert!(changed);
        assert_eq!(plane.tags(ARN).await, Some(tags(&[("Env", "prod")])));
        assert_eq!(plane.count(Op::RemoveTags).await, 1);
        assert_eq!(plane.count(Op::AddTags).await, 1);
    }

    #[tokio::test]
    async fn test_ignore_makes_no_calls() {
        let plane = plane_with(tags(&[("Env", "dev")])).await;

        let changed = TagPolicy::Ignore
            .apply(&plane, ARN, Some(&tags(&[("Env", "prod")])))
            .await
            .unwrap();

        assert!(!changed);
        assert!(plane.calls().await.is_empty());
    }
}
