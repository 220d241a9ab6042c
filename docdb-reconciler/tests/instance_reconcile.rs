//! Integration tests for instance reconciliation against the in-memory control plane.

mod common;

use std::time::Duration;

use common::*;
use docdb_reconciler::clients::memory::{Call, Op};
use docdb_reconciler::desired::{DeleteInstance, InstanceOperation, InstanceSpec};
use docdb_reconciler::model::{Observed, ResourceStatus, Tags, WaitPolicy};
use docdb_reconciler::{InstanceReconciler, OutcomeKind, Reconciler, RemoteError, TagPolicy};

fn desired(tag_pairs: &[(&str, &str)]) -> InstanceSpec {
    InstanceSpec::new(INSTANCE_ID, CLUSTER_ID)
        .unwrap()
        .with_instance_class("db.r5.large")
        .with_availability_zone("us-east-1a")
        .with_tags(tags(tag_pairs))
}

fn status_of(resource: &Option<Observed>) -> Option<ResourceStatus> {
    resource.as_ref().map(|r| r.status().clone())
}

#[tokio::test(start_paused = true)]
async fn test_create_in_existing_cluster() {
    let plane = plane_with_cluster(available_cluster(CLUSTER_ID), Tags::new()).await;
    let reconciler = InstanceReconciler::new(plane);
    let spec = desired(&[("Env", "dev")]).with_wait(WaitPolicy::enabled());

    let outcome = reconciler.reconcile(&spec).await.unwrap();
    assert_eq!(outcome.kind(), OutcomeKind::Created);
    assert_eq!(status_of(&outcome.resource), Some(ResourceStatus::Available));

    let mutations = reconciler.client().mutations().await;
    assert_eq!(mutations.len(), 1);
    let Call::CreateInstance(request) = &mutations[0] else {
        panic!("expected create, got {:?}", mutations[0]);
    };
    assert_eq!(request.cluster_id, CLUSTER_ID);
    assert_eq!(request.engine, "docdb");
    assert_eq!(request.instance_class.as_deref(), Some("db.r5.large"));
    assert_eq!(request.tags, tags(&[("Env", "dev")]));
}

#[tokio::test(start_paused = true)]
async fn test_create_without_cluster_fails() {
    let reconciler = InstanceReconciler::new(docdb_reconciler::clients::MemoryControlPlane::new());

    let outcome = reconciler
        .execute(&InstanceOperation::Converge(desired(&[])))
        .await;
    assert_eq!(outcome.kind(), OutcomeKind::Failed);
    let diagnostic = outcome.diagnostic.unwrap();
    assert!(diagnostic.message.contains("DBClusterNotFoundFault"));
    assert_eq!(diagnostic.request.unwrap()["instance_id"], INSTANCE_ID);
}

#[tokio::test(start_paused = true)]
async fn test_equal_tags_are_still_rewritten() {
    let plane = plane_with_instance(
        available_instance(INSTANCE_ID, CLUSTER_ID),
        tags(&[("Env", "dev")]),
    )
    .await;
    let reconciler = InstanceReconciler::new(plane);

    let outcome = reconciler.reconcile(&desired(&[("Env", "dev")])).await.unwrap();
    assert_eq!(outcome.kind(), OutcomeKind::Unchanged);

    let arn = instance_arn(INSTANCE_ID);
    assert_eq!(
        reconciler.client().calls().await,
        vec![
            Call::DescribeInstance(INSTANCE_ID.to_string()),
            Call::ListTags(arn.clone()),
            Call::RemoveTags(arn.clone(), vec!["Env".to_string()]),
            Call::AddTags(arn.clone(), tags(&[("Env", "dev")])),
        ]
    );
    assert_eq!(reconciler.client().count(Op::ModifyInstance).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_changed_tags_replace_the_whole_set() {
    let plane = plane_with_instance(
        available_instance(INSTANCE_ID, CLUSTER_ID),
        tags(&[("Env", "dev"), ("Owner", "ops")]),
    )
    .await;
    let reconciler = InstanceReconciler::new(plane);
    let spec = desired(&[("Env", "prod")]).with_wait(WaitPolicy::enabled());

    let outcome = reconciler.reconcile(&spec).await.unwrap();
    assert_eq!(outcome.kind(), OutcomeKind::Modified);
    assert!(outcome.changed);

    let arn = instance_arn(INSTANCE_ID);
    let plane = reconciler.client();
    assert_eq!(plane.tags(&arn).await, Some(tags(&[("Env", "prod")])));
    assert!(plane.mutations().await.contains(&Call::RemoveTags(
        arn.clone(),
        vec!["Env".to_string(), "Owner".to_string()]
    )));
}

#[tokio::test(start_paused = true)]
async fn test_if_changed_policy_skips_equal_tags() {
    let plane = plane_with_instance(
        available_instance(INSTANCE_ID, CLUSTER_ID),
        tags(&[("Env", "dev")]),
    )
    .await;
    let reconciler =
        InstanceReconciler::new(plane).with_tag_policy(TagPolicy::ReconcileIfChanged);

    let outcome = reconciler.reconcile(&desired(&[("Env", "dev")])).await.unwrap();
    assert_eq!(outcome.kind(), OutcomeKind::Unchanged);
    assert!(reconciler.client().mutations().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_delete_waits_until_gone() {
    let plane = plane_with_instance(available_instance(INSTANCE_ID, CLUSTER_ID), Tags::new()).await;
    let reconciler = InstanceReconciler::new(plane);

    let outcome = reconciler
        .finalize(&DeleteInstance::new(INSTANCE_ID).unwrap())
        .await
        .unwrap();
    assert_eq!(outcome.kind(), OutcomeKind::Deleted);
    assert!(outcome.changed);

    let plane = reconciler.client();
    assert!(plane.instance(INSTANCE_ID).await.is_none());
    assert_eq!(plane.count(Op::DeleteInstance).await, 1);
    assert!(plane.count(Op::DescribeInstance).await > 1);
}

#[tokio::test(start_paused = true)]
async fn test_delete_absent_instance_makes_no_delete_call() {
    let plane = plane_with_cluster(available_cluster(CLUSTER_ID), Tags::new()).await;
    let reconciler = InstanceReconciler::new(plane);

    let outcome = reconciler
        .execute(&InstanceOperation::Delete(DeleteInstance::new(INSTANCE_ID).unwrap()))
        .await;
    assert_eq!(outcome.kind(), OutcomeKind::Deleted);
    assert!(!outcome.changed);
    assert_eq!(reconciler.client().count(Op::DeleteInstance).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_delete_timeout_carries_last_state() {
    let plane = docdb_reconciler::clients::MemoryControlPlane::new().with_settle_delay(10_000);
    plane
        .insert_cluster(available_cluster(CLUSTER_ID), Tags::new())
        .await;
    plane
        .insert_instance(available_instance(INSTANCE_ID, CLUSTER_ID), Tags::new())
        .await;
    let reconciler = InstanceReconciler::new(plane);
    let start = tokio::time::Instant::now();

    let outcome = reconciler
        .execute(&InstanceOperation::Delete(DeleteInstance::new(INSTANCE_ID).unwrap()))
        .await;
    assert_eq!(outcome.kind(), OutcomeKind::TimedOut);
    assert_eq!(status_of(&outcome.resource), Some(ResourceStatus::Deleting));
    assert!(start.elapsed() >= Duration::from_secs(1800));
}

#[tokio::test(start_paused = true)]
async fn test_delete_is_lenient_unless_strict() {
    let plane = plane_with_instance(available_instance(INSTANCE_ID, CLUSTER_ID), Tags::new()).await;
    plane
        .fail_next(
            Op::DescribeInstance,
            RemoteError::permanent("AccessDenied", "not allowed"),
        )
        .await;
    let reconciler = InstanceReconciler::new(plane);

    let lenient = reconciler
        .execute(&InstanceOperation::Delete(DeleteInstance::new(INSTANCE_ID).unwrap()))
        .await;
    assert_eq!(lenient.kind(), OutcomeKind::Deleted);
    assert_eq!(reconciler.client().count(Op::DeleteInstance).await, 0);

    reconciler
        .client()
        .fail_next(
            Op::DescribeInstance,
            RemoteError::permanent("AccessDenied", "not allowed"),
        )
        .await;
    let strict = reconciler
        .execute(&InstanceOperation::Delete(
            DeleteInstance::new(INSTANCE_ID).unwrap().lenient(false),
        ))
        .await;
    assert_eq!(strict.kind(), OutcomeKind::Failed);
    assert!(strict.resource.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_strict_delete_failure_keeps_observed_state() {
    let observed = available_instance(INSTANCE_ID, CLUSTER_ID);
    let plane = plane_with_instance(observed.clone(), Tags::new()).await;
    plane
        .fail_next(
            Op::DeleteInstance,
            RemoteError::permanent("InvalidDBInstanceState", "instance is rebooting"),
        )
        .await;
    let reconciler = InstanceReconciler::new(plane);
    let delete = DeleteInstance::new(INSTANCE_ID).unwrap().lenient(false);

    let outcome = reconciler.execute(&InstanceOperation::Delete(delete)).await;
    assert_eq!(outcome.kind(), OutcomeKind::Failed);
    assert_eq!(outcome.resource, Some(Observed::Instance(observed)));
}

#[tokio::test(start_paused = true)]
async fn test_tag_failure_keeps_observed_state() {
    let observed = available_instance(INSTANCE_ID, CLUSTER_ID);
    let plane = plane_with_instance(observed.clone(), tags(&[("Env", "dev")])).await;
    plane
        .fail_next(Op::AddTags, RemoteError::Transient("throttled".into()))
        .await;
    let reconciler = InstanceReconciler::new(plane);

    let outcome = reconciler
        .execute(&InstanceOperation::Converge(desired(&[("Env", "prod")])))
        .await;
    assert_eq!(outcome.kind(), OutcomeKind::Failed);
    assert_eq!(outcome.resource, Some(Observed::Instance(observed)));
}
