//! Cluster reconciler.
//!
//! Converge decision tree:
//! - absent, snapshot given: restore from the snapshot
//! - absent, no snapshot: create with credentials
//! - present: diff settable attributes, modify when the diff is non-empty
//!
//! Delete, start and forced password update are separate entry points and
//! never fall into the create/restore branch.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info, warn};

use super::{Reconciler, Timings};
use crate::clients::{
    ClusterApi, CreateClusterRequest, ModifyClusterRequest, RestoreClusterRequest,
};
use crate::desired::{ClusterOperation, ClusterSpec, DeleteCluster, PasswordUpdate, StartCluster};
use crate::diff;
use crate::error::{ReconcileError, Result};
use crate::model::{ClusterDescription, Lookup};
use crate::outcome::{Outcome, OutcomeKind};
use crate::poller::{PollOutcome, Poller};
use crate::tags::TagPolicy;

/// Reconciles one cluster per invocation against the control plane.
pub struct ClusterReconciler<C> {
    client: C,
    poller: Poller,
    timings: Timings,
    tag_policy: TagPolicy,
}

impl<C: ClusterApi> ClusterReconciler<C> {
    pub fn new(client: C) -> Self {
        let timings = Timings::default();
        Self {
            client,
            poller: Poller::new(timings.poll_interval),
            timings,
            tag_policy: TagPolicy::CLUSTER_DEFAULT,
        }
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.poller = Poller::new(timings.poll_interval);
        self.timings = timings;
        self
    }

    pub fn with_tag_policy(mut self, policy: TagPolicy) -> Self {
        self.tag_policy = policy;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run the selected operation and fold any error into the outcome.
    pub async fn execute(&self, op: &ClusterOperation) -> Outcome {
        let result = match op {
            ClusterOperation::Converge(spec) => self.reconcile(spec).await,
            ClusterOperation::Delete(removal) => self.finalize(removal).await,
            ClusterOperation::Start(start) => self.start(start).await,
            ClusterOperation::ForcePasswordUpdate(update) => self.update_password(update).await,
        };
        if let Err(e) = &result {
            error!("Cluster {} failed: {}", op.cluster_id(), e);
        }
        Outcome::from_result(result)
    }

    /// Start a stopped cluster, then wait for it to become available.
    pub async fn start(&self, start: &StartCluster) -> Result<Outcome> {
        let id = start.cluster_id();
        info!("Starting cluster {}", id);
        self.client
            .start_cluster(id)
            .await
            .map_err(|e| ReconcileError::remote("start cluster", e))?;

        if !start.wait.enabled {
            return Ok(Outcome::new(OutcomeKind::Started, None));
        }
        let timeout = start.wait.timeout_or(self.timings.cluster_start);
        let cluster = self.wait_available(id, Duration::ZERO, timeout).await?;
        Ok(Outcome::new(OutcomeKind::Started, Some(cluster.into())))
    }

    /// Rotate the master password without looking at the current state.
    pub async fn update_password(&self, update: &PasswordUpdate) -> Result<Outcome> {
        let id = update.cluster_id();
        let request = ModifyClusterRequest {
            master_password: Some(update.password().clone()),
            apply_immediately: true,
            ..Default::default()
        };
        info!("Updating master password of cluster {}", id);
        let modified = self
            .client
            .modify_cluster(id, &request)
            .await
            .map_err(|e| ReconcileError::remote_with_request("update master password", e, &request))?;

        if !update.wait.enabled {
            return Ok(Outcome::new(OutcomeKind::Modified, Some(modified.into())));
        }
        let timeout = update.wait.timeout_or(self.timings.password_update);
        let cluster = self
            .wait_available(id, self.timings.password_settle, timeout)
            .await?;
        Ok(Outcome::new(OutcomeKind::Modified, Some(cluster.into())))
    }

    async fn create(&self, spec: &ClusterSpec) -> Result<(OutcomeKind, ClusterDescription, Duration)> {
        let id = spec.cluster_id();

        if let Some(snapshot) = &spec.snapshot {
            let request = RestoreClusterRequest {
                cluster_id: id.to_string(),
                snapshot: snapshot.clone(),
                engine: spec.engine.clone(),
                engine_version: spec.engine_version.clone(),
                port: spec.port,
                availability_zones: spec.availability_zones.clone(),
                subnet_group: spec.subnet_group.clone(),
                vpc_security_group_ids: spec.vpc_security_group_ids.clone(),
                parameter_group: spec.parameter_group.clone(),
                tags: spec.tags.clone(),
            };
            info!("Restoring cluster {} from snapshot {}", id, snapshot);
            let cluster = self
                .client
                .restore_cluster_from_snapshot(&request)
                .await
                .map_err(|e| {
                    ReconcileError::remote_with_request("restore cluster from snapshot", e, &request)
                })?;
            return Ok((OutcomeKind::Restored, cluster, self.timings.cluster_restore));
        }

        let request = CreateClusterRequest {
            cluster_id: id.to_string(),
            engine: spec.engine.clone(),
            engine_version: spec.engine_version.clone(),
            port: spec.port,
            availability_zones: spec.availability_zones.clone(),
            subnet_group: spec.subnet_group.clone(),
            vpc_security_group_ids: spec.vpc_security_group_ids.clone(),
            parameter_group: spec.parameter_group.clone(),
            master_username: spec.master_username.clone(),
            master_password: spec.master_password.clone(),
            tags: spec.tags.clone(),
        };
        info!("Creating cluster {}", id);
        let cluster = self
            .client
            .create_cluster(&request)
            .await
            .map_err(|e| ReconcileError::remote_with_request("create cluster", e, &request))?;
        Ok((OutcomeKind::Created, cluster, self.timings.cluster_create))
    }

    async fn converge(
        &self,
        spec: &ClusterSpec,
        observed: ClusterDescription,
    ) -> Result<(OutcomeKind, ClusterDescription, Duration)> {
        let id = spec.cluster_id();
        let changes = diff::cluster_changes(&observed, spec);

        let tags_changed = self
            .tag_policy
            .apply(&self.client, &observed.arn, spec.tags.as_ref())
            .await
            .map_err(|e| {
                ReconcileError::remote("reconcile cluster tags", e).with_last(observed.clone())
            })?;

        if changes.is_empty() {
            let kind = if tags_changed {
                OutcomeKind::Modified
            } else {
                OutcomeKind::Unchanged
            };
            info!("Cluster {} is up to date ({:?})", id, kind);
            return Ok((kind, observed, self.timings.cluster_modify));
        }

        info!(fields = ?changes.fields(), "Modifying cluster {}", id);
        let request = changes.into_request();
        let cluster = self
            .client
            .modify_cluster(id, &request)
            .await
            .map_err(|e| {
                ReconcileError::remote_with_request("modify cluster", e, &request)
                    .with_last(observed.clone())
            })?;
        Ok((OutcomeKind::Modified, cluster, self.timings.cluster_modify))
    }

    async fn wait_available(
        &self,
        id: &str,
        settle: Duration,
        timeout: Duration,
    ) -> Result<ClusterDescription> {
        let what = format!("cluster {} to become available", id);
        let outcome = self
            .poller
            .settle_then_poll(&what, settle, timeout, || async move {
                self.client
                    .describe_cluster(id)
                    .await
                    .map(|lookup| lookup.found().filter(|c| c.status.is_available()))
            })
            .await
            .map_err(|e| ReconcileError::remote("describe cluster", e))?;

        match outcome {
            PollOutcome::Ready(cluster) => Ok(cluster),
            PollOutcome::TimedOut => Err(self.timed_out(id, what, timeout).await),
        }
    }

    async fn wait_absent(&self, id: &str, timeout: Duration) -> Result<()> {
        let what = format!("cluster {} to be deleted", id);
        let outcome = self
            .poller
            .poll(&what, timeout, || async move {
                self.client
                    .describe_cluster(id)
                    .await
                    .map(|lookup| lookup.is_absent().then_some(()))
            })
            .await
            .map_err(|e| ReconcileError::remote("describe cluster", e))?;

        match outcome {
            PollOutcome::Ready(()) => Ok(()),
            PollOutcome::TimedOut => Err(self.timed_out(id, what, timeout).await),
        }
    }

    /// Timeout error with a fresh description attached.
    async fn timed_out(&self, id: &str, waited_for: String, timeout: Duration) -> ReconcileError {
        let last = match self.client.describe_cluster(id).await {
            Ok(Lookup::Found(cluster)) => Some(cluster.into()),
            Ok(Lookup::Absent) => None,
            Err(e) => {
                warn!("Failed to describe cluster {} after timeout: {}", id, e);
                None
            }
        };
        ReconcileError::TimedOut {
            waited_for,
            timeout,
            last,
        }
    }
}

#[async_trait]
impl<C: ClusterApi> Reconciler for ClusterReconciler<C> {
    type Spec = ClusterSpec;
    type Removal = DeleteCluster;

    async fn reconcile(&self, spec: &Self::Spec) -> Result<Outcome> {
        let id = spec.cluster_id();
        info!("Reconciling cluster {}", id);

        let observed = self
            .client
            .describe_cluster(id)
            .await
            .map_err(|e| ReconcileError::remote("describe cluster", e))?;

        let (kind, cluster, default_timeout) = match observed {
            Lookup::Absent => self.create(spec).await?,
            Lookup::Found(cluster) => self.converge(spec, cluster).await?,
        };

        if !spec.wait.enabled {
            return Ok(Outcome::new(kind, Some(cluster.into())));
        }
        let timeout = spec.wait.timeout_or(default_timeout);
        let cluster = self.wait_available(id, Duration::ZERO, timeout).await?;
        Ok(Outcome::new(kind, Some(cluster.into())))
    }

    async fn finalize(&self, removal: &Self::Removal) -> Result<Outcome> {
        let id = removal.cluster_id();
        info!("Deleting cluster {}", id);

        let observed = match self.client.describe_cluster(id).await {
            Ok(Lookup::Found(cluster)) => cluster,
            Ok(Lookup::Absent) => {
                info!("Cluster {} is already absent", id);
                return Ok(Outcome::new(OutcomeKind::Deleted, None).with_changed(false));
            }
            Err(e) if removal.lenient => {
                warn!("Treating cluster {} as deleted after describe error: {}", id, e);
                return Ok(Outcome::new(OutcomeKind::Deleted, None));
            }
            Err(e) => return Err(ReconcileError::remote("describe cluster", e)),
        };

        let final_snapshot = removal.final_snapshot.as_deref();
        if let Err(e) = self.client.delete_cluster(id, final_snapshot).await {
            if !(e.is_not_found() || removal.lenient) {
                let request = json!({
                    "cluster_id": id,
                    "skip_final_snapshot": final_snapshot.is_none(),
                    "final_snapshot": final_snapshot,
                });
                return Err(
                    ReconcileError::remote_with_request("delete cluster", e, &request)
                        .with_last(observed),
                );
            }
            warn!("Treating cluster {} as deleted after delete error: {}", id, e);
            return Ok(Outcome::new(OutcomeKind::Deleted, Some(observed.into())));
        }

        let what = format!("cluster {} deletion", id);
        self.poller
            .settle(&what, self.timings.cluster_delete_settle)
            .await;
        if removal.wait.enabled {
            let timeout = removal.wait.timeout_or(self.timings.cluster_delete);
            self.wait_absent(id, timeout).await?;
        }
        Ok(Outcome::new(OutcomeKind::Deleted, Some(observed.into())))
    }
}
