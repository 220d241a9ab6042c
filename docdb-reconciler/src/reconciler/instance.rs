//! Instance reconciler.
//!
//! Instances have no restore branch and no credentials. On an existing
//! instance tags are rewritten according to the tag policy, which defaults to
//! remove-all-then-add-all.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::{Reconciler, Timings};
use crate::clients::{CreateInstanceRequest, InstanceApi};
use crate::desired::{DeleteInstance, InstanceOperation, InstanceSpec};
use crate::diff;
use crate::error::{ReconcileError, Result};
use crate::model::{InstanceDescription, Lookup};
use crate::outcome::{Outcome, OutcomeKind};
use crate::poller::{PollOutcome, Poller};
use crate::tags::TagPolicy;

pub struct InstanceReconciler<C> {
    client: C,
    poller: Poller,
    timings: Timings,
    tag_policy: TagPolicy,
}

impl<C: InstanceApi> InstanceReconciler<C> {
    pub fn new(client: C) -> Self {
        let timings = Timings::default();
        Self {
            client,
            poller: Poller::new(timings.poll_interval),
            timings,
            tag_policy: TagPolicy::INSTANCE_DEFAULT,
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

    pub async fn execute(&self, op: &InstanceOperation) -> Outcome {
        let (id, result) = match op {
            InstanceOperation::Converge(spec) => (spec.instance_id(), self.reconcile(spec).await),
            InstanceOperation::Delete(removal) => {
                (removal.instance_id(), self.finalize(removal).await)
            }
        };
        if let Err(e) = &result {
            error!("Instance {} failed: {}", id, e);
        }
        Outcome::from_result(result)
    }

    async fn create(&self, spec: &InstanceSpec) -> Result<InstanceDescription> {
        let request = CreateInstanceRequest {
            instance_id: spec.instance_id().to_string(),
            cluster_id: spec.cluster_id().to_string(),
            engine: spec.engine.clone(),
            instance_class: spec.instance_class.clone(),
            availability_zone: spec.availability_zone.clone(),
            preferred_maintenance_window: spec.preferred_maintenance_window.clone(),
            tags: spec.tags.clone(),
        };
        info!(
            cluster = %spec.cluster_id(),
            "Creating instance {}",
            spec.instance_id()
        );
        self.client
            .create_instance(&request)
            .await
            .map_err(|e| ReconcileError::remote_with_request("create instance", e, &request))
    }

    async fn converge(
        &self,
        spec: &InstanceSpec,
        observed: InstanceDescription,
    ) -> Result<(OutcomeKind, InstanceDescription)> {
        let id = spec.instance_id();
        let changes = diff::instance_changes(&observed, spec);

        let (mut kind, current) = if changes.is_empty() {
            (OutcomeKind::Unchanged, observed)
        } else {
            let request = changes.into_request();
            info!("Modifying instance {}", id);
            let modified = self
                .client
                .modify_instance(id, &request)
                .await
                .map_err(|e| {
                    ReconcileError::remote_with_request("modify instance", e, &request)
                        .with_last(observed.clone())
                })?;
            (OutcomeKind::Modified, modified)
        };

        let tags_changed = self
            .tag_policy
            .apply(&self.client, &current.arn, Some(&spec.tags))
            .await
            .map_err(|e| {
                ReconcileError::remote("reconcile instance tags", e).with_last(current.clone())
            })?;
        if tags_changed {
            kind = OutcomeKind::Modified;
        }
        Ok((kind, current))
    }

    async fn wait_available(&self, id: &str, timeout: Duration) -> Result<InstanceDescription> {
        let what = format!("instance {} to become available", id);
        let outcome = self
            .poller
            .poll(&what, timeout, || async move {
                self.client
                    .describe_instance(id)
                    .await
                    .map(|lookup| lookup.found().filter(|i| i.status.is_available()))
            })
            .await
            .map_err(|e| ReconcileError::remote("describe instance", e))?;

        match outcome {
            PollOutcome::Ready(instance) => Ok(instance),
            PollOutcome::TimedOut => Err(self.timed_out(id, what, timeout).await),
        }
    }

    async fn wait_absent(&self, id: &str, timeout: Duration) -> Result<()> {
        let what = format!("instance {} to be deleted", id);
        let outcome = self
            .poller
            .poll(&what, timeout, || async move {
                self.client
                    .describe_instance(id)
                    .await
                    .map(|lookup| lookup.is_absent().then_some(()))
            })
            .await
            .map_err(|e| ReconcileError::remote("describe instance", e))?;

        match outcome {
            PollOutcome::Ready(()) => Ok(()),
            PollOutcome::TimedOut => Err(self.timed_out(id, what, timeout).await),
        }
    }

    async fn timed_out(&self, id: &str, waited_for: String, timeout: Duration) -> ReconcileError {
        let last = match self.client.describe_instance(id).await {
            Ok(Lookup::Found(instance)) => Some(instance.into()),
            Ok(Lookup::Absent) => None,
            Err(e) => {
                warn!("Failed to describe instance {} after timeout: {}", id, e);
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
impl<C: InstanceApi> Reconciler for InstanceReconciler<C> {
    type Spec = InstanceSpec;
    type Removal = DeleteInstance;

    async fn reconcile(&self, spec: &Self::Spec) -> Result<Outcome> {
        let id = spec.instance_id();
        info!("Reconciling instance {}", id);

        let observed = self
            .client
            .describe_instance(id)
            .await
            .map_err(|e| ReconcileError::remote("describe instance", e))?;

        let (kind, instance) = match observed {
            Lookup::Absent => (OutcomeKind::Created, self.create(spec).await?),
            Lookup::Found(instance) => self.converge(spec, instance).await?,
        };

        if !spec.wait.enabled {
            return Ok(Outcome::new(kind, Some(instance.into())));
        }
        let timeout = spec.wait.timeout_or(self.timings.instance_converge);
        let instance = self.wait_available(id, timeout).await?;
        Ok(Outcome::new(kind, Some(instance.into())))
    }

    async fn finalize(&self, removal: &Self::Removal) -> Result<Outcome> {
        let id = removal.instance_id();
        info!("Deleting instance {}", id);

        let observed = match self.client.describe_instance(id).await {
            Ok(Lookup::Found(instance)) => instance,
            Ok(Lookup::Absent) => {
                info!("Instance {} is already absent", id);
                return Ok(Outcome::new(OutcomeKind::Deleted, None).with_changed(false));
            }
            Err(e) if removal.lenient => {
                warn!("Treating instance {} as deleted after describe error: {}", id, e);
                return Ok(Outcome::new(OutcomeKind::Deleted, None));
            }
            Err(e) => return Err(ReconcileError::remote("describe instance", e)),
        };

        if let Err(e) = self.client.delete_instance(id).await {
            if !(e.is_not_found() || removal.lenient) {
                return Err(ReconcileError::remote("delete instance", e).with_last(observed));
            }
            warn!("Treating instance {} as deleted after delete error: {}", id, e);
            return Ok(Outcome::new(OutcomeKind::Deleted, Some(observed.into())));
        }

        if removal.wait.enabled {
            let timeout = removal.wait.timeout_or(self.timings.instance_delete);
            self.wait_absent(id, timeout).await?;
        }
        Ok(Outcome::new(OutcomeKind::Deleted, Some(observed.into())))
    }
}
