//! Reconcilers for the two resource kinds.
//!
//! Each reconciler describes the remote resource, compares it with the desired
//! state and issues the mutating call needed to converge, then optionally waits
//! for the control plane to settle.

pub mod cluster;
pub mod instance;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::outcome::Outcome;

pub use cluster::ClusterReconciler;
pub use instance::InstanceReconciler;

/// Trait for resource reconcilers.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Desired state for convergence.
    type Spec: Send + Sync;
    /// Parameters for removal.
    type Removal: Send + Sync;

    /// Create, restore or modify the resource until it matches `spec`.
    async fn reconcile(&self, spec: &Self::Spec) -> Result<Outcome>;

    /// Delete the resource. An absent resource counts as deleted.
    async fn finalize(&self, removal: &Self::Removal) -> Result<Outcome>;
}

/// Named intervals and default timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub poll_interval: Duration,
    pub cluster_create: Duration,
    pub cluster_modify: Duration,
    pub cluster_restore: Duration,
    pub cluster_start: Duration,
    /// Status is not reported as in progress right after a password change.
    pub password_settle: Duration,
    pub password_update: Duration,
    /// Deletion is not reflected by describe right away.
    pub cluster_delete_settle: Duration,
    pub cluster_delete: Duration,
    pub instance_converge: Duration,
    pub instance_delete: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            cluster_create: Duration::from_secs(600),
            cluster_modify: Duration::from_secs(600),
            cluster_restore: Duration::from_secs(3600),
            cluster_start: Duration::from_secs(600),
            password_settle: Duration::from_secs(120),
            password_update: Duration::from_secs(600),
            cluster_delete_settle: Duration::from_secs(300),
            cluster_delete: Duration::from_secs(600),
            instance_converge: Duration::from_secs(1200),
            instance_delete: Duration::from_secs(1800),
        }
    }
}
