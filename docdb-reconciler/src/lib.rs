//! Idempotent reconciliation of DocumentDB clusters and their instances.
//!
//! A reconciler describes the remote resource, decides whether to create,
//! restore, modify or leave it alone, issues the mutating call and optionally
//! waits for the control plane to settle. The control plane is reached through
//! the [`clients::ClusterApi`] and [`clients::InstanceApi`] traits.

pub mod clients;
pub mod desired;
pub mod diff;
pub mod error;
pub mod manifest;
pub mod model;
pub mod outcome;
pub mod poller;
pub mod reconciler;
pub mod tags;

pub use error::{ReconcileError, RemoteError, ValidationError};
pub use manifest::{Manifest, Operation};
pub use outcome::{Outcome, OutcomeKind};
pub use reconciler::{ClusterReconciler, InstanceReconciler, Reconciler, Timings};
pub use tags::TagPolicy;
