//! Terminal result of one invocation.

use serde::Serialize;

use crate::error::ReconcileError;
use crate::model::Observed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    Unchanged,
    Created,
    Modified,
    Restored,
    Started,
    Deleted,
    TimedOut,
    Failed,
}

impl OutcomeKind {
    pub fn is_failure(&self) -> bool {
        matches!(self, OutcomeKind::TimedOut | OutcomeKind::Failed)
    }

    pub fn changed(&self) -> bool {
        !matches!(
            self,
            OutcomeKind::Unchanged | OutcomeKind::TimedOut | OutcomeKind::Failed
        )
    }
}

/// Failure details.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    /// Attempted mutation request, credentials redacted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub outcome: OutcomeKind,
    pub changed: bool,
    /// Last known description of the resource.
    pub resource: Option<Observed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
}

impl Outcome {
    pub fn new(kind: OutcomeKind, resource: Option<Observed>) -> Self {
        Self {
            outcome: kind,
            changed: kind.changed(),
            resource,
            diagnostic: None,
        }
    }

    /// Override the changed flag, e.g. for a delete that found nothing to delete.
    pub fn with_changed(mut self, changed: bool) -> Self {
        self.changed = changed;
        self
    }

    pub fn kind(&self) -> OutcomeKind {
        self.outcome
    }

    pub fn from_result(result: Result<Outcome, ReconcileError>) -> Self {
        result.unwrap_or_else(Outcome::from)
    }
}

impl From<ReconcileError> for Outcome {
    fn from(err: ReconcileError) -> Self {
        let message = err.to_string();
        match err {
            ReconcileError::TimedOut { last, .. } => Outcome {
                diagnostic: Some(Diagnostic {
                    message,
                    request: None,
                }),
                ..Outcome::new(OutcomeKind::TimedOut, last)
            },
            ReconcileError::Remote { request, last, .. } => Outcome {
                diagnostic: Some(Diagnostic { message, request }),
                ..Outcome::new(OutcomeKind::Failed, last)
            },
            ReconcileError::Validation(_) => Outcome {
                diagnostic: Some(Diagnostic {
                    message,
                    request: None,
                }),
                ..Outcome::new(OutcomeKind::Failed, None)
            },
        }
    }
}
