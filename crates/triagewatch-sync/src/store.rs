use async_trait::async_trait;
use triagewatch_core::{OccurrenceRecord, RemoteOccurrence, TriageAnnotation};

/// Operator-facing text for a submission that never got an answer.
pub const UNREACHABLE_MESSAGE: &str = "Erro de rede.";

/// Result of submitting an annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The backend stored the annotation. `action` is what it did ("insert"/"update").
    Success { action: String, id: String },
    /// The backend answered and refused, or answered something unusable.
    /// `message` is fit to show the operator.
    Failure { message: String },
    /// The request never reached the backend or got no response.
    Unreachable,
}

impl UpsertOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// The backend holding prior triage decisions, keyed by protocol.
///
/// Both operations are total. `check_existing` folds "not found" and every
/// kind of failure into `None`; callers treat both as "not yet triaged".
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn check_existing(&self, protocol: u64) -> Option<RemoteOccurrence>;

    async fn upsert(
        &self,
        record: &OccurrenceRecord,
        annotation: &TriageAnnotation,
    ) -> UpsertOutcome;
}
