//! Progress event types for notifying the embedding UI of import activity.
//!
//! The import core takes a [`Notifier`] implementation by injection instead
//! of reaching into a global toast/event context. Extraction emits real
//! phase-change events as work happens; nothing here is simulated pacing.

use serde::{Deserialize, Serialize};

/// Phases of document processing, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportPhase {
    Analyze,
    ExtractText,
    AiAnalysis,
    Validate,
    AccountMapping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhaseStatus {
    Started,
    Completed,
    Failed,
}

/// Payload for a progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Name of the file the phase applies to.
    pub file: String,
    pub phase: ImportPhase,
    pub status: PhaseStatus,
    /// Failure detail when `status` is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProgressEvent {
    pub fn started(file: &str, phase: ImportPhase) -> Self {
        Self {
            file: file.to_string(),
            phase,
            status: PhaseStatus::Started,
            detail: None,
        }
    }

    pub fn completed(file: &str, phase: ImportPhase) -> Self {
        Self {
            file: file.to_string(),
            phase,
            status: PhaseStatus::Completed,
            detail: None,
        }
    }

    pub fn failed(file: &str, phase: ImportPhase, detail: &str) -> Self {
        Self {
            file: file.to_string(),
            phase,
            status: PhaseStatus::Failed,
            detail: Some(detail.to_string()),
        }
    }
}

/// Sink for progress events, implemented by the embedding UI.
pub trait Notifier: Send + Sync {
    fn progress(&self, event: ProgressEvent);
}

/// Notifier that discards all events.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn progress(&self, _event: ProgressEvent) {}
}
