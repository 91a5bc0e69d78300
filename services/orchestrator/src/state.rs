//! Observable session state published by the orchestrator.

use crate::transport::ConnectionState;
use serde::Serialize;
use walkthrough_core::{AgentCallStatus, AgentConnectionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
    /// A session failed to start or ended unexpectedly. Behaves like `Idle`
    /// for the purpose of starting again.
    Error,
}

/// Snapshot of everything a UI would render about the live session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub connection: ConnectionState,
    pub agent_connection: AgentConnectionState,
    pub agent_status: AgentCallStatus,
    /// User speech for the current turn.
    pub input_transcript: String,
    /// Model speech for the current turn.
    pub output_transcript: String,
    pub model_speaking: bool,
    pub flag_count: usize,
    pub last_report: Option<String>,
    pub error_message: Option<String>,
}

impl SessionSnapshot {
    pub fn is_active(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::Starting | SessionPhase::Running | SessionPhase::Stopping
        )
    }

    /// Initial values with the given phase and error.
    pub fn reset(phase: SessionPhase, error_message: Option<String>) -> Self {
        Self {
            phase,
            error_message,
            ..Self::default()
        }
    }
}
