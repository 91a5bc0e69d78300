//! Remote Agent Bridge contract.
//!
//! Tool calls that no local vertical claims are delegated to a generic remote
//! agent. The wire protocol behind the bridge is not the core's concern; the
//! core only needs the operations below and a couple of observable fields.

use crate::tool_call::ToolResult;
use async_trait::async_trait;
use serde::Serialize;

/// Connectivity of the remote agent as last observed by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentConnectionState {
    #[default]
    Unknown,
    Connected,
    Unreachable { reason: String },
}

/// Status of the most recent delegated call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentCallStatus {
    #[default]
    Idle,
    Running { tool: String },
    Completed { tool: String },
    Failed { tool: String, message: String },
    Cancelled { ids: Vec<String> },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteAgentBridge: Send + Sync {
    /// Probes the remote agent and updates the observable connection state.
    async fn check_connection(&self) -> bool;

    /// Clears any conversation state the remote agent holds for this client.
    async fn reset_session(&self);

    /// Runs a task on the remote agent.
    ///
    /// Communication failures must come back as `ToolResult::Error`.
    async fn delegate_task(&self, description: &str, tool_name: &str) -> ToolResult;

    /// Records that the given in-flight calls were cancelled.
    fn mark_cancelled(&self, ids: &[String]);

    fn last_call_status(&self) -> AgentCallStatus;

    fn connection_state(&self) -> AgentConnectionState;
}
