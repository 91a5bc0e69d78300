//! Vertical Handlers
//!
//! A vertical is a domain-specific behavior pack selected before a session
//! starts: its prompt, the tools it advertises, the tools it handles locally,
//! and how it turns an ended session into a report.

use crate::report::ReportOutput;
use crate::session::WalkthroughSession;
use crate::session_manager::SessionManager;
use crate::tool_call::{ToolCall, ToolResult, ToolSchema};
use async_trait::async_trait;

#[async_trait]
pub trait Vertical: Send + Sync {
    fn id(&self) -> &str;

    fn display_name(&self) -> &str;

    fn description(&self) -> &str;

    fn system_prompt(&self) -> &str;

    fn tool_schemas(&self) -> Vec<ToolSchema>;

    /// Prefix for storage keys owned by this vertical.
    fn session_key_prefix(&self) -> &str;

    /// Handles a tool call locally.
    ///
    /// Returning `None` declines the call so it falls back to the remote
    /// agent. Failures are reported as `Some(ToolResult::Error(..))`.
    async fn handle(&self, call: &ToolCall, session: &SessionManager) -> Option<ToolResult>;

    /// Extra prompt text appended after the system prompt at session start.
    async fn context_block(&self, _session: &SessionManager) -> Option<String> {
        None
    }

    fn generate_report(&self, _session: &WalkthroughSession) -> Option<ReportOutput> {
        None
    }
}
