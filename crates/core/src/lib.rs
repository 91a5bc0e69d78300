//! Walkthrough Core
//!
//! Domain logic for a real-time voice and vision walkthrough assistant: the
//! tool call router, pluggable verticals, the walkthrough session manager,
//! and bounded session history.

pub mod bridge;
pub mod history;
pub mod report;
pub mod router;
pub mod session;
pub mod session_manager;
pub mod tool_call;
pub mod vertical;
pub mod verticals;

pub use bridge::{AgentCallStatus, AgentConnectionState, RemoteAgentBridge};
pub use history::{FileStore, KeyValueStore, MemoryStore, SessionHistory};
pub use report::ReportOutput;
pub use router::{ResponseSink, ToolCallRouter};
pub use session::{FlaggedIssue, Speaker, TranscriptSegment, WalkthroughSession};
pub use session_manager::{Flagged, SessionManager};
pub use tool_call::{ToolCall, ToolResponse, ToolResult, ToolSchema};
pub use vertical::Vertical;
