//! General-purpose assistant vertical.
//!
//! Claims no tools, so every call goes to the remote agent. Ended sessions
//! with any conversation are exported as a JSON transcript.

use crate::report::ReportOutput;
use crate::session::{Speaker, WalkthroughSession};
use crate::session_manager::SessionManager;
use crate::tool_call::{ToolCall, ToolResult, ToolSchema};
use crate::vertical::Vertical;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const SYSTEM_PROMPT: &str = "\
You are a helpful assistant that can see through the user's camera and hear \
them speak. For anything that needs looking up or acting on, call \
`delegate_task` with a plain-language description of what to do.";

#[derive(Deserialize, JsonSchema, Debug)]
pub struct DelegateTaskArgs {
    #[schemars(description = "What the remote agent should do, in plain language")]
    pub task: String,
}

#[derive(Serialize)]
struct TranscriptReport<'a> {
    session_id: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    transcript: Vec<TranscriptLine<'a>>,
    flags: Vec<&'a str>,
}

#[derive(Serialize)]
struct TranscriptLine<'a> {
    at: DateTime<Utc>,
    speaker: Speaker,
    text: &'a str,
}

#[derive(Debug, Default)]
pub struct GeneralVertical;

impl GeneralVertical {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Vertical for GeneralVertical {
    fn id(&self) -> &str {
        "general"
    }

    fn display_name(&self) -> &str {
        "General Assistant"
    }

    fn description(&self) -> &str {
        "Voice and vision assistant that hands tasks to the remote agent."
    }

    fn system_prompt(&self) -> &str {
        SYSTEM_PROMPT
    }

    fn tool_schemas(&self) -> Vec<ToolSchema> {
        vec![ToolSchema::for_args::<DelegateTaskArgs>(
            "delegate_task",
            "Hand a task to the remote agent and wait for its answer.",
        )]
    }

    fn session_key_prefix(&self) -> &str {
        "general_"
    }

    async fn handle(&self, _call: &ToolCall, _session: &SessionManager) -> Option<ToolResult> {
        None
    }

    fn generate_report(&self, session: &WalkthroughSession) -> Option<ReportOutput> {
        if session.transcript.is_empty() {
            return None;
        }
        let report = TranscriptReport {
            session_id: session.id.to_string(),
            started_at: session.started_at,
            ended_at: session.ended_at,
            transcript: session
                .transcript
                .iter()
                .map(|s| TranscriptLine {
                    at: s.timestamp,
                    speaker: s.speaker,
                    text: &s.text,
                })
                .collect(),
            flags: session.flags.iter().map(|f| f.description.as_str()).collect(),
        };
        ReportOutput::json(
            &report,
            format!("session_{}.json", session.started_at.format("%Y%m%d_%H%M%S")),
        )
    }
}
