//! Construction site walkthrough vertical.
//!
//! Handles `flag_issue` and `end_walkthrough` locally and renders ended
//! sessions as a CSV punch list. Every other tool falls through to the
//! remote agent.

use crate::report::{CsvWriter, ReportOutput};
use crate::session::WalkthroughSession;
use crate::session_manager::SessionManager;
use crate::tool_call::{ToolCall, ToolResult, ToolSchema};
use crate::vertical::Vertical;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

pub const FLAG_ISSUE: &str = "flag_issue";
pub const END_WALKTHROUGH: &str = "end_walkthrough";

pub const DEFAULT_PRIORITY: &str = "Medium";
const PRIORITIES: [&str; 4] = ["Critical", "High", "Medium", "Low"];
const PAST_SESSIONS_IN_CONTEXT: usize = 3;

const SYSTEM_PROMPT: &str = "\
You are assisting a site supervisor during a construction walkthrough. You can \
see what their camera sees and hear what they say.

When the user points out a problem, or you notice a clear safety or quality \
issue, call `flag_issue` with a short description. Include the location if the \
user mentioned one, and a priority of Critical, High, Medium or Low.

When the user says they are done, call `end_walkthrough`. Keep spoken replies \
short; the user is walking and working.";

/// Arguments for the `flag_issue` tool.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct FlagIssueArgs {
    /// What is wrong, in one sentence.
    #[schemars(description = "Short description of the issue")]
    pub description: String,
    /// Where on site the issue is.
    #[schemars(description = "Where the issue is, e.g. 'Building C, level 2'")]
    #[serde(default)]
    pub location: Option<String>,
    #[schemars(description = "One of: Critical, High, Medium, Low")]
    #[serde(default)]
    pub priority: Option<String>,
}

/// `end_walkthrough` takes no arguments.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct EndWalkthroughArgs {}

#[derive(Debug, Default)]
pub struct ConstructionVertical;

impl ConstructionVertical {
    pub fn new() -> Self {
        Self
    }

    async fn flag_issue(&self, call: &ToolCall, session: &SessionManager) -> ToolResult {
        let args: FlagIssueArgs = match serde_json::from_value(Value::Object(call.args.clone())) {
            Ok(args) => args,
            Err(e) => return ToolResult::error(format!("Invalid arguments for {FLAG_ISSUE}: {e}")),
        };
        let description = args.description.trim();
        if description.is_empty() {
            return ToolResult::error("An issue description is required.");
        }

        let Some(flagged) = session.flag_issue(description, None).await else {
            return ToolResult::error("No walkthrough is in progress.");
        };
        let location = args.location.filter(|l| !l.trim().is_empty());
        let priority = args.priority.as_deref().and_then(normalize_priority);
        if location.is_some() || priority.is_some() {
            session.update_flag(flagged.issue_id, location, priority).await;
        }
        let count = flagged.count;

        ToolResult::success(format!(
            "Flagged: {description}. {count} issue{} recorded so far.",
            if count == 1 { "" } else { "s" }
        ))
    }

    async fn end_walkthrough(&self, session: &SessionManager) -> ToolResult {
        if !session.is_active().await {
            return ToolResult::error("No walkthrough is in progress.");
        }
        let count = session.flag_count().await;
        let report = session.end().await;
        info!(flags = count, report = report.is_some(), "Walkthrough ended by tool call");

        let mut message = format!(
            "Walkthrough ended with {count} issue{} flagged.",
            if count == 1 { "" } else { "s" }
        );
        if let Some(report) = report {
            message.push_str(&format!(" Report saved as {}.", report.filename()));
        }
        ToolResult::success(message)
    }
}

#[async_trait]
impl Vertical for ConstructionVertical {
    fn id(&self) -> &str {
        "construction"
    }

    fn display_name(&self) -> &str {
        "Construction Walkthrough"
    }

    fn description(&self) -> &str {
        "Flag site issues by voice and export a punch list when done."
    }

    fn system_prompt(&self) -> &str {
        SYSTEM_PROMPT
    }

    fn tool_schemas(&self) -> Vec<ToolSchema> {
        vec![
            ToolSchema::for_args::<FlagIssueArgs>(
                FLAG_ISSUE,
                "Record an issue seen during the walkthrough. \
                 The current camera frame is attached automatically.",
            ),
            ToolSchema::for_args::<EndWalkthroughArgs>(
                END_WALKTHROUGH,
                "End the walkthrough and generate the issue report.",
            ),
        ]
    }

    fn session_key_prefix(&self) -> &str {
        "construction_"
    }

    async fn handle(&self, call: &ToolCall, session: &SessionManager) -> Option<ToolResult> {
        match call.name.as_str() {
            FLAG_ISSUE => Some(self.flag_issue(call, session).await),
            END_WALKTHROUGH => Some(self.end_walkthrough(session).await),
            _ => None,
        }
    }

    async fn context_block(&self, session: &SessionManager) -> Option<String> {
        let summaries = session.past_session_summaries(PAST_SESSIONS_IN_CONTEXT).await;
        if summaries.is_empty() {
            return None;
        }
        Some(format!(
            "## Previous walkthroughs\n\
             Refer to these if the user asks about earlier visits.\n\
             {summaries}"
        ))
    }

    fn generate_report(&self, session: &WalkthroughSession) -> Option<ReportOutput> {
        if session.flags.is_empty() {
            return None;
        }
        let mut csv = CsvWriter::new();
        csv.row(["#", "Timestamp", "Description", "Location", "Priority", "User Note"]);
        for (i, flag) in session.flags.iter().enumerate() {
            let number = (i + 1).to_string();
            let timestamp = flag.created_at.to_rfc3339();
            csv.row([
                number.as_str(),
                timestamp.as_str(),
                flag.description.as_str(),
                flag.location.as_deref().unwrap_or(""),
                flag.priority.as_deref().unwrap_or(DEFAULT_PRIORITY),
                flag.transcript.as_deref().unwrap_or(""),
            ]);
        }
        Some(ReportOutput::Csv {
            bytes: csv.into_bytes(),
            filename: format!("walkthrough_{}.csv", session.started_at.format("%Y%m%d_%H%M%S")),
        })
    }
}

/// Maps a free-form priority onto the canonical spelling, case-insensitively.
fn normalize_priority(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    PRIORITIES
        .iter()
        .find(|p| p.eq_ignore_ascii_case(raw))
        .map(|p| p.to_string())
        .or_else(|| Some(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{MemoryStore, SessionHistory};
    use serde_json::json;
    use std::sync::Arc;

    fn manager() -> SessionManager {
        let vertical = Arc::new(ConstructionVertical::new());
        let history =
            SessionHistory::new(Arc::new(MemoryStore::new()), vertical.session_key_prefix());
        SessionManager::new(vertical, history)
    }

    fn call(name: &str, args: Value) -> ToolCall {
        let Value::Object(map) = args else {
            panic!("args must be an object");
        };
        ToolCall::new("id", name, map)
    }

    fn report_rows(report: &ReportOutput) -> Vec<String> {
        String::from_utf8(report.bytes().to_vec())
            .unwrap()
            .lines()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_unknown_tool_is_declined() {
        let manager = manager();
        manager.start().await;
        let vertical = ConstructionVertical::new();
        assert!(vertical.handle(&call("lookup_code", json!({})), &manager).await.is_none());
    }

    #[tokio::test]
    async fn test_flag_issue_reports_running_count() {
        let manager = manager();
        manager.start().await;
        let vertical = ConstructionVertical::new();

        let first = vertical
            .handle(&call(FLAG_ISSUE, json!({"description": "exposed wiring"})), &manager)
            .await
            .unwrap();
        assert_eq!(first, ToolResult::success("Flagged: exposed wiring. 1 issue recorded so far."));

        let second = vertical
            .handle(
                &call(FLAG_ISSUE, json!({"description": "missing guardrail", "priority": "high"})),
                &manager,
            )
            .await
            .unwrap();
        assert!(second.message().contains("2 issues recorded"));

        let session = manager.current().await.unwrap();
        assert_eq!(session.flags[1].priority.as_deref(), Some("High"));
    }

    #[tokio::test]
    async fn test_flag_issue_requires_description() {
        let manager = manager();
        manager.start().await;
        let vertical = ConstructionVertical::new();

        let missing = vertical.handle(&call(FLAG_ISSUE, json!({})), &manager).await.unwrap();
        assert!(missing.is_error());
        let blank = vertical
            .handle(&call(FLAG_ISSUE, json!({"description": "  "})), &manager)
            .await
            .unwrap();
        assert!(blank.is_error());
        assert_eq!(manager.flag_count().await, 0);
    }

    #[tokio::test]
    async fn test_flag_issue_without_session_is_error() {
        let manager = manager();
        let vertical = ConstructionVertical::new();
        let result = vertical
            .handle(&call(FLAG_ISSUE, json!({"description": "crack"})), &manager)
            .await
            .unwrap();
        assert!(result.is_error());
        assert!(manager.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_end_without_flags_produces_no_report() {
        let manager = manager();
        manager.start().await;
        let vertical = ConstructionVertical::new();

        let result = vertical.handle(&call(END_WALKTHROUGH, json!({})), &manager).await.unwrap();
        assert_eq!(result, ToolResult::success("Walkthrough ended with 0 issues flagged."));
        assert!(manager.last_report().await.is_none());
        assert_eq!(manager.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_walkthrough_report_rows() {
        let manager = manager();
        manager.start().await;
        let vertical = ConstructionVertical::new();

        vertical
            .handle(
                &call(
                    FLAG_ISSUE,
                    json!({
                        "description": "exposed wiring on east wall",
                        "location": "Building C",
                        "priority": "Critical"
                    }),
                ),
                &manager,
            )
            .await;
        vertical
            .handle(&call(FLAG_ISSUE, json!({"description": "missing guardrail"})), &manager)
            .await;

        let result = vertical.handle(&call(END_WALKTHROUGH, json!({})), &manager).await.unwrap();
        let report = manager.last_report().await.unwrap();
        assert!(result.message().contains("2 issues flagged"));
        assert!(result.message().contains(report.filename()));
        assert!(matches!(report, ReportOutput::Csv { .. }));

        let rows = report_rows(&report);
        assert_eq!(rows.len(), 2);
        let first: Vec<&str> = rows[0].split(',').collect();
        assert_eq!(first[0], "1");
        assert_eq!(first[2], "exposed wiring on east wall");
        assert_eq!(first[3], "Building C");
        assert_eq!(first[4], "Critical");
        let second: Vec<&str> = rows[1].split(',').collect();
        assert_eq!(second[2], "missing guardrail");
        assert_eq!(second[3], "");
        assert_eq!(second[4], DEFAULT_PRIORITY);
    }

    #[tokio::test]
    async fn test_context_block_includes_past_sessions() {
        let manager = manager();
        let vertical = ConstructionVertical::new();
        assert!(vertical.context_block(&manager).await.is_none());

        manager.start().await;
        manager.flag_issue("loose scaffold board", None).await;
        manager.end().await;

        let block = vertical.context_block(&manager).await.unwrap();
        assert!(block.starts_with("## Previous walkthroughs"));
        assert!(block.contains("loose scaffold board"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_parallel_flags_keep_their_own_location() {
        let manager = Arc::new(manager());
        manager.start().await;
        let vertical = Arc::new(ConstructionVertical::new());
        let barrier = Arc::new(tokio::sync::Barrier::new(200));

        let tasks: Vec<_> = (0..200)
            .map(|i| {
                let manager = manager.clone();
                let vertical = vertical.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    let args = json!({"description": format!("d{i}"), "location": format!("d{i}")});
                    barrier.wait().await;
                    vertical.handle(&call(FLAG_ISSUE, args), &manager).await
                })
            })
            .collect();
        for task in tasks {
            assert!(!task.await.unwrap().unwrap().is_error());
        }

        let session = manager.current().await.unwrap();
        assert_eq!(session.flags.len(), 200);
        let misattributed: Vec<_> = session
            .flags
            .iter()
            .filter(|f| f.location.as_deref() != Some(f.description.as_str()))
            .map(|f| (f.description.clone(), f.location.clone()))
            .collect();
        assert!(misattributed.is_empty(), "misattributed flags: {misattributed:?}");
    }

    #[test]
    fn test_tool_schemas_describe_arguments() {
        let schemas = ConstructionVertical::new().tool_schemas();
        let names: Vec<_> = schemas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, [FLAG_ISSUE, END_WALKTHROUGH]);
        assert!(schemas[0].parameters["properties"]["description"].is_object());
        assert_eq!(schemas[0].parameters["required"], json!(["description"]));
    }

    #[test]
    fn test_normalize_priority() {
        assert_eq!(normalize_priority("critical").as_deref(), Some("Critical"));
        assert_eq!(normalize_priority(" LOW ").as_deref(), Some("Low"));
        assert_eq!(normalize_priority("urgent").as_deref(), Some("urgent"));
        assert_eq!(normalize_priority(""), None);
    }
}
