//! Walkthrough Session Manager
//!
//! Owns the single current walkthrough session and the history store. The
//! session moves through `absent -> active -> ended`; mutations that arrive
//! while no session is active are dropped, since they come from asynchronous
//! event handlers that can race with teardown.

use crate::history::SessionHistory;
use crate::report::ReportOutput;
use crate::session::{FlaggedIssue, Speaker, TranscriptSegment, WalkthroughSession};
use crate::vertical::Vertical;
use chrono::Utc;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Number of flag descriptions included per session in a summary.
const SUMMARY_FLAGS_PER_SESSION: usize = 3;

#[derive(Debug, Default)]
enum Phase {
    #[default]
    Absent,
    Active(WalkthroughSession),
    Ended(WalkthroughSession),
}

#[derive(Debug, Default)]
struct ManagerState {
    phase: Phase,
    latest_frame: Option<Vec<u8>>,
    last_report: Option<ReportOutput>,
}

/// Receipt for a newly flagged issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flagged {
    pub issue_id: Uuid,
    /// Issues in the session once this one was appended.
    pub count: usize,
}

pub struct SessionManager {
    vertical: Arc<dyn Vertical>,
    history: SessionHistory,
    state: Mutex<ManagerState>,
}

impl SessionManager {
    pub fn new(vertical: Arc<dyn Vertical>, history: SessionHistory) -> Self {
        Self {
            vertical,
            history,
            state: Mutex::new(ManagerState::default()),
        }
    }

    pub fn vertical(&self) -> &Arc<dyn Vertical> {
        &self.vertical
    }

    /// Starts a fresh session for the configured vertical.
    ///
    /// If a session is already active it is kept and its id returned.
    pub async fn start(&self) -> Uuid {
        let mut state = self.state.lock().await;
        if let Phase::Active(session) = &state.phase {
            warn!(session_id = %session.id, "Walkthrough already active; ignoring start");
            return session.id;
        }
        let session = WalkthroughSession::new(self.vertical.id());
        let id = session.id;
        info!(session_id = %id, vertical = %session.vertical_id, "Walkthrough session started");
        state.phase = Phase::Active(session);
        state.last_report = None;
        id
    }

    pub async fn is_active(&self) -> bool {
        matches!(self.state.lock().await.phase, Phase::Active(_))
    }

    /// Replaces the most recent camera frame available for flagging.
    pub async fn set_latest_frame(&self, frame: Vec<u8>) {
        self.state.lock().await.latest_frame = Some(frame);
    }

    /// Appends a flagged issue with the latest frame attached.
    ///
    /// When no hint is given the most recent user utterance is used.
    /// Returns `None` if no session is active.
    pub async fn flag_issue(
        &self,
        description: impl Into<String>,
        transcript_hint: Option<String>,
    ) -> Option<Flagged> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Phase::Active(session) = &mut state.phase else {
            debug!("Ignoring flag_issue: no active walkthrough");
            return None;
        };
        let transcript =
            transcript_hint.or_else(|| session.last_user_utterance().map(str::to_string));
        let issue = FlaggedIssue::new(description.into(), state.latest_frame.clone(), transcript);
        info!(
            session_id = %session.id,
            issue_id = %issue.id,
            description = %issue.description,
            "Issue flagged"
        );
        let issue_id = issue.id;
        session.flags.push(issue);
        Some(Flagged {
            issue_id,
            count: session.flags.len(),
        })
    }

    /// Fills location and priority on the issue created by [`Self::flag_issue`].
    ///
    /// `None` leaves the existing value untouched. Returns `false` when there
    /// is no active session or no issue with that id.
    pub async fn update_flag(
        &self,
        issue_id: Uuid,
        location: Option<String>,
        priority: Option<String>,
    ) -> bool {
        let mut state = self.state.lock().await;
        let Phase::Active(session) = &mut state.phase else {
            return false;
        };
        // Concurrent flag calls may have appended after this one.
        let Some(issue) = session.flags.iter_mut().rev().find(|f| f.id == issue_id) else {
            return false;
        };
        if location.is_some() {
            issue.location = location;
        }
        if priority.is_some() {
            issue.priority = priority;
        }
        true
    }

    pub async fn add_transcript(&self, speaker: Speaker, text: impl Into<String>) {
        let mut state = self.state.lock().await;
        if let Phase::Active(session) = &mut state.phase {
            session.transcript.push(TranscriptSegment {
                timestamp: Utc::now(),
                speaker,
                text: text.into(),
            });
        }
    }

    /// Ends the active session, persists it, and asks the vertical for a report.
    ///
    /// Returns `None` when no session was active or the vertical produced no
    /// report.
    pub async fn end(&self) -> Option<ReportOutput> {
        let session = {
            let mut state = self.state.lock().await;
            let Phase::Active(session) = &mut state.phase else {
                debug!("Ignoring end: no active walkthrough");
                return None;
            };
            session.ended_at = Some(Utc::now());
            let session = session.clone();
            state.phase = Phase::Ended(session.clone());
            session
        };

        info!(
            session_id = %session.id,
            flags = session.flags.len(),
            segments = session.transcript.len(),
            "Walkthrough session ended"
        );
        let history = self.history.clone();
        let record = session.clone();
        match tokio::task::spawn_blocking(move || history.append(record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(
                session_id = %session.id,
                error = %e,
                "Failed to persist walkthrough session"
            ),
            Err(e) => error!(session_id = %session.id, error = %e, "History write task failed"),
        }

        let report = self.vertical.generate_report(&session);
        if let Some(report) = &report {
            info!(filename = %report.filename(), "Walkthrough report generated");
        }
        self.state.lock().await.last_report = report.clone();
        report
    }

    /// Snapshot of the current (active or just-ended) session.
    pub async fn current(&self) -> Option<WalkthroughSession> {
        match &self.state.lock().await.phase {
            Phase::Absent => None,
            Phase::Active(session) | Phase::Ended(session) => Some(session.clone()),
        }
    }

    pub async fn flag_count(&self) -> usize {
        match &self.state.lock().await.phase {
            Phase::Absent => 0,
            Phase::Active(session) | Phase::Ended(session) => session.flags.len(),
        }
    }

    pub async fn last_report(&self) -> Option<ReportOutput> {
        self.state.lock().await.last_report.clone()
    }

    /// Stored sessions, oldest first. The store is read on the blocking pool.
    pub async fn history(&self) -> Vec<WalkthroughSession> {
        let history = self.history.clone();
        tokio::task::spawn_blocking(move || history.load())
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "History read task failed; treating history as empty");
                Vec::new()
            })
    }

    /// Plain-text digest of recent sessions for prompt injection.
    pub async fn past_session_summaries(&self, limit: usize) -> String {
        summarize_sessions(self.history().await, limit)
    }
}

/// Renders the newest `limit` sessions, newest first.
pub fn summarize_sessions(mut sessions: Vec<WalkthroughSession>, limit: usize) -> String {
    sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    let mut out = String::new();
    for session in sessions.iter().take(limit) {
        let _ = writeln!(
            out,
            "- {} ({} issue{} flagged)",
            session.started_at.format("%Y-%m-%d %H:%M UTC"),
            session.flags.len(),
            if session.flags.len() == 1 { "" } else { "s" },
        );
        for flag in session.flags.iter().take(SUMMARY_FLAGS_PER_SESSION) {
            let _ = writeln!(out, "  * {}", flag.description);
        }
    }
    out
}
