//! Session Orchestrator
//!
//! Drives one live session through `idle -> starting -> running -> stopping
//! -> idle`, with `error` reachable from `starting` and `running`. While a
//! session runs, a single event loop consumes transport events, microphone
//! audio and routed tool responses, and a poll loop mirrors collaborator
//! state into the published [`SessionSnapshot`].

use crate::audio::{AudioError, AudioResource};
use crate::config::Config;
use crate::prompts::{self, assemble_prompt};
use crate::state::{SessionPhase, SessionSnapshot};
use crate::transport::{ModelTransport, TransportError, TransportEvent};
use anyhow::Result;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};
use walkthrough_core::{
    KeyValueStore, RemoteAgentBridge, ReportOutput, ResponseSink, SessionHistory, SessionManager,
    Speaker, ToolCallRouter, ToolResponse, Vertical,
};

const EVENT_BUFFER: usize = 256;
const MIC_BUFFER: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("A session is already active")]
    AlreadyActive,
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Audio(#[from] AudioError),
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub api_key: Option<String>,
    pub base_prompt: String,
    pub poll_interval: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            api_key: config.gemini_api_key.clone(),
            base_prompt: prompts::base_prompt(&config.prompts_path)?,
            poll_interval: config.poll_interval,
        })
    }
}

/// External components the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn ModelTransport>,
    pub bridge: Arc<dyn RemoteAgentBridge>,
    pub audio: Arc<dyn AudioResource>,
    pub store: Arc<dyn KeyValueStore>,
}

struct ActiveSession {
    manager: Arc<SessionManager>,
    router: Arc<ToolCallRouter>,
    /// Cancels the poll loop and the event loop.
    scope: CancellationToken,
    events: Option<JoinHandle<()>>,
}

/// Loop-local state owned by the event loop.
struct EventLoop {
    manager: Arc<SessionManager>,
    router: Arc<ToolCallRouter>,
    responses: ResponseSink,
    user_turn: String,
    model_turn: String,
}

impl EventLoop {
    async fn flush_user_turn(&mut self) {
        let text = std::mem::take(&mut self.user_turn);
        if !text.trim().is_empty() {
            self.manager.add_transcript(Speaker::User, text.trim()).await;
        }
    }

    async fn flush_model_turn(&mut self) {
        let text = std::mem::take(&mut self.model_turn);
        if !text.trim().is_empty() {
            self.manager.add_transcript(Speaker::Ai, text.trim()).await;
        }
    }
}

pub struct SessionOrchestrator {
    settings: OrchestratorSettings,
    vertical: Arc<dyn Vertical>,
    deps: Collaborators,
    state: watch::Sender<SessionSnapshot>,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionOrchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        vertical: Arc<dyn Vertical>,
        deps: Collaborators,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Arc::new(Self {
            settings,
            vertical,
            deps,
            state,
            active: Mutex::new(None),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn vertical(&self) -> &Arc<dyn Vertical> {
        &self.vertical
    }

    /// Starts a session. On failure every resource acquired so far is
    /// released and the error is published as the snapshot's message.
    pub async fn start(self: &Arc<Self>) -> Result<(), OrchestratorError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            warn!("Start requested while a session is active");
            return Err(OrchestratorError::AlreadyActive);
        }
        if self.settings.api_key.as_deref().is_none_or(str::is_empty) {
            let err = OrchestratorError::Configuration("GEMINI_API_KEY is not set".to_string());
            error!(error = %err, "Cannot start session");
            self.publish_reset(SessionPhase::Error, Some(err.to_string()));
            return Err(err);
        }

        info!(vertical = %self.vertical.id(), "Starting session");
        self.publish_reset(SessionPhase::Starting, None);

        let history =
            SessionHistory::new(self.deps.store.clone(), self.vertical.session_key_prefix());
        let manager = Arc::new(SessionManager::new(self.vertical.clone(), history));
        let session_id = manager.start().await;

        let context = self.vertical.context_block(&manager).await;
        let prompt = assemble_prompt(
            &self.settings.base_prompt,
            self.vertical.system_prompt(),
            context.as_deref(),
        );
        self.deps
            .transport
            .set_dynamic_config(Some(prompt), Some(self.vertical.tool_schemas()));

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (mic_tx, mic_rx) = mpsc::channel(MIC_BUFFER);
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        if !self.deps.bridge.check_connection().await {
            warn!("Remote agent is unreachable; delegated tool calls will fail");
        }
        self.deps.bridge.reset_session().await;

        let router = Arc::new(ToolCallRouter::new(
            Some(self.vertical.clone()),
            manager.clone(),
            self.deps.bridge.clone(),
        ));
        let mut session = ActiveSession {
            manager: manager.clone(),
            router: router.clone(),
            scope: CancellationToken::new(),
            events: None,
        };

        let span = tracing::info_span!("walkthrough", %session_id);
        tokio::spawn(
            self.clone()
                .poll_loop(manager.clone(), session.scope.clone())
                .instrument(span.clone()),
        );

        if let Err(e) = self.deps.audio.setup_session().await {
            return Err(self.rollback(&session, false, e.into()).await);
        }
        if let Err(e) = self.deps.transport.connect(event_tx).await {
            return Err(self.rollback(&session, false, e.into()).await);
        }
        if let Err(e) = self.deps.audio.start_capture(mic_tx).await {
            return Err(self.rollback(&session, true, e.into()).await);
        }

        let event_loop = EventLoop {
            manager,
            router,
            responses: response_tx,
            user_turn: String::new(),
            model_turn: String::new(),
        };
        session.events = Some(tokio::spawn(
            self.clone()
                .run_events(event_loop, event_rx, mic_rx, response_rx, session.scope.clone())
                .instrument(span),
        ));

        *active = Some(session);
        self.state.send_modify(|s| s.phase = SessionPhase::Running);
        info!("Session running");
        Ok(())
    }

    /// Explicit stop. A no-op when no session is active.
    pub async fn stop(&self) {
        let Some(session) = self.active.lock().await.take() else {
            debug!("Stop requested with no active session");
            return;
        };
        info!("Stopping session");
        self.state.send_modify(|s| s.phase = SessionPhase::Stopping);
        self.teardown(session).await;
        self.publish_reset(SessionPhase::Idle, None);
        info!("Session stopped");
    }

    /// Unexpected disconnection from the transport. Idempotent.
    async fn handle_disconnect(&self, reason: String) {
        let Some(mut session) = self.active.lock().await.take() else {
            debug!(%reason, "Disconnect after teardown; ignoring");
            return;
        };
        error!(%reason, "Model connection lost");
        // Called from the event loop itself, which exits right after.
        session.events = None;
        self.teardown(session).await;
        self.publish_reset(SessionPhase::Error, Some(format!("Connection lost: {reason}")));
    }

    /// Clears a published error so the UI returns to idle.
    pub fn dismiss_error(&self) {
        self.state.send_if_modified(|s| {
            if s.phase != SessionPhase::Error {
                return false;
            }
            *s = SessionSnapshot::default();
            true
        });
    }

    /// Stores the frame for flagging and forwards it to the model.
    pub async fn submit_video_frame(&self, jpeg: Bytes) {
        let Some(manager) = self.current_manager().await else {
            return;
        };
        manager.set_latest_frame(jpeg.to_vec()).await;
        self.deps.transport.send_video_frame(jpeg).await;
    }

    /// Ends the walkthrough outside the tool path, e.g. from a UI button.
    /// The live connection stays up.
    pub async fn end_walkthrough(&self) -> Option<ReportOutput> {
        let manager = self.current_manager().await?;
        let report = manager.end().await;
        let filename = report.as_ref().map(|r| r.filename().to_string());
        let flags = manager.flag_count().await;
        self.state.send_modify(|s| {
            s.flag_count = flags;
            s.last_report = filename;
        });
        report
    }

    async fn current_manager(&self) -> Option<Arc<SessionManager>> {
        self.active.lock().await.as_ref().map(|s| s.manager.clone())
    }

    /// Waits for the event loop to finish its current event before releasing
    /// audio and the transport, so nothing is written after the reset.
    async fn teardown(&self, session: ActiveSession) {
        session.scope.cancel();
        session.router.cancel_all();
        if let Some(events) = session.events {
            if let Err(e) = events.await {
                warn!(error = %e, "Event loop ended abnormally");
            }
        }
        self.deps.audio.stop_capture().await;
        self.deps.transport.disconnect().await;
        self.deps.transport.set_dynamic_config(None, None);
    }

    async fn rollback(
        &self,
        session: &ActiveSession,
        connected: bool,
        err: OrchestratorError,
    ) -> OrchestratorError {
        error!(error = %err, "Session start failed; rolling back");
        session.scope.cancel();
        session.router.cancel_all();
        self.deps.audio.stop_capture().await;
        if connected {
            self.deps.transport.disconnect().await;
        }
        self.deps.transport.set_dynamic_config(None, None);
        self.publish_reset(SessionPhase::Error, Some(err.to_string()));
        err
    }

    fn publish_reset(&self, phase: SessionPhase, error_message: Option<String>) {
        self.state.send_replace(SessionSnapshot::reset(phase, error_message));
    }

    /// Mirrors transport, bridge and session state into the snapshot.
    async fn poll_loop(
        self: Arc<Self>,
        manager: Arc<SessionManager>,
        scope: CancellationToken,
    ) {
        loop {
            if scope.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = scope.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
            if scope.is_cancelled() {
                break;
            }

            let flag_count = manager.flag_count().await;
            let last_report = manager.last_report().await.map(|r| r.filename().to_string());
            let connection = self.deps.transport.connection_state();
            let agent_connection = self.deps.bridge.connection_state();
            let agent_status = self.deps.bridge.last_call_status();

            self.state.send_if_modified(|s| {
                // Teardown cancels the scope before resetting the snapshot.
                if scope.is_cancelled() {
                    return false;
                }
                let next = SessionSnapshot {
                    connection,
                    agent_connection,
                    agent_status,
                    flag_count,
                    last_report,
                    ..s.clone()
                };
                if *s == next {
                    return false;
                }
                *s = next;
                true
            });
        }
        debug!("Poll loop finished");
    }

    async fn run_events(
        self: Arc<Self>,
        mut ctx: EventLoop,
        mut events: mpsc::Receiver<TransportEvent>,
        mut mic: mpsc::Receiver<Bytes>,
        mut responses: mpsc::UnboundedReceiver<ToolResponse>,
        scope: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = scope.cancelled() => break,
                Some(response) = responses.recv() => {
                    debug!(call_id = %response.id, "Sending tool response");
                    self.deps.transport.send_tool_response(response).await;
                }
                event = events.recv() => match event {
                    Some(TransportEvent::Disconnected { reason }) => {
                        self.handle_disconnect(reason).await;
                        break;
                    }
                    Some(event) => self.handle_event(&mut ctx, event).await,
                    None => {
                        self.handle_disconnect("event stream closed".to_string()).await;
                        break;
                    }
                },
                Some(chunk) = mic.recv() => self.deps.transport.send_audio(chunk).await,
            }
        }
        debug!("Event loop finished");
    }

    async fn handle_event(&self, ctx: &mut EventLoop, event: TransportEvent) {
        match event {
            TransportEvent::AudioReceived(pcm) => {
                self.deps.audio.play(pcm).await;
                self.state.send_if_modified(|s| !std::mem::replace(&mut s.model_speaking, true));
            }
            TransportEvent::Interrupted => {
                debug!("Model interrupted");
                self.deps.audio.interrupt_playback().await;
                ctx.flush_user_turn().await;
                ctx.flush_model_turn().await;
                self.state.send_modify(|s| s.model_speaking = false);
            }
            TransportEvent::TurnComplete => {
                ctx.flush_user_turn().await;
                ctx.flush_model_turn().await;
                self.state.send_modify(|s| s.model_speaking = false);
            }
            TransportEvent::InputTranscript(text) => {
                ctx.user_turn.push_str(&text);
                let current = ctx.user_turn.clone();
                self.state.send_modify(|s| s.input_transcript = current);
            }
            TransportEvent::OutputTranscript(text) => {
                // The model answering means the user's turn is over.
                ctx.flush_user_turn().await;
                ctx.model_turn.push_str(&text);
                let current = ctx.model_turn.clone();
                self.state.send_modify(|s| s.output_transcript = current);
            }
            TransportEvent::ToolCalls(calls) => {
                ctx.flush_user_turn().await;
                for call in calls {
                    info!(call_id = %call.id, tool = %call.name, "Tool call received");
                    ctx.router.route(call, ctx.responses.clone());
                }
            }
            TransportEvent::ToolCallCancellation(ids) => {
                info!(?ids, "Tool call cancellation received");
                ctx.router.cancel(&ids);
            }
            TransportEvent::Disconnected { reason } => {
                // Handled by the event loop before dispatch.
                warn!(%reason, "Unexpected disconnect event in handler");
            }
        }
    }
}
