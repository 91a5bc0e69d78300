//! Model transport contract.
//!
//! The streaming model connection (wire protocol, socket handling, audio
//! encoding) lives behind this trait. The orchestrator only configures it,
//! pushes media and tool responses into it, and consumes the events it emits
//! through a channel.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;
use walkthrough_core::{ToolCall, ToolResponse, ToolSchema};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed { reason: String },
}

/// Everything the model side can tell the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A chunk of model speech (PCM16).
    AudioReceived(Bytes),
    /// The user barged in; queued playback should stop.
    Interrupted,
    TurnComplete,
    /// Incremental transcription of the user's speech.
    InputTranscript(String),
    /// Incremental transcription of the model's speech.
    OutputTranscript(String),
    ToolCalls(Vec<ToolCall>),
    ToolCallCancellation(Vec<String>),
    Disconnected { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to the model: {0}")]
    Connect(String),
}

#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Sets the prompt and tool declarations used by the next connection.
    /// `None` clears the override.
    fn set_dynamic_config(&self, system_prompt: Option<String>, tools: Option<Vec<ToolSchema>>);

    /// Opens the connection. Events are delivered to `events` until the
    /// connection closes.
    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> Result<(), TransportError>;

    async fn disconnect(&self);

    async fn send_audio(&self, pcm: Bytes);

    async fn send_video_frame(&self, jpeg: Bytes);

    async fn send_tool_response(&self, response: ToolResponse);

    fn connection_state(&self) -> ConnectionState;
}
