//! Audio device contract: microphone capture and speaker playback.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("Audio session setup failed: {0}")]
    Setup(String),
    #[error("Microphone capture failed to start: {0}")]
    Capture(String),
}

#[async_trait]
pub trait AudioResource: Send + Sync {
    async fn setup_session(&self) -> Result<(), AudioError>;

    /// Starts streaming microphone PCM chunks into `chunks`.
    async fn start_capture(&self, chunks: mpsc::Sender<Bytes>) -> Result<(), AudioError>;

    /// Stops capture and releases the audio session. Safe to call when
    /// nothing was started.
    async fn stop_capture(&self);

    async fn play(&self, pcm: Bytes);

    async fn interrupt_playback(&self);
}
