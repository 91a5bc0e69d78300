//! Walkthrough Service Library Crate
//!
//! Runs a live voice and vision walkthrough session on top of
//! `walkthrough-core`: the session orchestrator, the contracts for the model
//! transport and audio device, configuration, prompts, and logging setup.
//! The `walkthrough` binary is a thin wrapper around this library.

pub mod audio;
pub mod config;
pub mod orchestrator;
pub mod prompts;
pub mod state;
pub mod telemetry;
pub mod transport;

pub use orchestrator::{Collaborators, OrchestratorError, OrchestratorSettings, SessionOrchestrator};
pub use state::{SessionPhase, SessionSnapshot};
