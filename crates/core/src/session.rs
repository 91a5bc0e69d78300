//! Walkthrough session data model.
//!
//! These types are what the Session Manager accumulates while a walkthrough is
//! active and what the history store persists once it has ended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Who produced a transcript segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Ai,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Ai => write!(f, "ai"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub timestamp: DateTime<Utc>,
    pub speaker: Speaker,
    pub text: String,
}

/// An observation recorded during a walkthrough.
///
/// Created with a description and the latest camera frame, then optionally
/// enriched with a location and priority by the handler that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedIssue {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub description: String,
    #[serde(default, with = "base64_bytes")]
    pub image: Option<Vec<u8>>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

impl FlaggedIssue {
    pub fn new(description: String, image: Option<Vec<u8>>, transcript: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            description,
            image,
            transcript,
            location: None,
            priority: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkthroughSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    pub vertical_id: String,
    #[serde(default)]
    pub flags: Vec<FlaggedIssue>,
    #[serde(default)]
    pub transcript: Vec<TranscriptSegment>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl WalkthroughSession {
    pub fn new(vertical_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            vertical_id: vertical_id.into(),
            flags: Vec::new(),
            transcript: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Most recent thing the user said, if anything.
    pub fn last_user_utterance(&self) -> Option<&str> {
        self.transcript
            .iter()
            .rev()
            .find(|segment| segment.speaker == Speaker::User)
            .map(|segment| segment.text.as_str())
    }
}

/// Serializes optional image bytes as a base64 string so history stays JSON.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => s.serialize_some(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
