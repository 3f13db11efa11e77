//! Session Management
//!
//! A session is the conversation of one top-level `invoke`. It starts from a
//! seed (the system turn, or nothing), grows by appends, and is reseeded when
//! the invoke finishes.

use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::Conversation;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Conversation state owned by an agent
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: SessionId,

    /// System prompt re-seeded on every reset; `None` seeds an empty conversation
    system_prompt: Option<String>,

    /// Live conversation
    conversation: Conversation,

    /// Full conversation of the most recent finished turn, captured before reset
    last_transcript: Option<Conversation>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a session. An empty prompt means no system turn.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let system_prompt = Some(system_prompt.into()).filter(|p| !p.is_empty());
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            conversation: Self::seed(system_prompt.as_deref()),
            system_prompt,
            last_transcript: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn seed(system_prompt: Option<&str>) -> Conversation {
        system_prompt.map_or_else(Conversation::new, Conversation::with_system_prompt)
    }

    /// Configured system prompt, if any
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Current conversation
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Conversation of the most recent turn, as it stood before reset
    pub fn last_transcript(&self) -> Option<&Conversation> {
        self.last_transcript.as_ref()
    }

    /// Discard the conversation and reseed it
    pub fn reset(&mut self) {
        self.conversation = Self::seed(self.system_prompt.as_deref());
        self.touch();
    }

    /// Start a turn. The returned guard derefs to the live conversation and,
    /// when dropped, archives it as the last transcript and reseeds.
    pub fn begin(&mut self) -> TurnGuard<'_> {
        self.touch();
        TurnGuard { session: self }
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Message count
    pub fn message_count(&self) -> usize {
        self.conversation.len()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(String::new())
    }
}

/// Scope of one turn. Resets the session on every exit path, including
/// errors and cancellation.
#[derive(Debug)]
pub struct TurnGuard<'a> {
    session: &'a mut Session,
}

impl Deref for TurnGuard<'_> {
    type Target = Conversation;

    fn deref(&self) -> &Conversation {
        &self.session.conversation
    }
}

impl DerefMut for TurnGuard<'_> {
    fn deref_mut(&mut self) -> &mut Conversation {
        &mut self.session.conversation
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        let seed = Session::seed(self.session.system_prompt.as_deref());
        let transcript = std::mem::replace(&mut self.session.conversation, seed);
        self.session.last_transcript = Some(transcript);
        self.session.touch();
    }
}
