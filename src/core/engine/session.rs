//! Session state for an avatar engine.
//!
//! The state machine is deliberately small: Idle -> Active -> Idle. At most
//! one session is active per instance; starting a second one is an error the
//! caller handles, not an implicit restart.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One turn in the conversation transcript.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Counters accumulated over a session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionMetrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub tokens_used: u64,
}

/// Mutable session state behind the engine's session lock.
#[derive(Debug, Default)]
pub struct SessionState {
    pub active: bool,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub transcript: Vec<TranscriptEntry>,
    pub metrics: SessionMetrics,
}

impl SessionState {
    /// Transition to Active, resetting transcript and metrics.
    pub fn start(&mut self, session_id: String) {
        self.active = true;
        self.session_id = Some(session_id);
        self.started_at = Some(Utc::now());
        self.transcript.clear();
        self.metrics = SessionMetrics::default();
    }

    /// Transition to Idle, returning the closed session's id and duration.
    pub fn stop(&mut self) -> (Option<String>, f64) {
        self.active = false;
        let session_id = self.session_id.take();
        let duration = self.duration_seconds();
        self.started_at = None;
        (session_id, duration)
    }

    /// Seconds since the session started (0 when idle).
    pub fn duration_seconds(&self) -> f64 {
        self.started_at
            .map(|start| (Utc::now() - start).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_resets_state() {
        let mut state = SessionState::default();
        state.transcript.push(TranscriptEntry::new("user", "old"));
        state.metrics.messages_sent = 7;

        state.start("session-1".to_string());

        assert!(state.active);
        assert_eq!(state.session_id.as_deref(), Some("session-1"));
        assert!(state.transcript.is_empty());
        assert_eq!(state.metrics.messages_sent, 0);
    }

    #[test]
    fn test_stop_returns_id_and_clears() {
        let mut state = SessionState::default();
        state.start("session-2".to_string());

        let (id, duration) = state.stop();

        assert_eq!(id.as_deref(), Some("session-2"));
        assert!(duration >= 0.0);
        assert!(!state.active);
        assert!(state.session_id.is_none());
        assert!(state.started_at.is_none());
    }

    #[test]
    fn test_duration_zero_when_idle() {
        let state = SessionState::default();
        assert_eq!(state.duration_seconds(), 0.0);
    }
}
