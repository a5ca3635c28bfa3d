//! Per-session conversation memory.
//!
//! Each session keeps an ordered transcript of question/answer turns,
//! optionally windowed to the most recent N. The registry hands out one
//! memory per session id; sessions never observe each other's turns.
//!
//! Turns are written only after an exchange fully succeeds. A failed
//! generation call leaves the transcript exactly as it was, so a retry of
//! the same question does not see a phantom half-turn.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

/// One completed question/answer exchange.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    pub at: DateTime<Utc>,
}

/// Ordered transcript for a single session.
#[derive(Debug)]
pub struct ConversationMemory {
    turns: VecDeque<ConversationTurn>,
    max_turns: Option<usize>,
}

impl ConversationMemory {
    pub fn new(max_turns: Option<usize>) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns,
        }
    }

    /// Record a completed exchange, evicting the oldest turn when the
    /// window is full.
    pub fn append(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push_back(ConversationTurn {
            question: question.into(),
            answer: answer.into(),
            at: Utc::now(),
        });
        if let Some(max) = self.max_turns {
            while self.turns.len() > max {
                self.turns.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Chronological copy of the retained turns.
    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    /// Render the retained turns as prompt history, oldest first. Empty
    /// string when there is no history.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("Human: ");
            out.push_str(&turn.question);
            out.push_str("\nAssistant: ");
            out.push_str(&turn.answer);
        }
        out
    }
}

/// Hands out per-session memories, creating them on first use.
///
/// Each memory sits behind its own async mutex so concurrent requests to
/// the same session serialize their read-then-append sequence while
/// different sessions proceed independently.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Mutex<ConversationMemory>>>>,
    max_turns: Option<usize>,
}

impl SessionRegistry {
    pub fn new(max_turns: Option<usize>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_turns,
        }
    }

    pub fn session(&self, id: &str) -> Arc<Mutex<ConversationMemory>> {
        if let Some(existing) = self.sessions.read().unwrap().get(id) {
            return Arc::clone(existing);
        }
        let mut sessions = self.sessions.write().unwrap();
        Arc::clone(
            sessions
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(ConversationMemory::new(self.max_turns)))),
        )
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut memory = ConversationMemory::new(None);
        memory.append("q1", "a1");
        memory.append("q2", "a2");

        let turns = memory.snapshot();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].question, "q1");
        assert_eq!(turns[1].question, "q2");
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut memory = ConversationMemory::new(Some(2));
        memory.append("q1", "a1");
        memory.append("q2", "a2");
        memory.append("q3", "a3");

        let turns = memory.snapshot();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].question, "q2");
        assert_eq!(turns[1].question, "q3");
    }

    #[test]
    fn test_unbounded_when_no_window() {
        let mut memory = ConversationMemory::new(None);
        for i in 0..100 {
            memory.append(format!("q{}", i), format!("a{}", i));
        }
        assert_eq!(memory.len(), 100);
    }

    #[test]
    fn test_render_format() {
        let mut memory = ConversationMemory::new(None);
        assert_eq!(memory.render(), "");

        memory.append("What is Article 1?", "It protects the right to life.");
        assert_eq!(
            memory.render(),
            "Human: What is Article 1?\nAssistant: It protects the right to life."
        );
    }

    #[test]
    fn test_registry_isolates_sessions() {
        let registry = SessionRegistry::new(None);
        {
            let session_a = registry.session("a");
            session_a.blocking_lock().append("question a", "answer a");
        }

        let session_b = registry.session("b");
        assert!(session_b.blocking_lock().is_empty());
        assert_eq!(registry.session_count(), 2);
    }

    #[test]
    fn test_registry_returns_same_memory_for_same_id() {
        let registry = SessionRegistry::new(None);
        registry.session("x").blocking_lock().append("q", "a");
        assert_eq!(registry.session("x").blocking_lock().len(), 1);
        assert_eq!(registry.session_count(), 1);
    }
}
