//! Bounded per-thread conversation history
//!
//! Each thread (the username) keeps a fixed-size buffer of user and
//! assistant turns:
//! - oldest turn evicted first when full
//! - `clear` wipes one thread and leaves the others alone

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::llm::ChatMessage;

/// Default number of messages kept per thread
pub const MAX_HISTORY_MESSAGES: usize = 100;

/// Bounded message buffer for one thread
#[derive(Debug, Clone)]
pub struct MemoryManager {
    entries: VecDeque<ChatMessage>,
    max_entries: usize,
}

impl MemoryManager {
    /// Create memory manager with custom capacity
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries.min(MAX_HISTORY_MESSAGES)),
            max_entries: max_entries.max(1),
        }
    }

    /// Add entry to memory, evicting oldest if at capacity
    pub fn add(&mut self, entry: ChatMessage) {
        if self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Get the last N entries
    pub fn last_n(&self, n: usize) -> Vec<ChatMessage> {
        let start = self.entries.len().saturating_sub(n);
        self.entries.range(start..).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<ChatMessage> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::with_capacity(MAX_HISTORY_MESSAGES)
    }
}

/// Conversation histories keyed by thread id
#[derive(Debug, Clone)]
pub struct ConversationStore {
    threads: Arc<DashMap<String, MemoryManager>>,
    max_messages: usize,
}

impl ConversationStore {
    /// `max_turns` user/assistant exchanges are kept per thread
    pub fn new(max_turns: usize) -> Self {
        Self {
            threads: Arc::new(DashMap::new()),
            max_messages: max_turns.saturating_mul(2).max(2),
        }
    }

    /// Record one completed exchange
    pub fn record_turn(&self, thread: &str, question: &str, answer: &str) {
        let mut memory = self
            .threads
            .entry(thread.to_string())
            .or_insert_with(|| MemoryManager::with_capacity(self.max_messages));
        memory.add(ChatMessage::user(question));
        memory.add(ChatMessage::assistant(answer));
    }

    /// Full history of a thread, oldest first
    pub fn history(&self, thread: &str) -> Vec<ChatMessage> {
        self.threads
            .get(thread)
            .map(|memory| memory.to_vec())
            .unwrap_or_default()
    }

    /// Most recent `n` messages of a thread
    pub fn recent(&self, thread: &str, n: usize) -> Vec<ChatMessage> {
        self.threads
            .get(thread)
            .map(|memory| memory.last_n(n))
            .unwrap_or_default()
    }

    /// Forget one thread's conversation
    pub fn clear(&self, thread: &str) {
        self.threads.remove(thread);
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(MAX_HISTORY_MESSAGES / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn test_memory_eviction() {
        let mut memory = MemoryManager::with_capacity(3);
        for i in 0..5 {
            memory.add(ChatMessage::user(format!("q{}", i)));
        }
        assert_eq!(memory.len(), 3);
        assert_eq!(memory.to_vec()[0].text_content(), "q2");
        assert_eq!(memory.last_n(1)[0].text_content(), "q4");
    }

    #[test]
    fn test_record_and_history() {
        let store = ConversationStore::new(10);
        store.record_turn("alice", "What is bail?", "Bail is...");

        let history = store.history("alice");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert!(store.history("bob").is_empty());
    }

    #[test]
    fn test_turn_bound() {
        let store = ConversationStore::new(2);
        for i in 0..5 {
            store.record_turn("alice", &format!("q{}", i), &format!("a{}", i));
        }
        let history = store.history("alice");
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].text_content(), "q3");
    }

    #[test]
    fn test_clear_is_per_thread() {
        let store = ConversationStore::default();
        store.record_turn("alice", "q", "a");
        store.record_turn("bob", "q", "a");
        store.clear("alice");

        assert!(store.history("alice").is_empty());
        assert_eq!(store.history("bob").len(), 2);
        assert_eq!(store.thread_count(), 1);
    }
}
