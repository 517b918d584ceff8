//! Bounded dialogue memory for one session
//!
//! Keeps the most recent user and system messages in a FIFO buffer. Once the
//! buffer is full the oldest message is evicted. The rendered transcript is
//! passed to the pipeline under the `memory` context key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of messages kept
pub const DEFAULT_MAX_MESSAGES: usize = 10;

/// Memory settings, `[memory]` in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Messages kept before the oldest is evicted; 0 disables memory
    pub max_messages: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    System,
}

impl Speaker {
    fn label(&self) -> &'static str {
        match self {
            Speaker::User => "User",
            Speaker::System => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueMessage {
    pub speaker: Speaker,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Session transcript with bounded storage
#[derive(Debug, Clone)]
pub struct DialogueMemory {
    messages: VecDeque<DialogueMessage>,
    max_messages: usize,
}

impl Default for DialogueMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl DialogueMemory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_MESSAGES)
    }

    pub fn with_capacity(max_messages: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(max_messages),
            max_messages,
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::with_capacity(config.max_messages)
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.push(Speaker::User, content.into());
    }

    pub fn add_system_message(&mut self, content: impl Into<String>) {
        self.push(Speaker::System, content.into());
    }

    fn push(&mut self, speaker: Speaker, content: String) {
        if self.max_messages == 0 {
            return;
        }
        if self.messages.len() >= self.max_messages {
            self.messages.pop_front();
        }
        self.messages.push_back(DialogueMessage {
            speaker,
            content,
            at: Utc::now(),
        });
    }

    pub fn messages(&self) -> &VecDeque<DialogueMessage> {
        &self.messages
    }

    /// Transcript as `User: ...` / `Assistant: ...` lines, oldest first
    pub fn build_memory_context(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.speaker.label(), m.content.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_lists_turns_in_order() {
        let mut memory = DialogueMemory::new();
        memory.add_user_message("Who founded Huawei?");
        memory.add_system_message(" Ren Zhengfei. ");

        assert_eq!(
            memory.build_memory_context(),
            "User: Who founded Huawei?\nAssistant: Ren Zhengfei."
        );
    }

    #[test]
    fn test_oldest_message_evicted() {
        let mut memory = DialogueMemory::with_capacity(3);
        for i in 0..5 {
            memory.add_user_message(format!("q{}", i));
        }

        assert_eq!(memory.len(), 3);
        assert_eq!(memory.messages().front().unwrap().content, "q2");
        assert_eq!(memory.messages().back().unwrap().content, "q4");
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut memory = DialogueMemory::from_config(&MemoryConfig { max_messages: 0 });
        memory.add_user_message("hello");

        assert!(memory.is_empty());
        assert_eq!(memory.build_memory_context(), "");
    }
}
