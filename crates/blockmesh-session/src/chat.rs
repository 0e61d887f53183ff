//! Chat history and outbound validation.
//!
//! Messages are validated before they leave the local peer: whitespace-only
//! text is dropped silently and over-long text is refused. Received chat is
//! not re-validated; every peer keeps a bounded [`ChatLog`].

use std::collections::VecDeque;

use crate::collab::Speaker;

/// One line of chat or a system notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub speaker: Speaker,
    pub text: String,
}

/// Reason a chat message was not sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRejection {
    /// Message is empty or whitespace-only.
    Empty,
    /// Message exceeds the configured length, in characters.
    TooLong { len: usize, max: usize },
}

/// Validate outbound text, returning it trimmed.
pub fn validate_chat_message(text: &str, max_len: usize) -> Result<&str, ChatRejection> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ChatRejection::Empty);
    }
    let len = trimmed.chars().count();
    if len > max_len {
        return Err(ChatRejection::TooLong { len, max: max_len });
    }
    Ok(trimmed)
}

/// Bounded chat history; the oldest entry goes first.
#[derive(Debug, Clone)]
pub struct ChatLog {
    entries: VecDeque<ChatEntry>,
    capacity: usize,
}

impl ChatLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(ChatEntry {
            speaker,
            text: text.into(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&ChatEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_message_is_trimmed() {
        assert_eq!(validate_chat_message("  hello  ", 500), Ok("hello"));
    }

    #[test]
    fn test_empty_message_rejected() {
        assert_eq!(validate_chat_message("", 500), Err(ChatRejection::Empty));
        assert_eq!(validate_chat_message(" \t\n", 500), Err(ChatRejection::Empty));
    }

    #[test]
    fn test_too_long_message_rejected() {
        let text = "a".repeat(501);
        assert_eq!(
            validate_chat_message(&text, 500),
            Err(ChatRejection::TooLong { len: 501, max: 500 })
        );
        assert!(validate_chat_message(&"a".repeat(500), 500).is_ok());
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let text = "é".repeat(500);
        assert!(validate_chat_message(&text, 500).is_ok());
    }

    #[test]
    fn test_log_drops_oldest() {
        let mut log = ChatLog::new(2);
        log.push(Speaker::System, "one");
        log.push(Speaker::Player("A".to_string()), "two");
        log.push(Speaker::System, "three");
        let texts: Vec<&str> = log.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["two", "three"]);
        assert_eq!(log.latest().unwrap().text, "three");
    }
}
