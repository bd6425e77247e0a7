//! Bounded conversation memory
//!
//! History is capped by an approximate token budget (chars / 4). When the
//! budget is exceeded the oldest messages are evicted first. The system
//! prompt is not stored here; it is prepended per request.

use crate::llm::ChatMessage;

/// FIFO-bounded message store
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
    token_budget: usize,
}

impl ConversationHistory {
    pub fn new(token_budget: usize) -> Self {
        Self {
            messages: Vec::new(),
            token_budget,
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.evict();
    }

    fn evict(&mut self) {
        let mut total: usize = self.messages.iter().map(ChatMessage::approx_tokens).sum();
        while total > self.token_budget && self.messages.len() > 1 {
            let evicted = self.messages.remove(0);
            total -= evicted.approx_tokens();
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
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

    pub fn approx_tokens(&self) -> usize {
        self.messages.iter().map(ChatMessage::approx_tokens).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_is_fifo() {
        let mut history = ConversationHistory::new(100);
        for i in 0..20 {
            history.push(ChatMessage::user(format!("message {} {}", i, "x".repeat(50))));
        }
        assert!(history.approx_tokens() <= 100);
        // The oldest messages are gone, the newest survive.
        let first = &history.messages()[0];
        assert!(!first.content.starts_with("message 0"));
        let last = history.messages().last().unwrap();
        assert!(last.content.starts_with("message 19"));
    }

    #[test]
    fn latest_message_is_always_kept() {
        let mut history = ConversationHistory::new(1);
        history.push(ChatMessage::user("a".repeat(400)));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn clear_empties() {
        let mut history = ConversationHistory::new(100);
        history.push(ChatMessage::user("hello"));
        history.clear();
        assert!(history.is_empty());
    }
}
