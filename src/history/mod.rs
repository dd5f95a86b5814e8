//! Bounded in-memory message history.
//!
//! Keeps the most recent chat messages in arrival order so they can be
//! replayed to newly joined connections. When full, the oldest message is
//! dropped (FIFO). Contents are lost on restart.

use std::collections::VecDeque;

use crate::relay::ChatMessage;

pub struct HistoryBuffer {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Create a buffer holding at most `capacity` messages (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append to the tail, returning the evicted head if capacity was exceeded
    pub fn append(&mut self, message: ChatMessage) -> Option<ChatMessage> {
        let evicted = if self.messages.len() >= self.capacity {
            self.messages.pop_front()
        } else {
            None
        };

        if let Some(ref dropped) = evicted {
            tracing::trace!(dropped_id = %dropped.id(), "Evicted oldest history entry");
        }

        self.messages.push_back(message);
        evicted
    }

    /// Full ordered contents, oldest first
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::MessageKind;

    fn msg(n: usize) -> ChatMessage {
        ChatMessage::new(MessageKind::Visitor, "Alice", format!("message {}", n))
    }

    #[test]
    fn test_append_preserves_order() {
        let mut history = HistoryBuffer::new(10);
        for i in 0..5 {
            assert!(history.append(msg(i)).is_none());
        }

        let texts: Vec<_> = history.snapshot().iter().map(|m| m.text().to_string()).collect();
        assert_eq!(
            texts,
            vec!["message 0", "message 1", "message 2", "message 3", "message 4"]
        );
    }

    #[test]
    fn test_overflow_evicts_exactly_the_oldest() {
        let capacity = 100;
        let mut history = HistoryBuffer::new(capacity);
        let first = msg(0);
        history.append(first.clone());
        for i in 1..capacity {
            history.append(msg(i));
        }
        assert_eq!(history.len(), capacity);

        let evicted = history.append(msg(capacity));
        assert_eq!(evicted, Some(first));
        assert_eq!(history.len(), capacity);

        let snapshot = history.snapshot();
        assert_eq!(snapshot.first().unwrap().text(), "message 1");
        assert_eq!(snapshot.last().unwrap().text(), format!("message {}", capacity));
        for (offset, message) in snapshot.iter().enumerate() {
            assert_eq!(message.text(), format!("message {}", offset + 1));
        }
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut history = HistoryBuffer::new(3);
        for i in 0..50 {
            history.append(msg(i));
            assert!(history.len() <= 3);
        }
        assert_eq!(history.snapshot().first().unwrap().text(), "message 47");
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut history = HistoryBuffer::new(0);
        assert_eq!(history.capacity(), 1);
        history.append(msg(0));
        history.append(msg(1));
        assert_eq!(history.len(), 1);
        assert_eq!(history.snapshot()[0].text(), "message 1");
    }

    #[test]
    fn test_default_capacity() {
        let history = HistoryBuffer::default();
        assert_eq!(history.capacity(), 100);
        assert!(history.is_empty());
    }
}
