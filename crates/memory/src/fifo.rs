//! The bounded rolling window of message records visible to the model,
//! persisted alongside the lifetime counters `spec.md` §3 describes.

use std::collections::VecDeque;

use memos_core::MessageRecord;
use serde::{Deserialize, Serialize};

/// Serialized shape of `fifo_queue.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FifoState {
    pub fifo_queue: VecDeque<MessageRecord>,
    pub total_no_messages: u64,
    pub no_messages_in_queue: u64,
}

impl Default for FifoState {
    fn default() -> Self {
        Self {
            fifo_queue: VecDeque::new(),
            total_no_messages: 0,
            no_messages_in_queue: 0,
        }
    }
}

pub struct FifoQueue {
    state: FifoState,
}

impl FifoQueue {
    pub fn new(state: FifoState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &FifoState {
        &self.state
    }

    pub fn records(&self) -> &VecDeque<MessageRecord> {
        &self.state.fifo_queue
    }

    pub fn total_no_messages(&self) -> u64 {
        self.state.total_no_messages
    }

    pub fn no_messages_in_queue(&self) -> u64 {
        self.state.no_messages_in_queue
    }

    /// Appends a record, incrementing both lifetime counters.
    pub fn push_back(&mut self, record: MessageRecord) {
        self.state.fifo_queue.push_back(record);
        self.state.total_no_messages += 1;
        self.state.no_messages_in_queue += 1;
    }

    /// Pops the oldest record. Used only by the summarizer; decrements
    /// `no_messages_in_queue` but never `total_no_messages`.
    pub fn pop_front(&mut self) -> Option<MessageRecord> {
        let popped = self.state.fifo_queue.pop_front();
        if popped.is_some() {
            self.state.no_messages_in_queue = self.state.no_messages_in_queue.saturating_sub(1);
        }
        popped
    }

    /// Pushes a record back onto the front (used by the summarizer's
    /// boundary-adjustment loop to un-pop a record).
    pub fn push_front(&mut self, record: MessageRecord) {
        self.state.fifo_queue.push_front(record);
        self.state.no_messages_in_queue += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_back_increments_both_counters() {
        let mut fifo = FifoQueue::new(FifoState::default());
        fifo.push_back(MessageRecord::user("hi", 1));
        assert_eq!(fifo.total_no_messages(), 1);
        assert_eq!(fifo.no_messages_in_queue(), 1);
    }

    #[test]
    fn pop_front_decrements_only_in_queue_counter() {
        let mut fifo = FifoQueue::new(FifoState::default());
        fifo.push_back(MessageRecord::user("hi", 1));
        fifo.push_back(MessageRecord::user("bye", 1));
        let popped = fifo.pop_front().unwrap();
        assert_eq!(popped.content, "hi");
        assert_eq!(fifo.total_no_messages(), 2);
        assert_eq!(fifo.no_messages_in_queue(), 1);
    }

    #[test]
    fn push_front_restores_an_un_popped_record() {
        let mut fifo = FifoQueue::new(FifoState::default());
        fifo.push_back(MessageRecord::user("a", 1));
        fifo.push_back(MessageRecord::user("b", 1));
        let popped = fifo.pop_front().unwrap();
        fifo.push_front(popped);
        assert_eq!(fifo.no_messages_in_queue(), 2);
        assert_eq!(fifo.records().front().unwrap().content, "a");
    }
}
