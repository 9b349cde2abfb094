//! Composes working context, FIFO queue, recall log, archival store, and the
//! optional file store into the one object the step loop talks to. Owns the
//! FIFO and renders the model prompt.
//!
//! `main_ctx_message_seq` is ported from
//! `original_source/llm_os/memory/memory.py`'s property of the same name:
//! consecutive non-assistant records are buffered and joined with `"\n\n"`
//! when an assistant record (or the end of the queue) is hit, rather than
//! translated one record at a time.

use memos_core::{ChatMessage, MessageKind, MessageRecord};
use memos_tokenizer::{TokenCounter, TokenizerError};

use crate::archival::ArchivalStore;
use crate::fifo::FifoQueue;
use crate::file_store::FileStore;
use crate::recall::RecallLog;
use crate::working_context::WorkingContext;

pub struct Memory {
    pub working_context: WorkingContext,
    pub fifo: FifoQueue,
    pub recall: RecallLog,
    pub archival: ArchivalStore,
    pub file_store: Box<dyn FileStore>,
}

impl Memory {
    pub fn new(
        working_context: WorkingContext,
        fifo: FifoQueue,
        recall: RecallLog,
        archival: ArchivalStore,
        file_store: Box<dyn FileStore>,
    ) -> Self {
        Self {
            working_context,
            fifo,
            recall,
            archival,
            file_store,
        }
    }

    /// Appends `record` to both the FIFO queue and the recall log. The
    /// caller is responsible for persisting afterward (`SPEC_FULL.md` §4.6
    /// leaves disk I/O to `memos-persistence`; this crate only maintains
    /// in-memory invariants).
    pub fn append(&mut self, record: MessageRecord) {
        self.fifo.push_back(record.clone());
        self.recall.insert(record);
    }

    /// Assembles the leading system message plus the FIFO rewritten into
    /// alternating user/assistant turns.
    pub fn main_ctx_message_seq(
        &self,
        system_instructions: &str,
        in_context_function_schemas: &serde_json::Value,
    ) -> Vec<ChatMessage> {
        let leading = format!(
            "{system_instructions}\n\nAvailable functions:\n{}\n\nYou have {} prior messages and {} stored memories; use functions to access them.\n\n{}",
            in_context_function_schemas,
            self.recall.records().len(),
            self.archival.notes().len(),
            self.working_context.render(),
        );

        let mut sequence = vec![ChatMessage::system(leading)];
        let mut buffered: Vec<String> = Vec::new();

        for record in self.fifo.records() {
            if record.kind == MessageKind::Assistant {
                flush_buffer(&mut sequence, &mut buffered);
                sequence.push(ChatMessage::assistant(record.content.clone()));
            } else {
                buffered.push(record.sentinel_text());
            }
        }
        flush_buffer(&mut sequence, &mut buffered);

        sequence
    }

    /// Token count of [`Self::main_ctx_message_seq`] under the given
    /// chat-template counter.
    pub fn main_ctx_message_seq_no_tokens(
        &self,
        system_instructions: &str,
        in_context_function_schemas: &serde_json::Value,
        counter: &dyn TokenCounter,
    ) -> Result<usize, TokenizerError> {
        let sequence = self.main_ctx_message_seq(system_instructions, in_context_function_schemas);
        counter.count_chat(&sequence)
    }
}

fn flush_buffer(sequence: &mut Vec<ChatMessage>, buffered: &mut Vec<String>) {
    if !buffered.is_empty() {
        sequence.push(ChatMessage::user(buffered.join("\n\n")));
        buffered.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fifo::FifoState;
    use crate::file_store::NoFileStore;
    use crate::working_context::WorkingContextState;

    fn empty_memory() -> Memory {
        Memory::new(
            WorkingContext::new(WorkingContextState::default(), 750, 500),
            FifoQueue::new(FifoState::default()),
            RecallLog::default(),
            ArchivalStore::new(Vec::new(), 8192, 100),
            Box::new(NoFileStore),
        )
    }

    #[test]
    fn append_lands_in_both_fifo_and_recall() {
        let mut memory = empty_memory();
        memory.append(MessageRecord::user("hi", 1));
        assert_eq!(memory.fifo.no_messages_in_queue(), 1);
        assert_eq!(memory.fifo.total_no_messages(), 1);
        assert_eq!(memory.recall.records().len(), 1);
    }

    #[test]
    fn consecutive_non_assistant_records_are_joined_into_one_user_turn() {
        let mut memory = empty_memory();
        memory.append(MessageRecord::system("header", 1));
        memory.append(MessageRecord::user("hello", 1));
        memory.append(MessageRecord::assistant("{\"ok\":true}", 1));
        memory.append(MessageRecord::tool("Status: OK.", 1));

        let sequence = memory.main_ctx_message_seq("instructions", &serde_json::json!([]));
        // [0] leading system, [1] joined system+user, [2] assistant passthrough, [3] trailing tool
        assert_eq!(sequence.len(), 4);
        assert!(sequence[1].content.contains("SYSTEM MESSAGE"));
        assert!(sequence[1].content.contains("USER MESSAGE"));
        assert_eq!(sequence[2].content, "{\"ok\":true}");
        assert!(sequence[3].content.contains("TOOL MESSAGE"));
    }

    #[test]
    fn leading_system_message_carries_working_context_render() {
        let mut memory = empty_memory();
        memory
            .working_context
            .edit_persona("a helpful agent", &NoopCounter)
            .unwrap();
        let sequence = memory.main_ctx_message_seq("instructions", &serde_json::json!([]));
        assert!(sequence[0].content.contains("a helpful agent"));
    }

    struct NoopCounter;
    impl TokenCounter for NoopCounter {
        fn count_str(&self, text: &str) -> Result<usize, TokenizerError> {
            Ok(text.split_whitespace().count())
        }
        fn count_chat(&self, _messages: &[ChatMessage]) -> Result<usize, TokenizerError> {
            Ok(0)
        }
        fn context_window(&self) -> usize {
            8192
        }
    }
}
