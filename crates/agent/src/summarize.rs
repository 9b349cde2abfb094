//! Memory-pressure-driven summarization: how full the working context plus
//! FIFO queue currently render to, and the flush that shrinks the FIFO back
//! down when that gets too full.
//!
//! Ported from `original_source/llm_os/agent.py`'s `Agent.summarize_messages`:
//! pop the oldest FIFO records into a buffer until enough tokens have been
//! freed (but never below `keep_last_n_messages`), ask the model for a prose
//! summary of what was popped, and splice the summary back in as a leading
//! note. The original buffers popped records with `deque.appendleft`, which
//! reverses pop order back to chronological; popping in order with
//! `Vec::push` lands in the same chronological order directly, so no reversal
//! step is needed here.

use memos_core::{ChatMessage, ChatOptions, InferenceFormat, MessageKind, MessageRecord};

use crate::error::StepError;
use crate::Agent;

/// Renders a sequence of popped FIFO records the same way
/// [`memos_memory::Memory::main_ctx_message_seq`] renders the live queue:
/// consecutive non-assistant records folded into one `user`-role turn,
/// assistant records passed through verbatim.
pub fn summary_prompt_messages(records: &[MessageRecord]) -> Vec<ChatMessage> {
    let mut sequence = Vec::new();
    let mut buffered: Vec<String> = Vec::new();

    for record in records {
        if record.kind == MessageKind::Assistant {
            flush(&mut sequence, &mut buffered);
            sequence.push(ChatMessage::assistant(record.content.clone()));
        } else {
            buffered.push(record.sentinel_text());
        }
    }
    flush(&mut sequence, &mut buffered);
    sequence
}

fn flush(sequence: &mut Vec<ChatMessage>, buffered: &mut Vec<String>) {
    if !buffered.is_empty() {
        sequence.push(ChatMessage::user(buffered.join("\n\n")));
        buffered.clear();
    }
}

impl Agent {
    /// Fraction of the model's context window the current rendering of
    /// working context + FIFO queue occupies.
    pub fn current_token_pressure(&self) -> Result<f64, StepError> {
        let counter = self.tokenizer_registry.counter(&self.settings.host.model_name)?;
        let tokens = self.memory.main_ctx_message_seq_no_tokens(
            &self.settings.prompts.system_instructions,
            &self.in_context_schemas(),
            &counter,
        )?;
        Ok(tokens as f64 / counter.context_window() as f64)
    }

    /// Summarizes and truncates the FIFO queue if token pressure has reached
    /// the flush threshold, returning the note record spliced in if so.
    pub async fn maybe_summarize(&mut self) -> Result<Option<MessageRecord>, StepError> {
        if self.current_token_pressure()? >= self.settings.memory.flush_token_frac {
            Ok(Some(self.summarize().await?))
        } else {
            Ok(None)
        }
    }

    /// Pops the oldest FIFO records down towards `truncation_token_frac` of
    /// the context window (never below `keep_last_n_messages`), asks the
    /// model to summarize what was popped, and pushes a system note carrying
    /// that summary back onto the front of the queue.
    pub async fn summarize(&mut self) -> Result<MessageRecord, StepError> {
        let counter = self.tokenizer_registry.counter(&self.settings.host.model_name)?;
        let target_tokens =
            (counter.context_window() as f64 * self.settings.memory.truncation_token_frac) as usize;
        let keep_last_n = self.settings.memory.keep_last_n_messages as u64;

        let mut to_summarize: Vec<MessageRecord> = Vec::new();
        while self.memory.fifo.no_messages_in_queue() > keep_last_n {
            let current_tokens = self.memory.main_ctx_message_seq_no_tokens(
                &self.settings.prompts.system_instructions,
                &self.in_context_schemas(),
                &counter,
            )?;
            if current_tokens <= target_tokens {
                break;
            }
            match self.memory.fifo.pop_front() {
                Some(record) => to_summarize.push(record),
                None => break,
            }
        }

        // Boundary adjustment: restore popped records, inclusive of the
        // earliest user-kind one, while there is still slack under the
        // warning threshold — this keeps the summarized batch from cutting a
        // conversational exchange in half. Checked against the live FIFO
        // head after each restoration, not the candidate about to be
        // restored, so the user message itself gets pulled back in.
        let warn_target =
            (counter.context_window() as f64 * self.settings.memory.warning_token_frac) as usize;
        loop {
            if self.memory.fifo.records().front().map(|r| r.kind) == Some(MessageKind::User) {
                break;
            }
            let Some(_) = to_summarize.last() else { break };
            let current_tokens = self.memory.main_ctx_message_seq_no_tokens(
                &self.settings.prompts.system_instructions,
                &self.in_context_schemas(),
                &counter,
            )?;
            if current_tokens >= warn_target {
                break;
            }
            let record = to_summarize.pop().expect("just checked via .last()");
            self.memory.fifo.push_front(record);
        }

        let summary_text = if to_summarize.is_empty() {
            "(nothing to summarize)".to_string()
        } else {
            let mut messages = vec![ChatMessage::system(memos_config::summarize_system_prompt(
                memos_config::constants::memory::SUMMARY_WORD_LIMIT,
            ))];
            messages.extend(summary_prompt_messages(&to_summarize));
            let response = self
                .llm
                .chat(
                    &self.settings.host.model_name,
                    &messages,
                    ChatOptions::default(),
                    InferenceFormat::Unconstrained,
                )
                .await?;
            response.message.content
        };

        let note = MessageRecord::system(
            format!(
                "Note: the previous {} messages between you and the user were summarized as follows: {summary_text}",
                to_summarize.len(),
            ),
            self.conversation_user_id,
        );
        self.memory.fifo.push_front(note.clone());
        Ok(note)
    }
}
