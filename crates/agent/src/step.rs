//! The one-iteration agent step: render the prompt, call the model, validate
//! its reply, dispatch the function call, and update memory-pressure flags.
//!
//! Ported from `original_source/llm_os/agent.py`'s `Agent.step`. The caller is
//! responsible for appending the triggering record (a user message or a
//! heartbeat sentinel) to memory before calling [`Agent::step`], and for
//! deciding `is_first_message` (whether this conversation has no prior
//! history at all) — both are conversation-lifecycle decisions that belong to
//! `memos-runtime`, not to a single step.

use memos_config::InferenceStrictness;
use memos_core::{AgentInterface, ChatOptions, InferenceFormat, MessageRecord, ProtocolError};
use memos_functions::ToolExecCtx;

use crate::dispatch::call_function;
use crate::error::StepError;
use crate::response::{
    parse_rejecting_duplicates, response_json_schema, validate_emotions, validate_thoughts,
    validate_top_level, TopLevelOutcome,
};
use crate::Agent;

/// What one step produced: whether the loop should run again before waiting
/// on the human, and whether the model's function call failed validation or
/// execution (the caller may want to surface that differently than a plain
/// heartbeat).
pub struct StepOutcome {
    pub heartbeat: bool,
    pub function_failed: bool,
}

impl Agent {
    pub(crate) fn in_context_schemas(&self) -> serde_json::Value {
        serde_json::Value::Array(self.registry.in_context_schemas())
    }

    fn response_format(&self) -> InferenceFormat {
        match self.settings.inference_strictness {
            InferenceStrictness::Unconstrained => InferenceFormat::Unconstrained,
            InferenceStrictness::Json => InferenceFormat::Json,
            InferenceStrictness::Structured => InferenceFormat::Schema(response_json_schema()),
        }
    }

    /// Runs one step: summarize if memory pressure already demands it, call
    /// the model, then validate and dispatch its reply.
    pub async fn step(&mut self, user_id: i64, is_first_message: bool) -> Result<StepOutcome, StepError> {
        self.memory.working_context.submit_used_human_id(user_id);

        if let Some(note) = self.maybe_summarize().await? {
            self.interface.memory_message(&note.content);
        }

        let counter = self.tokenizer_registry.counter(&self.settings.host.model_name)?;
        let messages = self
            .memory
            .main_ctx_message_seq(&self.settings.prompts.system_instructions, &self.in_context_schemas());
        let options = ChatOptions {
            num_ctx: counter.context_window(),
            ..ChatOptions::default()
        };
        let format = self.response_format();

        let response = self
            .llm
            .chat(&self.settings.host.model_name, &messages, options, format)
            .await?;

        self.process_response(&response.message.content, user_id, is_first_message).await
    }

    async fn process_response(
        &mut self,
        raw: &str,
        user_id: i64,
        is_first_message: bool,
    ) -> Result<StepOutcome, StepError> {
        let parsed = match parse_rejecting_duplicates(raw) {
            Ok(value) => value,
            Err(err) => return Ok(self.reject(err)),
        };

        let parsed = match validate_top_level(&parsed)? {
            TopLevelOutcome::Ok(parsed) => parsed,
            TopLevelOutcome::UnexpectedKeys(keys) => {
                return Ok(self.reject(ProtocolError::UnexpectedKey(keys.join(", "))));
            }
            TopLevelOutcome::MissingRequired(keys) => {
                return Ok(self.reject(ProtocolError::MissingKey(keys.join(", "))));
            }
        };

        if let Err(msg) = validate_emotions(&parsed.emotions, self.interface.as_ref()) {
            return Ok(self.reject(ProtocolError::InvalidEmotions(msg)));
        }
        if let Err(msg) = validate_thoughts(&parsed.thoughts, self.interface.as_ref()) {
            return Ok(self.reject(ProtocolError::InvalidThoughts(msg)));
        }

        self.memory
            .append(MessageRecord::assistant(raw.to_string(), self.conversation_user_id));

        let flags_snapshot = self.misc_flags.state();
        let embedding_model_name = self.settings.host.embedding_model_name.clone();
        let page_size = self.settings.retrieval.default_page_size;
        let counter = self.tokenizer_registry.counter(&self.settings.host.model_name)?;
        let embedding_tokenizer = self.tokenizer_registry.raw_tokenizer(&embedding_model_name)?;

        let mut outcome = {
            let mut ctx = ToolExecCtx {
                memory: &mut self.memory,
                interface: self.interface.as_ref(),
                user_id,
                token_counter: &counter,
                embedder: self.embedder.as_ref(),
                embedding_model_name: &embedding_model_name,
                embedding_tokenizer,
                page_size,
            };
            call_function(
                &parsed.function_call,
                &self.registry,
                &mut ctx,
                self.conversation_user_id,
                is_first_message,
                flags_snapshot,
            )
            .await
        };

        for record in outcome.records.drain(..) {
            self.memory.append(record);
        }

        if outcome.memory_edited {
            self.misc_flags.set_memory_write_function_forced(false)?;
            self.misc_flags.set_conscious_memory_write_alr_forced(false)?;
            self.misc_flags.set_messages_since_last_conscious_memory_write(0)?;
        } else {
            self.misc_flags.increment_messages_since_last_conscious_memory_write()?;
        }

        let mut heartbeat = outcome.heartbeat;

        // First-message replies are restricted to a narrow function set that
        // doesn't include the memory-editing tools these checks would force,
        // so they sit out a turn.
        if !is_first_message {
            let pressure = self.current_token_pressure()?;
            let mut warned_this_step = false;

            if pressure >= self.settings.memory.warning_token_frac {
                if !self.misc_flags.memory_pressure_warning_alr_given() {
                    self.interface
                        .warning_message("Memory pressure is high. Please consider writing what's important to core memory before it's lost.");
                    self.misc_flags.set_memory_pressure_warning_alr_given(true)?;
                    self.misc_flags.set_memory_write_function_forced(true)?;
                    heartbeat = true;
                    warned_this_step = true;
                }
            } else {
                self.misc_flags.set_memory_pressure_warning_alr_given(false)?;
            }

            if pressure >= self.settings.memory.flush_token_frac {
                let note = self.summarize().await?;
                self.interface.memory_message(&note.content);
            }

            if !self.misc_flags.conscious_memory_write_alr_forced()
                && !warned_this_step
                && self.misc_flags.messages_since_last_conscious_memory_write()
                    >= self.settings.memory.forced_memory_write_after_messages as i64
            {
                self.interface
                    .system_message("You haven't written anything to core memory in a while. Please do so soon.");
                self.misc_flags.set_conscious_memory_write_alr_forced(true)?;
                self.misc_flags.set_memory_write_function_forced(true)?;
                heartbeat = true;
            }
        }

        Ok(StepOutcome { heartbeat, function_failed: outcome.function_failed })
    }

    fn reject(&mut self, err: ProtocolError) -> StepOutcome {
        let message = format!("Status: Failed. Result: {err}");
        self.interface.system_message(&message);
        self.memory
            .append(MessageRecord::system(message, self.conversation_user_id));
        StepOutcome { heartbeat: true, function_failed: true }
    }
}
