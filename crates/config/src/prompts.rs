//! Default persona/system prompt text.
//!
//! These are starting points, not hardcoded behavior: [`crate::settings::Settings`]
//! lets an operator override `system_instructions` and the default persona
//! from the config file, the same way the rest of the runtime's knobs are
//! overridden.

use serde::{Deserialize, Serialize};

/// Baseline prompt material shipped with the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefaults {
    #[serde(default = "PromptDefaults::default_system_instructions")]
    pub system_instructions: String,
    #[serde(default = "PromptDefaults::default_persona")]
    pub persona: String,
}

impl Default for PromptDefaults {
    fn default() -> Self {
        Self {
            system_instructions: Self::default_system_instructions(),
            persona: Self::default_persona(),
        }
    }
}

impl PromptDefaults {
    fn default_system_instructions() -> String {
        concat!(
            "You are a memory-augmented conversational agent. You have a small amount of ",
            "always-visible core memory (this system message plus a persona block and a ",
            "block per human you are talking to) and two much larger external stores: a ",
            "recall log of every message ever exchanged, and an archival store of longer-term ",
            "notes you choose to save. Use core_memory_append/core_memory_replace to keep the ",
            "persona and human blocks accurate as you learn things; use conversation_search and ",
            "archival_memory_search to recall things that have scrolled out of view. Every reply ",
            "must be a single JSON object with your thoughts, emotions, and exactly one function ",
            "call; set request_heartbeat on that call if you want to act again before the human ",
            "replies."
        )
        .to_string()
    }

    fn default_persona() -> String {
        "I am a helpful assistant with a long memory. I pay attention to what people tell me \
         about themselves and keep it in my core memory so I don't have to ask twice."
            .to_string()
    }
}

/// System prompt for the summarization call the agent makes when the FIFO
/// queue is flushed. Grounded on
/// `original_source/llm_os/prompts/llm_os_summarize.py`'s `SYSTEM` template,
/// with the word-limit placeholder substituted at call time rather than kept
/// as a module-level format string.
pub fn summarize_system_prompt(word_limit: usize) -> String {
    format!(
        "\nYour job is to summarize a history of previous messages in a conversation between an AI persona and a human.\nThe conversation you are given is a from a fixed context window and may not be complete.\nMessages sent by the AI are marked with the 'assistant' role.\nThe AI 'assistant' can also make calls to functions starting with '\u{276e}TOOL CALL\u{276f}', whose outputs can be seen in messages with the 'user' role starting with '\u{276e}TOOL MESSAGE\u{276f}'.\nThings the AI says starting with '\u{276e}ASSISTANT MESSAGE\u{276f}' are considered inner monologue and are not seen by the user.\nThe only AI messages seen by the user are from when the AI uses 'send_message'.\nMessages the user sends are in the 'user' role starting with '\u{276e}USER MESSAGE\u{276f}'.\nThe 'user' role is also used for important system events and messages, such as login events, heartbeat events (heartbeats run the AI's program without user action, allowing the AI to act without prompting from the user sending them a message), memory pressure warnings, and error messages. Such events start with '\u{276e}SYSTEM MESSAGE\u{276f}'.\nSummarize what happened in the conversation from the perspective of the AI (use the first person).\nKeep your summary less than {word_limit} words, do NOT exceed this word limit.\nOnly output the summary, do NOT include anything else in your output.\n"
    )
}

#[cfg(test)]
mod summarize_prompt_tests {
    use super::summarize_system_prompt;

    #[test]
    fn substitutes_the_word_limit() {
        let prompt = summarize_system_prompt(100);
        assert!(prompt.contains("less than 100 words"));
    }
}
