//! Per-family chat template rendering.
//!
//! The `tokenizers` crate only tokenizes strings; applying a chat template
//! (turning a `Vec<ChatMessage>` into the exact string a model was trained
//! on) is ordinarily the HF `transformers` Python library's job. Since this
//! is a systems-language port we hand-write the handful of templates the
//! original's supported model list actually needs.

use memos_core::{ChatMessage, Role};

/// Mistral's template has no system-role slot: a leading system message must
/// be folded into the following user message before rendering. Ported
/// verbatim from `original_source/llm_os/tokenisers.py::mistral_format_system`.
///
/// Panics-free: returns the conversation unchanged if it doesn't start with
/// a system message, and errors (rather than the original's raised
/// `ValueError`) if the message after a leading system message isn't a user
/// message.
pub fn fold_leading_system_into_user(
    messages: &[ChatMessage],
) -> Result<Vec<ChatMessage>, String> {
    let Some(first) = messages.first() else {
        return Ok(Vec::new());
    };
    if first.role != Role::System {
        return Ok(messages.to_vec());
    }

    match messages.get(1) {
        None => Ok(vec![ChatMessage {
            role: Role::User,
            content: first.content.clone(),
        }]),
        Some(second) if second.role != Role::User => Err(
            "first message after a system message must be a user message".to_string(),
        ),
        Some(second) => {
            let mut folded = vec![ChatMessage {
                role: Role::User,
                content: format!("{} {}", first.content, second.content),
            }];
            folded.extend_from_slice(&messages[2..]);
            Ok(folded)
        }
    }
}

/// Llama 3's instruct chat template:
/// `<|begin_of_text|><|start_header_id|>role<|end_header_id|>\n\ncontent<|eot_id|>...`
pub fn render_llama3(messages: &[ChatMessage]) -> String {
    let mut out = String::from("<|begin_of_text|>");
    for message in messages {
        let role = role_str(message.role);
        out.push_str(&format!(
            "<|start_header_id|>{role}<|end_header_id|>\n\n{}<|eot_id|>",
            message.content
        ));
    }
    out.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
    out
}

/// ChatML, used by OpenHermes: `<|im_start|>role\ncontent<|im_end|>`.
pub fn render_chatml(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        let role = role_str(message.role);
        out.push_str(&format!("<|im_start|>{role}\n{}<|im_end|>\n", message.content));
    }
    out.push_str("<|im_start|>assistant\n");
    out
}

/// Mistral's instruct template: `<s>[INST] user [/INST] assistant</s>[INST] ...`.
/// Callers must run [`fold_leading_system_into_user`] first.
pub fn render_mistral(messages: &[ChatMessage]) -> String {
    let mut out = String::from("<s>");
    for message in messages {
        match message.role {
            Role::User => out.push_str(&format!("[INST] {} [/INST]", message.content)),
            Role::Assistant => out.push_str(&format!("{}</s>", message.content)),
            Role::System => out.push_str(&format!("[INST] {} [/INST]", message.content)),
        }
    }
    out
}

/// A plain `role: content` join, used for unrecognized/"Generic" families.
pub fn render_generic(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", role_str(m.role), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_leading_system_into_following_user_message() {
        let messages = vec![
            ChatMessage::system("be terse"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ];
        let folded = fold_leading_system_into_user(&messages).unwrap();
        assert_eq!(folded.len(), 2);
        assert_eq!(folded[0].role, Role::User);
        assert_eq!(folded[0].content, "be terse hi");
    }

    #[test]
    fn leaves_non_system_leading_message_unchanged() {
        let messages = vec![ChatMessage::user("hi")];
        let folded = fold_leading_system_into_user(&messages).unwrap();
        assert_eq!(folded.len(), 1);
        assert_eq!(folded[0].content, "hi");
    }

    #[test]
    fn errors_when_second_message_is_not_user() {
        let messages = vec![ChatMessage::system("a"), ChatMessage::assistant("b")];
        assert!(fold_leading_system_into_user(&messages).is_err());
    }

    #[test]
    fn llama3_template_wraps_every_turn() {
        let rendered = render_llama3(&[ChatMessage::user("hi")]);
        assert!(rendered.contains("<|start_header_id|>user<|end_header_id|>"));
        assert!(rendered.ends_with("<|start_header_id|>assistant<|end_header_id|>\n\n"));
    }
}
