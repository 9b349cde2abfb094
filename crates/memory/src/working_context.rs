//! Editable small memory blocks: agent persona plus a human-id -> persona
//! map, each under its own token ceiling, with an MRU of the two most
//! recently used human ids (generalized from the single-persona prototype
//! in `original_source/llm_os/memory/working_context.py` — the multi-human
//! `HashMap<i64, String>` shape is what `spec.md` and the function-set call
//! sites like `add_new_human_persona` actually require).

use std::collections::HashMap;

use memos_core::MemoryError;
use memos_tokenizer::TokenCounter;
use serde::{Deserialize, Serialize};

/// Serialized shape of `working_context.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingContextState {
    pub persona: String,
    pub humans: HashMap<i64, String>,
    pub last_2_human_ids: Vec<i64>,
}

impl Default for WorkingContextState {
    fn default() -> Self {
        Self {
            persona: String::new(),
            humans: HashMap::new(),
            last_2_human_ids: Vec::new(),
        }
    }
}

/// A section an edit targets: the persona block, or a specific human's
/// block by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Persona,
    Human(i64),
}

impl Section {
    /// Parses `"persona"` or a bare integer human id, matching the string
    /// section names `edit_append`/`edit_replace` accept from tool calls.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == "persona" {
            Some(Section::Persona)
        } else {
            raw.parse::<i64>().ok().map(Section::Human)
        }
    }

    fn label(self) -> String {
        match self {
            Section::Persona => "persona".to_string(),
            Section::Human(id) => id.to_string(),
        }
    }
}

pub struct WorkingContext {
    state: WorkingContextState,
    persona_max_tokens: usize,
    human_max_tokens: usize,
}

impl WorkingContext {
    pub fn new(state: WorkingContextState, persona_max_tokens: usize, human_max_tokens: usize) -> Self {
        Self {
            state,
            persona_max_tokens,
            human_max_tokens,
        }
    }

    pub fn state(&self) -> &WorkingContextState {
        &self.state
    }

    pub fn persona(&self) -> &str {
        &self.state.persona
    }

    pub fn human(&self, id: i64) -> Option<&str> {
        self.state.humans.get(&id).map(String::as_str)
    }

    pub fn last_2_human_ids(&self) -> &[i64] {
        &self.state.last_2_human_ids
    }

    /// Replaces the persona block wholesale. Fails without mutating state if
    /// `new_text` exceeds `persona_max_tokens`.
    pub fn edit_persona(
        &mut self,
        new_text: &str,
        counter: &dyn TokenCounter,
    ) -> Result<(), MemoryError> {
        self.check_budget("persona", new_text, self.persona_max_tokens, counter)?;
        self.state.persona = new_text.to_string();
        Ok(())
    }

    /// Replaces a human's block wholesale. Fails without mutating state if
    /// `new_text` exceeds `human_max_tokens`, or if `id` has no persona yet.
    pub fn edit_human(
        &mut self,
        id: i64,
        new_text: &str,
        counter: &dyn TokenCounter,
    ) -> Result<(), MemoryError> {
        if !self.state.humans.contains_key(&id) {
            return Err(MemoryError::UnknownHuman(id));
        }
        self.check_budget(&id.to_string(), new_text, self.human_max_tokens, counter)?;
        self.state.humans.insert(id, new_text.to_string());
        Ok(())
    }

    /// Appends `content` to the named section's current text and writes it
    /// back through the matching `edit_*`.
    pub fn edit_append(
        &mut self,
        section: Section,
        content: &str,
        counter: &dyn TokenCounter,
    ) -> Result<(), MemoryError> {
        match section {
            Section::Persona => {
                let appended = format!("{}\n{}", self.state.persona, content);
                self.edit_persona(&appended, counter)
            }
            Section::Human(id) => {
                let current = self
                    .state
                    .humans
                    .get(&id)
                    .ok_or(MemoryError::UnknownHuman(id))?;
                let appended = format!("{current}\n{content}");
                self.edit_human(id, &appended, counter)
            }
        }
    }

    /// Replaces the first occurrence of `old` with `new` in the named
    /// section's current text, then writes it back through the matching
    /// `edit_*`.
    pub fn edit_replace(
        &mut self,
        section: Section,
        old: &str,
        new: &str,
        counter: &dyn TokenCounter,
    ) -> Result<(), MemoryError> {
        if old.is_empty() {
            return Err(MemoryError::EmptyOldContent);
        }

        let current = match section {
            Section::Persona => self.state.persona.clone(),
            Section::Human(id) => self
                .state
                .humans
                .get(&id)
                .ok_or(MemoryError::UnknownHuman(id))?
                .clone(),
        };

        if !current.contains(old) {
            return Err(MemoryError::ContentNotFound {
                section: section.label(),
                old: old.to_string(),
            });
        }

        let replaced = current.replacen(old, new, 1);
        match section {
            Section::Persona => self.edit_persona(&replaced, counter),
            Section::Human(id) => self.edit_human(id, &replaced, counter),
        }
    }

    /// Inserts a brand-new human persona. Fails if `id` already has one.
    pub fn add_new_human_persona(
        &mut self,
        id: i64,
        text: &str,
        counter: &dyn TokenCounter,
    ) -> Result<(), MemoryError> {
        if self.state.humans.contains_key(&id) {
            return Err(MemoryError::HumanAlreadyExists(id));
        }
        self.check_budget(&id.to_string(), text, self.human_max_tokens, counter)?;
        self.state.humans.insert(id, text.to_string());
        Ok(())
    }

    /// Moves `id` to the tail of the MRU, trimming to the two most recent.
    /// Called at the start of every agent step so the rendered prompt always
    /// shows the relevant human block.
    pub fn submit_used_human_id(&mut self, id: i64) {
        self.state.last_2_human_ids.retain(|existing| *existing != id);
        self.state.last_2_human_ids.push(id);
        if self.state.last_2_human_ids.len() > 2 {
            let drop = self.state.last_2_human_ids.len() - 2;
            self.state.last_2_human_ids.drain(0..drop);
        }
    }

    /// Renders `<persona>...</persona>` followed by `<human id="i">...</human>`
    /// for each id currently in the MRU, in MRU order.
    pub fn render(&self) -> String {
        let mut out = format!("<persona>{}</persona>", self.state.persona);
        for id in &self.state.last_2_human_ids {
            if let Some(text) = self.state.humans.get(id) {
                out.push('\n');
                out.push_str(&format!("<human id=\"{id}\">{text}</human>"));
            }
        }
        out
    }

    fn check_budget(
        &self,
        section: &str,
        text: &str,
        max_tokens: usize,
        counter: &dyn TokenCounter,
    ) -> Result<(), MemoryError> {
        let tokens = counter
            .count_str(text)
            .map_err(|e| MemoryError::Persistence(e.to_string()))?;
        if tokens > max_tokens {
            return Err(MemoryError::OversizeBlock {
                section: section.to_string(),
                tokens,
                max: max_tokens,
            });
        }
        Ok(())
    }
}
