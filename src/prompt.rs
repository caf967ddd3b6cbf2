//! Prompt templates.
//!
//! A [`PromptTemplate`] is an immutable, ordered list of parts: system
//! text, the conversation history slot, and the human turn. Text parts may
//! contain `{name}` placeholders which are filled in a single pass, so a
//! substituted value is never scanned for further placeholders.

use crate::error::{RagError, Result};
use crate::llm::CompletionRequest;
use crate::models::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptPart {
    System(&'static str),
    /// Where prior conversation turns are inserted.
    History,
    Human(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    parts: &'static [PromptPart],
}

pub const CONTEXTUALIZE_SYSTEM: &str = "Given a chat history and the latest user question \
which might reference context in the chat history, formulate a standalone question which can \
be understood without the chat history. Do NOT answer the question, just reformulate it if \
needed and otherwise return it as is.";

pub const ANSWER_SYSTEM: &str =
    "You are a helpful assistant that answers questions based on the provided context.";

/// Rewrites a follow-up question into a standalone one.
pub const CONTEXTUALIZE: PromptTemplate = PromptTemplate::new(&[
    PromptPart::System(CONTEXTUALIZE_SYSTEM),
    PromptPart::History,
    PromptPart::Human("{input}"),
]);

/// Answers a question from retrieved context.
pub const ANSWER: PromptTemplate = PromptTemplate::new(&[
    PromptPart::System(ANSWER_SYSTEM),
    PromptPart::System("Context: {context}"),
    PromptPart::History,
    PromptPart::Human("{input}"),
]);

impl PromptTemplate {
    pub const fn new(parts: &'static [PromptPart]) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &'static [PromptPart] {
        self.parts
    }

    /// Fill placeholders from `vars` and lay the result out as one model call.
    ///
    /// System parts are joined with a blank line. Every placeholder must
    /// have a value in `vars`.
    pub fn render(
        &self,
        vars: &[(&str, &str)],
        history: &[ChatMessage],
    ) -> Result<CompletionRequest> {
        let mut system = Vec::new();
        let mut human = Vec::new();
        let mut with_history = false;

        for part in self.parts {
            match part {
                PromptPart::System(text) => system.push(fill(text, vars)?),
                PromptPart::History => with_history = true,
                PromptPart::Human(text) => human.push(fill(text, vars)?),
            }
        }

        Ok(CompletionRequest {
            system_prompt: system.join("\n\n"),
            history: if with_history {
                history.to_vec()
            } else {
                Vec::new()
            },
            user_message: human.join("\n\n"),
        })
    }
}

fn fill(template: &str, vars: &[(&str, &str)]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_placeholder_name(&after[..close]) => {
                let name = &after[..close];
                let value = vars
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| *value)
                    .ok_or_else(|| {
                        RagError::Config(format!("prompt variable {{{}}} not provided", name))
                    })?;
                out.push_str(value);
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    Ok(out)
}

fn is_placeholder_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
