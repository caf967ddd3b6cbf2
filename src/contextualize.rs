//! History-aware question rewriting.

use std::sync::Arc;

use crate::error::Result;
use crate::llm::ChatModel;
use crate::models::{ChatMessage, ModelName};
use crate::prompt::CONTEXTUALIZE;

/// Turns a follow-up question into one that stands on its own.
pub struct Contextualizer {
    llm: Arc<dyn ChatModel>,
}

impl Contextualizer {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }

    /// Rewrite `question` against `history` (oldest first).
    ///
    /// With no history there is nothing to resolve, and the question is
    /// returned as is without a model call. A blank model reply also falls
    /// back to the original question.
    pub async fn contextualize(
        &self,
        question: &str,
        history: &[ChatMessage],
        model: ModelName,
    ) -> Result<String> {
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let request = CONTEXTUALIZE.render(&[("input", question)], history)?;
        let reply = self.llm.complete(model, &request).await?;
        let standalone = reply.trim();

        if standalone.is_empty() {
            tracing::warn!("contextualizer returned an empty question, keeping the original");
            return Ok(question.to_string());
        }
        Ok(standalone.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::CONTEXTUALIZE_SYSTEM;
    use crate::test_support::ScriptedChat;

    #[tokio::test]
    async fn empty_history_skips_the_model() {
        let llm = Arc::new(ScriptedChat::replying("should not be used"));
        let ctx = Contextualizer::new(llm.clone());
        let out = ctx
            .contextualize("What is WAL?", &[], ModelName::Gpt4oMini)
            .await
            .unwrap();
        assert_eq!(out, "What is WAL?");
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn rewrites_with_history() {
        let llm = Arc::new(ScriptedChat::replying("  What does SQLite WAL mode do?\n"));
        let ctx = Contextualizer::new(llm.clone());
        let history = vec![
            ChatMessage::user("Tell me about SQLite"),
            ChatMessage::assistant("SQLite is an embedded database."),
        ];
        let out = ctx
            .contextualize("What does its WAL mode do?", &history, ModelName::Gpt4o)
            .await
            .unwrap();
        assert_eq!(out, "What does SQLite WAL mode do?");

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        let (model, request) = &requests[0];
        assert_eq!(*model, ModelName::Gpt4o);
        assert_eq!(request.system_prompt, CONTEXTUALIZE_SYSTEM);
        assert_eq!(request.history, history);
        assert_eq!(request.user_message, "What does its WAL mode do?");
    }

    #[tokio::test]
    async fn blank_reply_keeps_original() {
        let llm = Arc::new(ScriptedChat::replying("   "));
        let ctx = Contextualizer::new(llm);
        let history = vec![ChatMessage::user("a"), ChatMessage::assistant("b")];
        let out = ctx
            .contextualize("and then?", &history, ModelName::Gpt4oMini)
            .await
            .unwrap();
        assert_eq!(out, "and then?");
    }
}
