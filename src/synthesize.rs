//! Answer generation from retrieved context.

use std::sync::Arc;

use crate::error::Result;
use crate::llm::ChatModel;
use crate::models::{ChatMessage, Chunk, ModelName};
use crate::prompt::ANSWER;

pub struct Synthesizer {
    llm: Arc<dyn ChatModel>,
}

/// Chunk texts separated by a blank line, in rank order.
pub fn format_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }

    /// Ask `model` to answer `question` from `chunks`, given prior turns.
    ///
    /// `question` is the caller's original wording, not the rewritten one.
    /// The model's text is returned untouched.
    pub async fn synthesize(
        &self,
        question: &str,
        chunks: &[Chunk],
        history: &[ChatMessage],
        model: ModelName,
    ) -> Result<String> {
        let context = format_context(chunks);
        let request = ANSWER.render(&[("context", context.as_str()), ("input", question)], history)?;
        self.llm.complete(model, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ANSWER_SYSTEM;
    use crate::test_support::{chunk, ScriptedChat};

    #[tokio::test]
    async fn context_history_and_question_reach_the_model() {
        let llm = Arc::new(ScriptedChat::replying(" Raw answer \n"));
        let synth = Synthesizer::new(llm.clone());
        let history = vec![ChatMessage::user("q0"), ChatMessage::assistant("a0")];
        let chunks = vec![chunk(1, 0, "first chunk"), chunk(2, 0, "second chunk")];

        let answer = synth
            .synthesize("what now?", &chunks, &history, ModelName::Gpt41Mini)
            .await
            .unwrap();
        assert_eq!(answer, " Raw answer \n");

        let (model, request) = llm.requests().remove(0);
        assert_eq!(model, ModelName::Gpt41Mini);
        assert_eq!(
            request.system_prompt,
            format!("{}\n\nContext: first chunk\n\nsecond chunk", ANSWER_SYSTEM)
        );
        assert_eq!(request.history, history);
        assert_eq!(request.user_message, "what now?");
    }

    #[tokio::test]
    async fn no_chunks_means_empty_context() {
        let llm = Arc::new(ScriptedChat::replying("I don't know."));
        let synth = Synthesizer::new(llm.clone());
        synth
            .synthesize("q", &[], &[], ModelName::Gpt4oMini)
            .await
            .unwrap();
        let (_, request) = llm.requests().remove(0);
        assert!(request.system_prompt.ends_with("Context: "));
    }
}
