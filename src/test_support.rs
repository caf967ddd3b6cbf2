//! Deterministic stand-ins for the model providers.
//!
//! Compiled for this crate's unit tests and, with the `test-support`
//! feature, for the integration suites under `tests/`.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::llm::{ChatModel, CompletionRequest};
use crate::models::{Chunk, ModelName};

pub const KEYWORD_DIMS: usize = 64;

pub fn chunk(document_id: i64, chunk_index: i64, text: &str) -> Chunk {
    Chunk {
        text: text.to_string(),
        source_document_id: document_id,
        source_filename: format!("doc{}.html", document_id),
        chunk_index,
        start_index: chunk_index * 100,
    }
}

/// Bag-of-words embedder: each lowercase word bumps one of 64 buckets.
pub struct KeywordEmbedder {
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
    failing: AtomicBool,
    declared_dims: usize,
}

impl Default for KeywordEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on_call: None,
            failing: AtomicBool::new(false),
            declared_dims: KEYWORD_DIMS,
        }
    }

    /// Fail the `n`th call (1-based) and every call after it.
    pub fn failing_on_call(n: usize) -> Self {
        Self {
            fail_on_call: Some(n),
            ..Self::new()
        }
    }

    pub fn with_declared_dims(dims: usize) -> Self {
        Self {
            declared_dims: dims,
            ..Self::new()
        }
    }

    /// Switch a simulated provider outage on or off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; KEYWORD_DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
        v[bucket % KEYWORD_DIMS] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword"
    }
    fn dims(&self) -> usize {
        self.declared_dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.load(Ordering::SeqCst) || self.fail_on_call.is_some_and(|n| call >= n) {
            return Err(RagError::provider("keyword", "scripted failure", true));
        }
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

type Reply = Box<dyn Fn(&CompletionRequest) -> Result<String> + Send + Sync>;

/// Chat model that answers with a closure and records every request.
pub struct ScriptedChat {
    reply: Reply,
    requests: Mutex<Vec<(ModelName, CompletionRequest)>>,
}

impl ScriptedChat {
    pub fn new(reply: impl Fn(&CompletionRequest) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            reply: Box::new(reply),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &'static str) -> Self {
        Self::new(move |_| Ok(text.to_string()))
    }

    /// Replies `answer to: <final user message>`.
    pub fn echo() -> Self {
        Self::new(|req| Ok(format!("answer to: {}", req.user_message)))
    }

    pub fn requests(&self) -> Vec<(ModelName, CompletionRequest)> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, model: ModelName, request: &CompletionRequest) -> Result<String> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((model, request.clone()));
        (self.reply)(request)
    }
}
