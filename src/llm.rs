use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("language model unavailable: {message}")]
    Unavailable { message: String },
    #[error("language model generation failed: {message}")]
    Generation { message: String },
}

impl LlmError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "llm_unavailable",
            Self::Generation { .. } => "llm_generation_error",
        }
    }
}

/// Opaque local-model runtime. The controller only ever sees this
/// contract; tests substitute deterministic stubs.
pub trait LanguageModel: Send + Sync {
    fn generate(
        &self,
        prompt: &str,
        stop_tokens: &[String],
        max_tokens: usize,
    ) -> Result<String, LlmError>;

    fn available(&self) -> bool {
        true
    }
}

/// Deterministic stub: replays queued responses in order, then falls
/// back to a fixed default.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    fallback: String,
}

impl ScriptedModel {
    pub fn new(fallback: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
        }
    }

    pub fn with_responses(responses: Vec<String>, fallback: &str) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: fallback.to_string(),
        }
    }
}

impl LanguageModel for ScriptedModel {
    fn generate(
        &self,
        _prompt: &str,
        _stop_tokens: &[String],
        _max_tokens: usize,
    ) -> Result<String, LlmError> {
        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        Ok(responses.pop_front().unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Stub for exercising the controller's failure branch.
pub struct UnavailableModel;

impl LanguageModel for UnavailableModel {
    fn generate(
        &self,
        _prompt: &str,
        _stop_tokens: &[String],
        _max_tokens: usize,
    ) -> Result<String, LlmError> {
        Err(LlmError::Unavailable {
            message: "no local model loaded".to_string(),
        })
    }

    fn available(&self) -> bool {
        false
    }
}
