pub mod openai;

#[derive(Debug, Clone)]
pub enum LLMUserMessage {
    Text(String),
    /// `data:` URL or remote URL of an image.
    ImageUrl(String),
}

#[derive(Debug, Clone)]
pub enum LLMMessage {
    System(String),
    User(Vec<LLMUserMessage>),
    Assistant(String),
}

#[derive(Debug, Clone)]
pub struct LLMInferenceParams {
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl Default for LLMInferenceParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: None,
            max_tokens: Some(2048),
        }
    }
}
