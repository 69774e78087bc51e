pub mod media;
pub mod openai;
pub mod replicate;

use async_trait::async_trait;

pub use openai::OpenAiClient;
pub use replicate::ReplicateClient;

/// One single-turn chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    /// Label used in timing logs.
    pub operation: String,
    pub text: String,
    pub images: Vec<Vec<u8>>,
    pub max_tokens: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat completion timed out after {0}s")]
    Timeout(u64),
    #[error("chat completion request failed: {0}")]
    Transport(String),
    #[error("chat completion failed with status {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("chat completion response could not be decoded: {0}")]
    Decode(String),
    #[error("chat completion returned no content")]
    EmptyResponse,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ChatError>;
}

/// Parameters of one text-to-image generation.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub aspect_ratio: String,
    pub steps: u32,
    pub seed: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("image synthesis timed out after {0}s")]
    Timeout(u64),
    #[error("image synthesis request failed: {0}")]
    Transport(String),
    #[error("image synthesis failed with status {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("image synthesis failed: {0}")]
    Failed(String),
    #[error("image synthesis response could not be decoded: {0}")]
    Decode(String),
    #[error("image synthesis returned no output")]
    MissingOutput,
}

#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Runs one generation and downloads the result.
    ///
    /// `Ok(None)` means the service produced an image that could not be fetched.
    async fn render(&self, request: &SynthesisRequest) -> Result<Option<Vec<u8>>, SynthesisError>;
}
