//! Generative model seam and the OpenAI-compatible HTTP adapter.

pub mod openai;
pub mod provider;
pub mod types;

pub use openai::OpenAiCompatClient;
pub use provider::GenerativeModel;
pub use types::{ChatMessage, ChatRequest};
