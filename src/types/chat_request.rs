use serde::{Deserialize, Serialize};

/// Body of a `POST /chat` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's message.
    pub message: String,

    /// Whether the service should search the knowledge base before answering.
    pub use_rag: bool,
}

impl ChatRequest {
    /// Creates a new chat request.
    pub fn new(message: impl Into<String>, use_rag: bool) -> Self {
        Self {
            message: message.into(),
            use_rag,
        }
    }
}
