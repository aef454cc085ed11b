// Public modules
pub mod api_envelope;
pub mod chat_message;
pub mod chat_request;
pub mod credential_pair;
pub mod role;
pub mod source;
pub mod stream_event;
pub mod token;

// Re-exports
pub use api_envelope::{ApiEnvelope, Details, ENVELOPE_SUCCESS, ErrorDetails, error_message};
pub use chat_message::ChatMessage;
pub use chat_request::ChatRequest;
pub use credential_pair::CredentialPair;
pub use role::Role;
pub use source::Source;
pub use stream_event::StreamEvent;
pub use token::Token;
