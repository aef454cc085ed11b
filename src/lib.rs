//! A client for a knowledge-base chat service.
//!
//! The service answers questions about an uploaded document collection, optionally
//! searching it first, and streams answers back as server-sent events. This crate
//! keeps the caller's credentials, renews them when the service rejects them, decodes
//! the answer stream, and assembles each turn into a [`ChatMessage`].
//!
//! The [`chat`] module builds an interactive terminal session on top of the client.

// Public modules
pub mod assembler;
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod credentials;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod refresh;
pub mod render;
pub mod sse;
pub mod telemetry;
pub mod transport;
pub mod types;
pub mod utils;

// Re-exports
pub use assembler::{ChatTurnAssembler, INTERRUPTED_MESSAGE, NO_DATA_MESSAGE};
pub use client::{BASE_URL_ENV, DEFAULT_BASE_URL, KbClient};
pub use client_logger::{ClientLogger, NoopLogger};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use pipeline::{CallOptions, PipelineOutcome, RequestPipeline, Target};
pub use refresh::RefreshCoordinator;
pub use render::{PlainTextRenderer, Renderer};
pub use sse::{EventStreamDecoder, decode_stream, parse_payload};
pub use transport::{ByteStream, HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
pub use types::*;
