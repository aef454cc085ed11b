//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which owns the conversation
//! transcript and drives one streamed turn at a time.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{from_reader, to_writer_pretty};

use crate::chat::config::ChatConfig;
use crate::client::KbClient;
use crate::credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
use crate::error::{Error, Result};
use crate::render::Renderer;
use crate::types::{ChatMessage, StreamEvent};

/// Version written into transcript files.
const TRANSCRIPT_VERSION: u8 = 1;

/// A chat session that manages conversation state and service interactions.
///
/// At most one turn streams at a time; a second [`ChatSession::send`] while one is in
/// flight is refused with [`Error::Busy`].
pub struct ChatSession {
    client: KbClient,
    config: ChatConfig,
    messages: Mutex<Vec<ChatMessage>>,
    busy: AtomicBool,
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// The service base URL.
    pub base_url: String,
    /// Whether an access credential is stored.
    pub authenticated: bool,
    /// Whether turns request retrieval.
    pub use_rag: bool,
    /// The number of messages in the conversation.
    pub message_count: usize,
    /// The number of completed assistant turns.
    pub turn_count: usize,
    /// The auto-save transcript path, if set.
    pub transcript_path: Option<PathBuf>,
    /// The credentials file, if credentials persist.
    pub credentials_path: Option<PathBuf>,
}

/// Clears the busy flag when a turn ends, however it ends.
struct TurnGuard<'a> {
    busy: &'a AtomicBool,
}

impl<'a> TurnGuard<'a> {
    fn acquire(busy: &'a AtomicBool) -> Result<Self> {
        if busy.swap(true, Ordering::AcqRel) {
            return Err(Error::busy("a response is still streaming"));
        }
        Ok(Self { busy })
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

impl ChatSession {
    /// Creates a new chat session with the given client and configuration.
    pub fn new(client: KbClient, config: ChatConfig) -> Self {
        Self {
            client,
            config,
            messages: Mutex::new(Vec::new()),
            busy: AtomicBool::new(false),
        }
    }

    /// Builds the client `config` describes and wraps it in a session.
    pub fn from_config(config: ChatConfig) -> Result<Self> {
        let store: Arc<dyn CredentialStore> = match &config.credentials_path {
            Some(path) => Arc::new(FileCredentialStore::new(path)),
            None => Arc::new(MemoryCredentialStore::new()),
        };
        let client =
            KbClient::with_options(Some(config.base_url.clone()), config.timeout, store)?;
        Ok(Self::new(client, config))
    }

    /// Sends a user message and streams the response.
    ///
    /// This method:
    /// 1. Refuses to start without a stored access credential, or while another turn
    ///    is streaming; nothing is added to the history in either case
    /// 2. Adds the user message to history
    /// 3. Renders response chunks as they arrive
    /// 4. Adds the finished assistant message to history and returns it
    ///
    /// Failures of the call itself do not make this return `Err`: they become the
    /// assistant message's content.
    pub async fn send(&self, user_input: &str, renderer: &mut dyn Renderer) -> Result<ChatMessage> {
        let text = user_input.trim();
        if text.is_empty() {
            return Err(Error::validation("message is empty", Some("message".to_string())));
        }
        if !self.client.is_authenticated() {
            return Err(Error::authentication(
                "not logged in; use /login <username> <password>",
            ));
        }
        let _guard = TurnGuard::acquire(&self.busy)?;
        let use_rag = self.config.use_rag;

        self.lock_messages().push(ChatMessage::user(text));
        renderer.start_turn(use_rag);

        let outcome = self.client.chat(text, use_rag).await;
        let failure = outcome.user_message();
        let mut printed = 0;
        let mut interrupted = false;
        let message = self
            .client
            .assembler(use_rag)
            .run_observed(outcome, |event, _| {
                match event {
                    StreamEvent::ContentDelta(delta) => {
                        renderer.print_text(delta);
                        printed += delta.len();
                    }
                    StreamEvent::SearchEnd(sources) => renderer.print_sources(sources),
                    StreamEvent::Malformed(_) | StreamEvent::Done => {}
                }
                if renderer.should_interrupt() {
                    interrupted = true;
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await;

        if let Some(failure) = failure {
            renderer.print_error(&failure);
        } else if interrupted {
            renderer.print_interrupted();
        } else if let Some(tail) = message.content.get(printed..) {
            let tail = tail.trim_start();
            if !tail.is_empty() {
                renderer.print_info(tail);
            }
        }
        renderer.finish_response();

        self.lock_messages().push(message.clone());
        self.auto_save_transcript()?;
        Ok(message)
    }

    /// Logs in through the session's client.
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        self.client.login(username, password).await
    }

    /// Registers an account through the session's client.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<String> {
        self.client.register(username, email, password).await
    }

    /// Logs out. Stored credentials are always cleared.
    pub async fn logout(&self) {
        self.client.logout().await;
    }

    /// True while an access credential is stored.
    pub fn is_authenticated(&self) -> bool {
        self.client.is_authenticated()
    }

    /// True while a turn is streaming.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// The underlying client.
    pub fn client(&self) -> &KbClient {
        &self.client
    }

    /// The active configuration.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Clears the conversation history.
    pub fn clear(&self) {
        self.lock_messages().clear();
    }

    /// Returns the number of messages in the conversation.
    pub fn message_count(&self) -> usize {
        self.lock_messages().len()
    }

    /// A snapshot of the conversation.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock_messages().clone()
    }

    /// Turns retrieval on or off for later turns.
    pub fn set_rag(&mut self, use_rag: bool) {
        self.config.use_rag = use_rag;
    }

    /// Whether turns request retrieval.
    pub fn use_rag(&self) -> bool {
        self.config.use_rag
    }

    /// Sets the auto-save transcript path.
    pub fn set_transcript_path(&mut self, path: Option<PathBuf>) {
        self.config.transcript_path = path;
    }

    /// Returns the configured transcript path, if any.
    pub fn transcript_path(&self) -> Option<&Path> {
        self.config.transcript_path.as_deref()
    }

    /// Saves the transcript to the specified path.
    pub fn save_transcript_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let transcript = TranscriptFile::new(&self.lock_messages());
        let file = File::create(path.as_ref())
            .map_err(|err| Error::io("failed to create transcript file", err))?;
        let writer = BufWriter::new(file);
        to_writer_pretty(writer, &transcript).map_err(|err| {
            Error::serialization("failed to serialize transcript", Some(Box::new(err)))
        })
    }

    /// Loads a transcript from disk, replacing the current conversation history.
    pub fn load_transcript_from<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::open(path.as_ref())
            .map_err(|err| Error::io("failed to open transcript file", err))?;
        let reader = BufReader::new(file);
        let transcript: TranscriptFile = from_reader(reader).map_err(|err| {
            Error::serialization("failed to parse transcript", Some(Box::new(err)))
        })?;
        if transcript.version != TRANSCRIPT_VERSION {
            return Err(Error::validation(
                format!("unsupported transcript version {}", transcript.version),
                Some("version".to_string()),
            ));
        }
        *self.lock_messages() = transcript.messages;
        Ok(())
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        let messages = self.lock_messages();
        SessionStats {
            base_url: self.client.base_url().to_string(),
            authenticated: self.client.is_authenticated(),
            use_rag: self.config.use_rag,
            message_count: messages.len(),
            turn_count: messages.iter().filter(|m| m.is_assistant()).count(),
            transcript_path: self.config.transcript_path.clone(),
            credentials_path: self.config.credentials_path.clone(),
        }
    }

    fn lock_messages(&self) -> MutexGuard<'_, Vec<ChatMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn auto_save_transcript(&self) -> Result<()> {
        if let Some(path) = &self.config.transcript_path {
            self.save_transcript_to(path)
        } else {
            Ok(())
        }
    }
}

#[derive(Serialize, Deserialize)]
struct TranscriptFile {
    version: u8,
    messages: Vec<ChatMessage>,
}

impl TranscriptFile {
    fn new(messages: &[ChatMessage]) -> Self {
        Self {
            version: TRANSCRIPT_VERSION,
            messages: messages.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::PlainTextRenderer;
    use crate::transport::testing::ScriptedTransport;
    use crate::transport;
    use crate::{CredentialPair, Token};

    fn session() -> (Arc<ScriptedTransport>, ChatSession) {
        let transport = Arc::new(ScriptedTransport::new());
        let client = KbClient::from_parts(
            transport.clone(),
            Arc::new(MemoryCredentialStore::new()),
            transport::base_url("http://localhost:5000/api/").unwrap(),
        )
        .unwrap();
        (transport, ChatSession::new(client, ChatConfig::new()))
    }

    fn log_in(session: &ChatSession) {
        session
            .client()
            .store()
            .set(CredentialPair::new(Token::new("a1").unwrap(), Token::new("r1")));
    }

    fn renderer() -> PlainTextRenderer<Vec<u8>> {
        PlainTextRenderer::with_writer(Vec::new(), false)
    }

    fn temp_file(test: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kbchat-session-{test}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("transcript.json")
    }

    #[test]
    fn new_session_empty() {
        let (_transport, session) = session();
        assert_eq!(session.message_count(), 0);
        assert!(!session.is_busy());
        assert!(session.use_rag());
    }

    #[tokio::test]
    async fn send_requires_login() {
        let (transport, session) = session();
        let err = session.send("hello", &mut renderer()).await.unwrap_err();
        assert!(err.requires_login());
        assert_eq!(session.message_count(), 0);
        assert!(transport.seen().is_empty());
    }

    #[tokio::test]
    async fn send_refuses_while_busy() {
        let (_transport, session) = session();
        log_in(&session);
        session.busy.store(true, Ordering::Release);
        let err = session.send("hello", &mut renderer()).await.unwrap_err();
        assert!(err.is_busy());
        assert_eq!(session.message_count(), 0);
    }

    #[tokio::test]
    async fn send_streams_and_records_turn() {
        let (transport, session) = session();
        log_in(&session);
        transport.reply(
            "/api/chat",
            200,
            vec![
                b"data: {\"type\":\"searching_end\",\"sources\":[{\"filename\":\"kb.pdf\",\"page\":3}]}\n\n",
                b"data: {\"content\":\"Hel\"}\n\ndata: {\"content\":\"lo\"}\n\ndata: [DONE]\n\n",
            ],
        );
        let mut out = renderer();
        let message = session.send("  hi  ", &mut out).await.unwrap();
        assert_eq!(message.content, "Hello");
        assert!(!session.is_busy());

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hi");
        assert_eq!(messages[1], message);
        assert_eq!(
            String::from_utf8(out.into_inner()).unwrap(),
            "[searching the knowledge base...]\n[sources: kb.pdf (p. 3)]\nHello\n"
        );
    }

    #[tokio::test]
    async fn failed_turn_still_has_content() {
        let (transport, mut session) = session();
        session.set_rag(false);
        log_in(&session);
        transport.reply_json("/api/chat", 400, r#"{"error": "No prompt provided"}"#);
        let mut out = renderer();
        let message = session.send("hi", &mut out).await.unwrap();
        assert_eq!(message.content, "Request failed (400): No prompt provided");
        assert_eq!(session.stats().turn_count, 1);
        assert!(
            String::from_utf8(out.into_inner())
                .unwrap()
                .contains("Error: Request failed (400)")
        );
        assert_eq!(
            transport.seen()[0].body,
            Some(serde_json::json!({"message": "hi", "use_rag": false}))
        );
    }

    #[tokio::test]
    async fn transcript_round_trip() {
        let (transport, mut session) = session();
        log_in(&session);
        let path = temp_file("roundtrip");
        session.set_transcript_path(Some(path.clone()));
        transport.reply("/api/chat", 200, vec![b"data: {\"content\":\"ok\"}\n\n"]);
        session.send("ping", &mut renderer()).await.unwrap();
        assert!(path.exists());

        let (_transport, restored) = self::session();
        restored.load_transcript_from(&path).unwrap();
        assert_eq!(restored.messages(), session.messages());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn unknown_transcript_version_is_rejected() {
        let (_transport, session) = session();
        let path = temp_file("version");
        std::fs::write(&path, r#"{"version": 9, "messages": []}"#).unwrap();
        assert!(session.load_transcript_from(&path).unwrap_err().is_validation());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn clear_session() {
        let (_transport, session) = session();
        session.lock_messages().push(ChatMessage::user("test"));
        assert_eq!(session.message_count(), 1);
        session.clear();
        assert_eq!(session.message_count(), 0);
    }
}
