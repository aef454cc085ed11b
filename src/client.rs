use std::env;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use crate::assembler::ChatTurnAssembler;
use crate::client_logger::ClientLogger;
use crate::credentials::{CredentialStore, MemoryCredentialStore};
use crate::error::{Error, Result};
use crate::pipeline::{CallOptions, PipelineOutcome, RequestPipeline, Target};
use crate::transport::{self, ReqwestTransport, Transport};
use crate::types::{ApiEnvelope, ChatMessage, ChatRequest, CredentialPair, Token};

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api/";

/// Environment variable consulted for the base URL.
pub const BASE_URL_ENV: &str = "KBCHAT_BASE_URL";

#[derive(Debug, serde::Deserialize)]
struct LoginData {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

/// Client for the knowledge-base chat service.
///
/// Owns the request pipeline and everything it needs. Construct it once and share it
/// by reference.
pub struct KbClient {
    pipeline: RequestPipeline,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl KbClient {
    /// Create a new client with an in-memory credential store.
    ///
    /// The base URL can be provided directly or read from the KBCHAT_BASE_URL
    /// environment variable; otherwise [`DEFAULT_BASE_URL`] is used.
    pub fn new(base_url: Option<String>) -> Result<Self> {
        Self::with_options(base_url, None, Arc::new(MemoryCredentialStore::new()))
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        base_url: Option<String>,
        timeout: Option<Duration>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let base_url = base_url
            .or_else(|| env::var(BASE_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let transport = ReqwestTransport::with_timeout(timeout)?;
        Self::from_parts(Arc::new(transport), store, transport::base_url(&base_url)?)
    }

    /// Assemble a client from explicit parts.
    pub fn from_parts(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        base_url: Url,
    ) -> Result<Self> {
        Ok(Self {
            pipeline: RequestPipeline::new(transport, store, base_url)?,
            logger: None,
        })
    }

    /// Report client activity to `logger`.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.pipeline = self.pipeline.with_logger(logger.clone());
        self.logger = Some(logger);
        self
    }

    /// The service base URL.
    pub fn base_url(&self) -> &Url {
        self.pipeline.base_url()
    }

    /// The underlying pipeline, for calls this client has no helper for.
    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    /// The credential store.
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        self.pipeline.store()
    }

    /// True while an access credential is stored.
    pub fn is_authenticated(&self) -> bool {
        self.store().get().access.is_some()
    }

    /// Log in and store the issued credentials, replacing any previous session.
    ///
    /// Returns the username the server reports.
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let body = json!({"username": username, "password": password});
        let outcome = self
            .pipeline
            .call(&Target::post("login"), Some(body), CallOptions::anonymous())
            .await;
        let bytes = match outcome {
            PipelineOutcome::HttpError { status, message } if status == 401 || status == 403 => {
                return Err(Error::authentication(message));
            }
            outcome => outcome.into_body()?,
        };
        let envelope: ApiEnvelope<LoginData> = serde_json::from_slice(&bytes)?;
        let data = envelope.into_data()?;
        let access = Token::new(data.access_token).ok_or_else(|| {
            Error::authentication("login response carried an empty access token")
        })?;
        let refresh = data.refresh_token.and_then(Token::new);
        self.store().set(CredentialPair::new(access, refresh));
        tracing::debug!(username, "logged in");
        Ok(data.username.unwrap_or_else(|| username.to_string()))
    }

    /// Create an account. Does not log in.
    ///
    /// Returns the server's confirmation message.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<String> {
        let body = json!({"username": username, "email": email, "password": password});
        let bytes = self
            .pipeline
            .call(&Target::post("register"), Some(body), CallOptions::anonymous())
            .await
            .into_body()?;
        let envelope: ApiEnvelope<Value> = serde_json::from_slice(&bytes)?;
        // Account creation is acknowledged with 201 as well as 200.
        if !(200..300).contains(&envelope.code) {
            let status = u16::try_from(envelope.code).unwrap_or(0);
            return Err(Error::api(status, envelope.describe_error()));
        }
        Ok(envelope.message)
    }

    /// End the session. The server is told best-effort; local credentials are always
    /// cleared.
    pub async fn logout(&self) {
        if self.is_authenticated() {
            let outcome = self
                .pipeline
                .call(&Target::post("logout"), None, CallOptions::default())
                .await;
            if !outcome.is_success() {
                tracing::debug!(?outcome, "ignoring failed logout call");
            }
        }
        self.store().clear();
    }

    /// Start a chat turn and return the unread stream or the reason there is none.
    pub async fn chat(&self, message: &str, use_rag: bool) -> PipelineOutcome {
        let request = ChatRequest::new(message, use_rag);
        let body = match serde_json::to_value(&request) {
            Ok(body) => body,
            Err(err) => return PipelineOutcome::NetworkError(err.to_string()),
        };
        self.pipeline
            .call(&Target::post("chat"), Some(body), CallOptions::streaming())
            .await
    }

    /// An assembler for a turn started with `use_rag`, reporting to this client's logger.
    pub fn assembler(&self, use_rag: bool) -> ChatTurnAssembler {
        ChatTurnAssembler::new(use_rag).with_logger(self.logger.clone())
    }

    /// Run a whole chat turn and return the finished assistant message.
    pub async fn chat_turn(&self, message: &str, use_rag: bool) -> ChatMessage {
        let outcome = self.chat(message, use_rag).await;
        self.assembler(use_rag).run(outcome).await
    }

    /// `GET` a JSON endpoint.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<ApiEnvelope<T>> {
        self.json_call(Target::get(path), None).await
    }

    /// `POST` to a JSON endpoint.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiEnvelope<T>> {
        self.json_call(Target::post(path), Some(serde_json::to_value(body)?))
            .await
    }

    /// `PUT` to a JSON endpoint.
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiEnvelope<T>> {
        self.json_call(Target::put(path), Some(serde_json::to_value(body)?))
            .await
    }

    /// `DELETE` a JSON endpoint.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<ApiEnvelope<T>> {
        self.json_call(Target::delete(path), None).await
    }

    async fn json_call<T: DeserializeOwned>(
        &self,
        target: Target,
        body: Option<Value>,
    ) -> Result<ApiEnvelope<T>> {
        let bytes = self
            .pipeline
            .call(&target, body, CallOptions::default())
            .await
            .into_body()?;
        let envelope: ApiEnvelope<T> = serde_json::from_slice(&bytes)?;
        if !envelope.is_success() {
            let status = u16::try_from(envelope.code).unwrap_or(0);
            return Err(Error::api(status, envelope.describe_error()));
        }
        Ok(envelope)
    }
}
