//! The authenticated request pipeline.
//!
//! [`RequestPipeline::call`] attaches the stored access credential, renews it at most
//! once when the server answers `401`, and classifies the final response into a
//! [`PipelineOutcome`]. Expected failures never surface as `Err`; they are outcomes.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde_json::Value;
use url::Url;

use crate::client_logger::ClientLogger;
use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_AUTH_RETRIES, CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS,
};
use crate::refresh::RefreshCoordinator;
use crate::transport::{self, ByteStream, HttpRequest, HttpResponse, Method, Transport};
use crate::{Token, error_message};

/// Status signalling an expired or missing access credential.
pub const STATUS_UNAUTHORIZED: u16 = 401;

/// Status signalling a credential the server could not even parse.
pub const STATUS_INVALID_CREDENTIAL: u16 = 422;

/////////////////////////////////////////// CallOptions ///////////////////////////////////////////

/// Per-call switches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Send no credential and never attempt a refresh.
    pub skip_auth: bool,
    /// Hand back the body unread as a [`PipelineOutcome::Stream`].
    pub streaming: bool,
}

impl CallOptions {
    /// An authenticated call expecting an event stream.
    pub fn streaming() -> Self {
        Self {
            skip_auth: false,
            streaming: true,
        }
    }

    /// A call made without credentials, such as login or registration.
    pub fn anonymous() -> Self {
        Self {
            skip_auth: true,
            streaming: false,
        }
    }
}

////////////////////////////////////////////// Target //////////////////////////////////////////////

/// An endpoint: method plus path relative to the service base URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    method: Method,
    path: String,
}

impl Target {
    /// Creates a target.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }

    /// A `GET` target.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A `POST` target.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// A `PUT` target.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// A `DELETE` target.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// The HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The path relative to the base URL.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

////////////////////////////////////////// PipelineOutcome //////////////////////////////////////////

/// The terminal result of one [`RequestPipeline::call`].
pub enum PipelineOutcome {
    /// A successful streaming call; the body has not been read.
    Stream(ByteStream),
    /// A successful non-streaming call with its full body.
    Body(Bytes),
    /// No valid session: the refresh failed or the credential was rejected outright.
    /// Stored credentials have been cleared.
    AuthFailed,
    /// The server answered with a non-success status.
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the error body.
        message: String,
    },
    /// No response was received.
    NetworkError(String),
}

impl PipelineOutcome {
    /// True for [`PipelineOutcome::Stream`] and [`PipelineOutcome::Body`].
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Stream(_) | PipelineOutcome::Body(_))
    }

    /// A human-readable description of a failed outcome, fit to show as a turn's content.
    pub fn user_message(&self) -> Option<String> {
        match self {
            PipelineOutcome::Stream(_) | PipelineOutcome::Body(_) => None,
            PipelineOutcome::AuthFailed => {
                Some("Your session has expired. Please log in again.".to_string())
            }
            PipelineOutcome::HttpError { status, message } => {
                Some(format!("Request failed ({status}): {message}"))
            }
            PipelineOutcome::NetworkError(message) => Some(format!(
                "System error, check the backend connection or network: {message}"
            )),
        }
    }

    /// The body stream of a successful streaming call.
    pub fn into_stream(self) -> Result<ByteStream> {
        match self {
            PipelineOutcome::Stream(stream) => Ok(stream),
            PipelineOutcome::Body(_) => Err(Error::unknown(
                "expected an event stream but the call was not streaming",
            )),
            failure => Err(failure.into_error()),
        }
    }

    /// The body of a successful non-streaming call.
    pub fn into_body(self) -> Result<Bytes> {
        match self {
            PipelineOutcome::Body(body) => Ok(body),
            PipelineOutcome::Stream(_) => Err(Error::unknown(
                "expected a complete body but the call was streaming",
            )),
            failure => Err(failure.into_error()),
        }
    }

    fn into_error(self) -> Error {
        let message = self.user_message().unwrap_or_default();
        match self {
            PipelineOutcome::AuthFailed => Error::authentication(message),
            PipelineOutcome::HttpError { status, message } => Error::api(status, message),
            PipelineOutcome::NetworkError(_) => Error::connection(message, None),
            PipelineOutcome::Stream(_) | PipelineOutcome::Body(_) => Error::unknown(message),
        }
    }
}

impl fmt::Debug for PipelineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineOutcome::Stream(_) => f.write_str("Stream(..)"),
            PipelineOutcome::Body(body) => f.debug_tuple("Body").field(&body.len()).finish(),
            PipelineOutcome::AuthFailed => f.write_str("AuthFailed"),
            PipelineOutcome::HttpError { status, message } => f
                .debug_struct("HttpError")
                .field("status", status)
                .field("message", message)
                .finish(),
            PipelineOutcome::NetworkError(message) => {
                f.debug_tuple("NetworkError").field(message).finish()
            }
        }
    }
}

////////////////////////////////////////// RequestPipeline //////////////////////////////////////////

/// Issues authenticated calls with a single refresh-and-retry cycle.
pub struct RequestPipeline {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    refresher: RefreshCoordinator,
    base: Url,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl RequestPipeline {
    /// Creates a pipeline for the service rooted at `base`.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        base: Url,
    ) -> Result<Self> {
        let refresher = RefreshCoordinator::new(transport.clone(), store.clone(), &base)?;
        Ok(Self {
            transport,
            store,
            refresher,
            base,
            logger: None,
        })
    }

    /// Reports outcomes and refreshes to `logger`.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.refresher = self.refresher.with_logger(logger.clone());
        self.logger = Some(logger);
        self
    }

    /// The service base URL.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// The credential store shared with the refresh coordinator.
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// The refresh coordinator used on `401`.
    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    /// Performs one call, issuing at most two requests.
    pub async fn call(
        &self,
        target: &Target,
        payload: Option<Value>,
        options: CallOptions,
    ) -> PipelineOutcome {
        let start = Instant::now();
        let outcome = self.call_inner(target, payload, options).await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        if !outcome.is_success() {
            CLIENT_REQUEST_ERRORS.click();
        }
        tracing::debug!(%target, ?outcome, "call finished");
        if let Some(logger) = &self.logger {
            logger.log_outcome(target.path(), &outcome);
        }
        outcome
    }

    async fn call_inner(
        &self,
        target: &Target,
        payload: Option<Value>,
        options: CallOptions,
    ) -> PipelineOutcome {
        let url = match transport::resolve(&self.base, target.path()) {
            Ok(url) => url,
            Err(err) => return PipelineOutcome::NetworkError(err.to_string()),
        };
        let request = HttpRequest::new(target.method().clone(), url)
            .with_body(payload)
            .with_streaming(options.streaming);

        let bearer = if options.skip_auth {
            None
        } else {
            self.store.get().access
        };
        let mut response = match self.send(request.clone(), bearer.clone()).await {
            Ok(response) => response,
            Err(outcome) => return outcome,
        };

        if response.status() == STATUS_UNAUTHORIZED && !options.skip_auth {
            CLIENT_AUTH_RETRIES.click();
            tracing::debug!(%target, "unauthorized; renewing access credential");
            let Some(renewed) = self.refresher.refresh_rejected(bearer.as_ref()).await else {
                self.store.clear();
                return PipelineOutcome::AuthFailed;
            };
            response = match self.send(request, Some(renewed)).await {
                Ok(response) => response,
                Err(outcome) => return outcome,
            };
            if response.status() == STATUS_UNAUTHORIZED {
                tracing::warn!(%target, "renewed credential rejected");
                self.store.clear();
                return PipelineOutcome::AuthFailed;
            }
        }

        if response.status() == STATUS_INVALID_CREDENTIAL && !options.skip_auth {
            tracing::warn!(%target, "credential rejected as invalid");
            self.store.clear();
            return PipelineOutcome::AuthFailed;
        }

        self.classify(response, options).await
    }

    async fn send(
        &self,
        request: HttpRequest,
        bearer: Option<Token>,
    ) -> std::result::Result<HttpResponse, PipelineOutcome> {
        CLIENT_REQUESTS.click();
        self.transport
            .send(request.with_bearer(bearer))
            .await
            .map_err(|err| PipelineOutcome::NetworkError(err.to_string()))
    }

    async fn classify(&self, response: HttpResponse, options: CallOptions) -> PipelineOutcome {
        let status = response.status();
        if response.is_success() {
            if options.streaming {
                return PipelineOutcome::Stream(response.into_body());
            }
            return match response.bytes().await {
                Ok(body) => PipelineOutcome::Body(body),
                Err(err) => PipelineOutcome::NetworkError(err.to_string()),
            };
        }
        let reason = response.reason();
        // An unreadable error body still has a status worth reporting.
        let body = response.bytes().await.unwrap_or_default();
        PipelineOutcome::HttpError {
            status,
            message: error_message(status, reason, &body),
        }
    }
}
