//! HTTP transport.
//!
//! A [`Transport`] performs exactly one HTTP exchange and hands back the status and an
//! unconsumed body stream. Credential handling, retries and outcome classification live
//! above it in the [`RequestPipeline`](crate::RequestPipeline).

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use reqwest::header::{self, HeaderValue};
use reqwest::{Client as ReqwestClient, StatusCode};
use serde_json::Value;
use url::Url;

pub use reqwest::Method;

use crate::error::{Error, Result};
use crate::Token;

/// A response body delivered in arbitrary-sized chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Parses a service base URL, ensuring it ends with `/` so targets join beneath it.
pub fn base_url(base: &str) -> Result<Url> {
    let mut url = Url::parse(base)?;
    if url.cannot_be_a_base() {
        return Err(Error::url(format!("{base} cannot be used as a base URL"), None));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Resolves `target` against `base`.
///
/// A leading `/` is ignored so `"/chat"` and `"chat"` name the same endpoint; absolute
/// `http://` or `https://` targets are used as-is.
pub fn resolve(base: &Url, target: &str) -> Result<Url> {
    if target.starts_with("http://") || target.starts_with("https://") {
        return Ok(Url::parse(target)?);
    }
    Ok(base.join(target.trim_start_matches('/'))?)
}

/// One outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL.
    pub url: Url,
    /// Credential sent as `Authorization: Bearer ...`.
    pub bearer: Option<Token>,
    /// JSON body.
    pub body: Option<Value>,
    /// Ask for a `text/event-stream` body instead of JSON.
    pub streaming: bool,
}

impl HttpRequest {
    /// Creates a request without credential or body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            bearer: None,
            body: None,
            streaming: false,
        }
    }

    /// Attaches a bearer credential.
    pub fn with_bearer(mut self, bearer: Option<Token>) -> Self {
        self.bearer = bearer;
        self
    }

    /// Attaches a JSON body.
    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }

    /// Marks the request as expecting an event stream.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

/// The status and unconsumed body of one HTTP exchange.
pub struct HttpResponse {
    status: u16,
    body: ByteStream,
}

impl HttpResponse {
    /// Wraps a status and a body stream.
    pub fn new(status: u16, body: ByteStream) -> Self {
        Self { status, body }
    }

    /// A response whose body is already fully in memory.
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let chunks: ByteStream = if body.is_empty() {
            Box::pin(stream::empty())
        } else {
            Box::pin(stream::iter([Ok::<_, Error>(body)]))
        };
        Self::new(status, chunks)
    }

    /// The HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The canonical reason phrase for the status, if it has one.
    pub fn reason(&self) -> Option<&'static str> {
        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|status| status.canonical_reason())
    }

    /// Gives up ownership of the body stream without reading it.
    pub fn into_body(self) -> ByteStream {
        self.body
    }

    /// Reads the whole body into memory.
    pub async fn bytes(self) -> Result<Bytes> {
        let collected = self
            .body
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok::<_, Error>(acc)
            })
            .await?;
        Ok(collected.freeze())
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Performs a single HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request`. An `Err` means no response was received at all.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// The production transport built on `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: ReqwestClient,
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    /// Creates a transport that relies on the HTTP client's default timeouts.
    pub fn new() -> Result<Self> {
        Self::with_timeout(None)
    }

    /// Creates a transport with an optional overall request timeout.
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = ReqwestClient::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {e}"),
                Some(Box::new(e)),
            )
        })?;
        Ok(Self { client, timeout })
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                self.timeout.map(|t| t.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let accept = if request.streaming {
            "text/event-stream"
        } else {
            "application/json"
        };
        let mut builder = self
            .client
            .request(request.method, request.url)
            .header(header::ACCEPT, HeaderValue::from_static(accept));
        if let Some(token) = &request.bearer {
            builder = builder.header(header::AUTHORIZATION, token.bearer());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status().as_u16();
        let body = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| {
                Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e)))
            })
        });
        Ok(HttpResponse::new(status, Box::pin(body)))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scripted transport for exercising the pipeline without a network.

    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use super::*;

    /// A request as observed by [`ScriptedTransport`].
    #[derive(Debug, Clone)]
    pub struct Seen {
        pub path: String,
        pub bearer: Option<String>,
        pub body: Option<Value>,
    }

    enum Reply {
        Chunks(u16, Vec<&'static [u8]>),
        Unreachable,
    }

    /// Replies to each path from a queue of canned responses.
    #[derive(Default)]
    pub struct ScriptedTransport {
        replies: Mutex<HashMap<String, VecDeque<Reply>>>,
        seen: Mutex<Vec<Seen>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response for `path` whose body arrives as the given chunks.
        pub fn reply(&self, path: &str, status: u16, chunks: Vec<&'static [u8]>) -> &Self {
            self.push(path, Reply::Chunks(status, chunks));
            self
        }

        /// Queue a JSON response for `path`.
        pub fn reply_json(&self, path: &str, status: u16, body: &'static str) -> &Self {
            self.reply(path, status, vec![body.as_bytes()])
        }

        /// Queue a transport failure for `path`.
        pub fn unreachable(&self, path: &str) -> &Self {
            self.push(path, Reply::Unreachable);
            self
        }

        /// Number of requests made to `path`.
        pub fn calls(&self, path: &str) -> usize {
            self.seen().iter().filter(|s| s.path == path).count()
        }

        pub fn seen(&self) -> Vec<Seen> {
            self.seen.lock().unwrap().clone()
        }

        fn push(&self, path: &str, reply: Reply) {
            self.replies
                .lock()
                .unwrap()
                .entry(path.to_string())
                .or_default()
                .push_back(reply);
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            let path = request.url.path().to_string();
            self.seen.lock().unwrap().push(Seen {
                path: path.clone(),
                bearer: request.bearer.as_ref().map(|t| t.as_str().to_string()),
                body: request.body.clone(),
            });
            let reply = self
                .replies
                .lock()
                .unwrap()
                .get_mut(&path)
                .and_then(VecDeque::pop_front);
            match reply {
                Some(Reply::Chunks(status, chunks)) => {
                    let body = stream::iter(
                        chunks
                            .into_iter()
                            .map(|chunk| Ok::<_, Error>(Bytes::from_static(chunk)))
                            .collect::<Vec<_>>(),
                    );
                    Ok(HttpResponse::new(status, Box::pin(body)))
                }
                Some(Reply::Unreachable) => Err(Error::connection("connection refused", None)),
                None => panic!("no scripted reply left for {path}"),
            }
        }
    }
}
