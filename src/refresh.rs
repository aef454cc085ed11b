//! Access credential renewal.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;

use crate::client_logger::ClientLogger;
use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::observability::{REFRESH_ATTEMPTS, REFRESH_FAILURES};
use crate::transport::{self, HttpRequest, Method, Transport};
use crate::{ApiEnvelope, Token, error_message};

/// Path of the renewal endpoint, relative to the service base URL.
pub const REFRESH_PATH: &str = "refresh";

#[derive(Debug, Deserialize)]
struct Refreshed {
    access_token: String,
}

/// Obtains a new access credential using the stored refresh credential.
///
/// Refreshes are serialized: while one is in flight, other callers wait for it and
/// then reuse its result instead of issuing a second renewal call.
pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    endpoint: Url,
    logger: Option<Arc<dyn ClientLogger>>,
    in_flight: Mutex<()>,
}

impl RefreshCoordinator {
    /// Creates a coordinator that renews against `base`'s refresh endpoint.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        base: &Url,
    ) -> Result<Self> {
        Ok(Self {
            transport,
            store,
            endpoint: transport::resolve(base, REFRESH_PATH)?,
            logger: None,
            in_flight: Mutex::new(()),
        })
    }

    /// Reports every refresh attempt to `logger`.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Renews the access credential unconditionally.
    ///
    /// Returns `None` without a network call when no refresh credential is stored. Any
    /// failure of the renewal call clears the store and returns `None`; the session
    /// is then no longer valid.
    pub async fn refresh(&self) -> Option<Token> {
        let _guard = self.in_flight.lock().await;
        self.renew().await
    }

    /// Renews the access credential after the server rejected `rejected`.
    ///
    /// If another caller already replaced `rejected` while this one waited for the
    /// in-flight guard, the stored credential is returned without renewing again.
    pub async fn refresh_rejected(&self, rejected: Option<&Token>) -> Option<Token> {
        let _guard = self.in_flight.lock().await;
        let current = self.store.get().access;
        if current.is_some() && current.as_ref() != rejected {
            tracing::debug!("access credential already renewed by a concurrent call");
            return current;
        }
        self.renew().await
    }

    async fn renew(&self) -> Option<Token> {
        let Some(refresh) = self.store.get().refresh else {
            tracing::debug!("no refresh credential stored");
            return None;
        };
        REFRESH_ATTEMPTS.click();
        let outcome = self.exchange(refresh).await;
        if let Some(logger) = &self.logger {
            logger.log_refresh(outcome.is_ok());
        }
        match outcome {
            Ok(access) => {
                let renewed = self.store.get().with_access(access.clone());
                self.store.set(renewed);
                tracing::debug!("access credential renewed");
                Some(access)
            }
            Err(err) => {
                REFRESH_FAILURES.click();
                tracing::warn!(%err, "credential refresh failed; clearing session");
                self.store.clear();
                None
            }
        }
    }

    async fn exchange(&self, refresh: Token) -> Result<Token> {
        let request =
            HttpRequest::new(Method::POST, self.endpoint.clone()).with_bearer(Some(refresh));
        let response = self.transport.send(request).await?;
        let status = response.status();
        let reason = response.reason();
        let ok = response.is_success();
        let body = response.bytes().await?;
        if !ok {
            return Err(Error::api(status, error_message(status, reason, &body)));
        }
        let envelope: ApiEnvelope<Refreshed> = serde_json::from_slice(&body)?;
        let refreshed = envelope.into_data()?;
        Token::new(refreshed.access_token).ok_or_else(|| {
            Error::validation(
                "refresh response carried an empty access token",
                Some("access_token".to_string()),
            )
        })
    }
}
