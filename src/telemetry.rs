//! Diagnostic logging setup for binaries built on this crate.

use std::io;
use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};

use crate::error::{Error, Result};

/// Filter used when `RUST_LOG` is unset or unparseable.
pub const DEFAULT_FILTER: &str = "warn";

static SUBSCRIBER_GUARD: OnceLock<()> = OnceLock::new();

/// Install a global `tracing` subscriber writing to stderr.
///
/// The filter comes from `RUST_LOG`, falling back to [`DEFAULT_FILTER`]. Calling this
/// more than once is harmless.
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    init_tracing_with(filter)
}

/// Install a global `tracing` subscriber with an explicit filter.
pub fn init_tracing_with(filter: EnvFilter) -> Result<()> {
    if SUBSCRIBER_GUARD.get().is_some() {
        return Ok(());
    }
    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr));
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| Error::unknown(format!("failed to install tracing subscriber: {err}")))?;
    SUBSCRIBER_GUARD.set(()).ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_tracing_with(EnvFilter::new("debug")).unwrap();
        init_tracing().unwrap();
        tracing::debug!("subscriber installed");
    }
}
