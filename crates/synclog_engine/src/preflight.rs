//! Connectivity check sent before replaying a request.
//!
//! A preflight is an `OPTIONS` request to the target URL. Any reply,
//! including a transport error, counts as reachable; only a timeout marks
//! the origin unreachable. URLs that answered once are not checked again in
//! the same session.

use crate::config::SyncOptions;
use crate::transport::Transport;
use std::collections::HashSet;
use std::time::Duration;
use synclog_codec::{HttpRequest, Method};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The preflight got no reply in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PreflightTimeout {
    pub(crate) timeout: Duration,
}

/// Session-scoped preflight state.
#[derive(Debug, Default)]
pub(crate) struct PreflightChecker {
    pinged: HashSet<String>,
    current: Option<CancellationToken>,
}

impl PreflightChecker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns true if `url` already answered a preflight this session.
    pub(crate) fn is_pinged(&self, url: &str) -> bool {
        self.pinged.contains(url)
    }

    /// Invalidates the timer of the preflight in progress, if any.
    pub(crate) fn cancel(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
    }

    /// Sends a preflight to `url` when the options ask for it.
    pub(crate) async fn check<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        options: &SyncOptions,
        url: &str,
    ) -> Result<(), PreflightTimeout> {
        if !options.preflight.matches(url) || self.is_pinged(url) {
            return Ok(());
        }

        self.cancel();
        let token = CancellationToken::new();
        self.current = Some(token.clone());

        let timeout = options.preflight_timeout;
        debug!(url, "Sending preflight");
        let outcome = tokio::select! {
            reply = transport.fetch(HttpRequest::new(Method::OPTIONS, url)) => {
                match reply {
                    Ok(response) => debug!(url, status = %response.status, "Preflight answered"),
                    Err(e) => debug!(url, error = %e, "Preflight failed, treating origin as reachable"),
                }
                self.pinged.insert(url.to_string());
                Ok(())
            }
            () = expiry(token, timeout) => {
                warn!(url, ?timeout, "Preflight timed out");
                Err(PreflightTimeout { timeout })
            }
        };

        self.cancel();
        outcome
    }
}

/// Completes after `timeout` unless `token` is cancelled first.
///
/// Once cancelled the timer never completes.
async fn expiry(token: CancellationToken, timeout: Duration) {
    tokio::select! {
        biased;
        () = token.cancelled() => std::future::pending::<()>().await,
        () = tokio::time::sleep(timeout) => {}
    }
}
