//! Per-run context handed to every crawler.
//!
//! Holds the HTTP capability, the credential snapshot, the identity pool and
//! the retry/pacing settings for one run, plus a cooperative cancellation
//! flag. Nothing here is mutated while crawls are in flight except the flag.

use crate::config::ExtractorConfig;
use crate::credentials::CredentialSnapshot;
use crate::fetch::{Fetch, FetchRequest, IdentityPool, Pacing, RetryFetch, RetryPolicy};
use crate::models::Source;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

/// Reason reported for a source stopped by cancellation.
pub const CANCELLED: &str = "cancelled";

/// Cloneable cancellation flag, checked before each source starts and before
/// each result page.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Returns whether it was already raised.
    pub fn cancel(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct RunContext<F> {
    pub fetcher: F,
    pub credentials: CredentialSnapshot,
    pub identities: IdentityPool,
    pub policy: RetryPolicy,
    pub timeout: Duration,
    pub pacing: Pacing,
    pub page_delay: Duration,
    pub cancel: CancelFlag,
}

impl<F: Fetch> RunContext<F> {
    pub fn new(fetcher: F, config: &ExtractorConfig, credentials: CredentialSnapshot) -> Self {
        let identities = config.identity_pool();
        if identities.is_empty() {
            warn!("No user agents configured; requests carry the client default");
        }
        Self {
            fetcher,
            credentials,
            identities,
            policy: config.retry_policy(),
            timeout: config.request_timeout(),
            pacing: config.pacing(),
            page_delay: config.page_delay(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Retrying fetcher configured for one source. Every source rotates
    /// identities; only sources that block aggressively are paced.
    pub fn session(&self, source: Source) -> RetryFetch<'_, F> {
        let session =
            RetryFetch::new(&self.fetcher, self.policy.clone()).with_identities(&self.identities);
        if source.is_paced() {
            session.with_pacing(self.pacing)
        } else {
            session
        }
    }

    /// A GET request carrying the run's timeout.
    pub fn get(&self, url: &str) -> FetchRequest {
        FetchRequest::get(url).with_timeout(self.timeout)
    }
}
