//! HTTP fetching with bounded retries, identity rotation and request pacing.
//!
//! # Architecture
//!
//! - [`Fetch`]: the capability the crawler needs, `request -> (status, body)`
//!   or a network error. [`HttpFetcher`] implements it over `reqwest`.
//! - [`RetryPolicy`]: an explicit per-request state machine,
//!   `Attempt(n) -> Success | Retry(n + 1, delay) | GiveUp`.
//! - [`RetryFetch`]: decorator that drives the policy and, per source, picks
//!   a random user agent from an [`IdentityPool`] and sleeps a random
//!   [`Pacing`] interval before each request.
//!
//! # Retry Strategy
//!
//! ```text
//! delay(n) = min(base_delay * 2^(n-1), max_delay) + random_jitter(0..=jitter)
//! ```
//!
//! Only transient failures (network errors, timeouts, blocking statuses, 5xx)
//! are retried.

use crate::error::{CrawlError, Result, classify_status};
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    /// `application/x-www-form-urlencoded` POST.
    PostForm(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            headers: Vec::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::PostForm(form),
            ..Self::get(url)
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[cfg(test)]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
    /// URL after redirects.
    pub final_url: String,
}

/// The HTTP capability the crawler consumes.
///
/// Implementations return `Ok` for every HTTP answer, whatever its status;
/// `Err` is reserved for transport failures. Fetchers are shared by crawls
/// running on separate tasks, so both the fetcher and its futures are `Send`.
pub trait Fetch: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> impl Future<Output = Result<FetchResponse>> + Send;
}

impl<T: Fetch> Fetch for &T {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        (**self).fetch(request).await
    }
}

/// `reqwest`-backed fetcher with a cookie store, so a login performed through
/// it carries over to later requests.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .build()?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(url = %request.url))]
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let mut builder = match &request.method {
            Method::Get => self.client.get(&request.url),
            Method::PostForm(form) => self.client.post(&request.url).form(form),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.timeout(request.timeout).send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await?;
        debug!(status, bytes = body.len(), "Fetched");
        Ok(FetchResponse {
            status,
            body,
            final_url,
        })
    }
}

/// Next step after one attempt.
#[derive(Debug)]
pub enum Attempt {
    Success(FetchResponse),
    Retry {
        attempt: u32,
        delay: Duration,
        error: CrawlError,
    },
    GiveUp(CrawlError),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (1-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    /// Decide what follows attempt number `attempt` (0-based) given its result.
    pub fn next(&self, attempt: u32, result: Result<FetchResponse>) -> Attempt {
        let error = match result {
            Ok(response) => match classify_status(response.status) {
                None => return Attempt::Success(response),
                Some(e) => e,
            },
            Err(e) => e,
        };

        if !error.is_transient() || attempt >= self.max_retries {
            return Attempt::GiveUp(error);
        }

        let retry = attempt + 1;
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rng().random_range(0..=jitter_ms))
        };
        Attempt::Retry {
            attempt: retry,
            delay: self.backoff(retry) + jitter,
            error,
        }
    }
}

/// Fixed pool of outbound identities (user agents).
#[derive(Debug, Clone, Default)]
pub struct IdentityPool {
    agents: Vec<String>,
}

impl IdentityPool {
    pub fn new(agents: Vec<String>) -> Self {
        Self { agents }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn pick(&self) -> Option<&str> {
        if self.agents.is_empty() {
            return None;
        }
        let i = rng().random_range(0..self.agents.len());
        Some(self.agents[i].as_str())
    }
}

/// Random delay range slept before every request of a paced source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min: Duration,
    pub max: Duration,
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn delay(&self) -> Duration {
        let (min, max) = (self.min.as_millis() as u64, self.max.as_millis() as u64);
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rng().random_range(min..=max))
    }
}

/// Decorator that retries transient failures and applies per-source
/// politeness (identity rotation, pacing) to every request.
pub struct RetryFetch<'a, F> {
    inner: &'a F,
    policy: RetryPolicy,
    identities: Option<&'a IdentityPool>,
    pacing: Pacing,
}

impl<'a, F: Fetch> RetryFetch<'a, F> {
    pub fn new(inner: &'a F, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            identities: None,
            pacing: Pacing::none(),
        }
    }

    pub fn with_identities(mut self, pool: &'a IdentityPool) -> Self {
        self.identities = Some(pool);
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    fn prepare(&self, request: &FetchRequest) -> FetchRequest {
        match self.identities.and_then(|pool| pool.pick()) {
            Some(agent) => request.clone().with_header("User-Agent", agent),
            None => request.clone(),
        }
    }

    /// Fetch with retries. A successful return always carries a 2xx status.
    #[instrument(level = "info", skip_all, fields(url = %request.url))]
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let total_t0 = Instant::now();
        let mut attempt = 0u32;

        loop {
            let pause = self.pacing.delay();
            if !pause.is_zero() {
                sleep(pause).await;
            }

            let prepared = self.prepare(request);
            let result = self.inner.fetch(&prepared).await;

            match self.policy.next(attempt, result) {
                Attempt::Success(response) => return Ok(response),
                Attempt::Retry {
                    attempt: next,
                    delay,
                    error,
                } => {
                    warn!(
                        attempt = next,
                        max = self.policy.max_retries,
                        elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                        ?delay,
                        error = %error,
                        "Fetch attempt failed; backing off"
                    );
                    attempt = next;
                    sleep(delay).await;
                }
                Attempt::GiveUp(error) => {
                    error!(
                        attempt,
                        max = self.policy.max_retries,
                        elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                        error = %error,
                        "Fetch gave up"
                    );
                    return Err(error);
                }
            }
        }
    }
}

impl<F> fmt::Debug for RetryFetch<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("policy", &self.policy)
            .field("identities", &self.identities.map(IdentityPool::len))
            .field("pacing", &self.pacing)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Canned, FakeFetcher};
    use super::*;

    fn instant_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    fn ok(status: u16) -> Result<FetchResponse> {
        Ok(FetchResponse {
            status,
            body: String::new(),
            final_url: String::new(),
        })
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(4), Duration::from_secs(5));
        assert_eq!(policy.backoff(40), Duration::from_secs(5));
    }

    #[test]
    fn test_policy_transitions() {
        let policy = RetryPolicy {
            jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        assert!(matches!(policy.next(0, ok(200)), Attempt::Success(_)));
        match policy.next(0, ok(503)) {
            Attempt::Retry { attempt, delay, .. } => {
                assert_eq!(attempt, 1);
                assert_eq!(delay, policy.base_delay);
            }
            other => panic!("expected retry, got {other:?}"),
        }
        assert!(matches!(policy.next(3, ok(503)), Attempt::GiveUp(_)));
        assert!(matches!(policy.next(0, ok(404)), Attempt::GiveUp(CrawlError::Http { status: 404 })));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(10),
            jitter: Duration::from_millis(5),
        };
        for _ in 0..20 {
            match policy.next(0, Err(CrawlError::Fetch("x".into()))) {
                Attempt::Retry { delay, .. } => {
                    assert!(delay >= Duration::from_millis(10));
                    assert!(delay <= Duration::from_millis(15));
                }
                other => panic!("expected retry, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_pacing_range() {
        let pacing = Pacing {
            min: Duration::from_millis(5),
            max: Duration::from_millis(9),
        };
        for _ in 0..20 {
            let d = pacing.delay();
            assert!(d >= pacing.min && d <= pacing.max);
        }
        assert_eq!(Pacing::none().delay(), Duration::ZERO);
    }

    #[test]
    fn test_identity_pool_picks_members() {
        let pool = IdentityPool::new(vec!["a".into(), "b".into()]);
        for _ in 0..10 {
            let agent = pool.pick().unwrap();
            assert!(agent == "a" || agent == "b");
        }
        assert!(IdentityPool::default().pick().is_none());
    }

    #[test]
    fn test_request_headers_replace() {
        let req = FetchRequest::get("https://x")
            .with_header("User-Agent", "one")
            .with_header("user-agent", "two");
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.header("User-Agent"), Some("two"));
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failure() {
        let url = "https://example.com/page";
        let fake = FakeFetcher::new()
            .once(url, Canned::NetworkError)
            .once(url, Canned::Page(429, String::new()))
            .page(url, 200, "ok");
        let fetcher = RetryFetch::new(&fake, instant_policy(3));
        let response = fetcher.fetch(&FetchRequest::get(url)).await.unwrap();
        assert_eq!(response.body, "ok");
        assert_eq!(fake.hits(url), 3);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let url = "https://example.com/down";
        let fake = FakeFetcher::new().failing(url);
        let fetcher = RetryFetch::new(&fake, instant_policy(2));
        let err = fetcher.fetch(&FetchRequest::get(url)).await.unwrap_err();
        assert!(matches!(err, CrawlError::Fetch(_)));
        assert_eq!(fake.hits(url), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let url = "https://example.com/missing";
        let fake = FakeFetcher::new().page(url, 404, "");
        let fetcher = RetryFetch::new(&fake, instant_policy(3));
        assert!(fetcher.fetch(&FetchRequest::get(url)).await.is_err());
        assert_eq!(fake.hits(url), 1);
    }

    #[tokio::test]
    async fn test_identity_rotation_sets_user_agent() {
        let url = "https://example.com/ua";
        let fake = FakeFetcher::new().page(url, 200, "ok");
        let pool = IdentityPool::new(vec!["agent-1".into()]);
        let fetcher = RetryFetch::new(&fake, instant_policy(0)).with_identities(&pool);
        fetcher.fetch(&FetchRequest::get(url)).await.unwrap();
        let sent = fake.sent();
        assert_eq!(sent[0].header("User-Agent"), Some("agent-1"));
    }
}
