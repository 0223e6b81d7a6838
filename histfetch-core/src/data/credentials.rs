//! Session credentials (crumb + cookie) with a time-to-live.
//!
//! The data source requires an anti-forgery crumb and a session cookie on every
//! download request. Both come from one bootstrap page: the cookie from the
//! response headers, the crumb from a `"CrumbStore":{"crumb":"..."}` fragment
//! embedded in the page body.
//!
//! Refresh failures are soft. A failed bootstrap request keeps whatever
//! credentials were held before (possibly empty) and is retried on the next
//! `get`; a page without a crumb or cookie keeps the previous value of that
//! part. Download requests made with stale or empty credentials simply fail
//! and are retried by the batch downloader.

use super::transport::HttpTransport;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Crumb and session cookie, replaced together on every refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub session_id: String,
    pub obtained_at: DateTime<Utc>,
}

impl Credentials {
    fn empty() -> Self {
        Self {
            token: String::new(),
            session_id: String::new(),
            obtained_at: DateTime::<Utc>::default(),
        }
    }

    /// Valid while `now - obtained_at < ttl`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match (now - self.obtained_at).to_std() {
            Ok(age) => age < ttl,
            // obtained in the future: clock went backwards
            Err(_) => true,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token_len", &self.token.len())
            .field("session_id_len", &self.session_id.len())
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// Extract the crumb from a bootstrap page.
///
/// Each line is matched against `^.*"CrumbStore":\{"crumb":"([^"]+)"\}` (the
/// greedy prefix picks the last fragment on a line) and the last matching line
/// in the document wins.
#[allow(clippy::expect_used)]
pub fn extract_crumb(body: &str) -> Option<String> {
    static CRUMB_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = CRUMB_REGEX.get_or_init(|| {
        Regex::new(r#"^.*"CrumbStore":\{"crumb":"(?P<crumb>[^"]+)"\}"#)
            .expect("crumb regex is valid")
    });

    let mut crumb = None;
    for line in body.lines() {
        if let Some(caps) = re.captures(line) {
            crumb = caps.name("crumb").map(|m| m.as_str().to_string());
        }
    }
    crumb
}

/// Cache of the current credentials.
///
/// The lock is held for the duration of a refresh, so concurrent callers share
/// one refresh in flight and readers wait until it completes.
pub struct CredentialCache {
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    bootstrap_url: String,
    cookie_name: String,
    ttl: Duration,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    current: Option<Credentials>,
    refreshes: u64,
}

impl CredentialCache {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        bootstrap_url: impl Into<String>,
        cookie_name: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            transport,
            clock: Arc::new(SystemClock),
            bootstrap_url: bootstrap_url.into(),
            cookie_name: cookie_name.into(),
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Current credentials, refreshing when absent, expired, or `force_refresh` is set.
    pub fn get(&self, force_refresh: bool) -> Credentials {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if !force_refresh {
            if let Some(current) = &state.current {
                if current.is_fresh(self.clock.now(), self.ttl) {
                    return current.clone();
                }
            }
        }

        match self.refresh(state.current.as_ref()) {
            Some(fresh) => {
                state.refreshes += 1;
                state.current = Some(fresh.clone());
                fresh
            }
            None => state.current.clone().unwrap_or_else(Credentials::empty),
        }
    }

    /// Shorthand for `get(true)`.
    pub fn force_refresh(&self) -> Credentials {
        self.get(true)
    }

    /// Number of successful bootstrap round-trips so far.
    pub fn refresh_count(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .refreshes
    }

    /// Query the bootstrap page. `None` when the request itself failed.
    fn refresh(&self, previous: Option<&Credentials>) -> Option<Credentials> {
        debug!(url = %self.bootstrap_url, "refreshing credentials");
        let resp = match self.transport.get(&self.bootstrap_url, &[]) {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "credential refresh failed; keeping previous credentials");
                return None;
            }
        };
        if !resp.is_success() {
            warn!(status = resp.status, "bootstrap page returned a non-success status");
        }

        let session_id = match resp.cookie(&self.cookie_name) {
            Some(value) => value.to_string(),
            None => {
                warn!(cookie = %self.cookie_name, "bootstrap response set no session cookie");
                previous.map(|c| c.session_id.clone()).unwrap_or_default()
            }
        };
        let token = match extract_crumb(&resp.body) {
            Some(crumb) => crumb,
            None => {
                warn!("no crumb found in bootstrap page");
                previous.map(|c| c.token.clone()).unwrap_or_default()
            }
        };

        let fresh = Credentials {
            token,
            session_id,
            obtained_at: self.clock.now(),
        };
        info!(
            token_len = fresh.token.len(),
            session_id_len = fresh.session_id.len(),
            "credentials refreshed"
        );
        Some(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::FetchError;
    use crate::data::transport::HttpResponse;
    use std::collections::VecDeque;

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn advance(&self, secs: i64) {
            *self.0.lock().unwrap() += chrono::Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    struct Pages(Mutex<VecDeque<Result<HttpResponse, FetchError>>>);

    impl HttpTransport for Pages {
        fn get(&self, _url: &str, _cookies: &[(&str, &str)]) -> Result<HttpResponse, FetchError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Network("no more pages".into())))
        }
    }

    fn page(crumb: &str, cookie: &str) -> Result<HttpResponse, FetchError> {
        Ok(HttpResponse::ok(format!(
            "<html>\n<script>root.App.main = {{\"CrumbStore\":{{\"crumb\":\"{crumb}\"}}}};</script>\n</html>"
        ))
        .with_cookie("B", cookie))
    }

    fn cache(pages: Vec<Result<HttpResponse, FetchError>>) -> (CredentialCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock(Mutex::new(
            DateTime::parse_from_rfc3339("2024-01-02T15:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        )));
        let transport = Arc::new(Pages(Mutex::new(pages.into())));
        let cache = CredentialCache::new(transport, "http://bootstrap", "B", Duration::from_secs(180))
            .with_clock(clock.clone());
        (cache, clock)
    }

    #[test]
    fn last_matching_line_wins() {
        let body = "\"CrumbStore\":{\"crumb\":\"first\"}\nnothing here\n\"CrumbStore\":{\"crumb\":\"second\"}\n";
        assert_eq!(extract_crumb(body).as_deref(), Some("second"));
    }

    #[test]
    fn greedy_prefix_takes_last_fragment_on_a_line() {
        let body = "\"CrumbStore\":{\"crumb\":\"a\"} \"CrumbStore\":{\"crumb\":\"b\"}";
        assert_eq!(extract_crumb(body).as_deref(), Some("b"));
    }

    #[test]
    fn no_crumb_in_page() {
        assert_eq!(extract_crumb("<html></html>"), None);
        assert_eq!(extract_crumb("\"CrumbStore\":{\"crumb\":\"\"}"), None);
    }

    #[test]
    fn reuses_until_ttl_then_refreshes() {
        let (cache, clock) = cache(vec![page("one", "c1"), page("two", "c2")]);

        let first = cache.get(false);
        assert_eq!(first.token, "one");
        assert_eq!(first.session_id, "c1");

        clock.advance(179);
        assert_eq!(cache.get(false).token, "one");
        assert_eq!(cache.refresh_count(), 1);

        clock.advance(1);
        assert_eq!(cache.get(false).token, "two");
        assert_eq!(cache.refresh_count(), 2);
    }

    #[test]
    fn force_refresh_ignores_ttl() {
        let (cache, _clock) = cache(vec![page("one", "c1"), page("two", "c2")]);
        assert_eq!(cache.get(false).token, "one");
        let forced = cache.force_refresh();
        assert_eq!(forced.token, "two");
        assert_eq!(forced.session_id, "c2");
    }

    #[test]
    fn missing_crumb_keeps_previous_token() {
        let (cache, _clock) = cache(vec![
            page("one", "c1"),
            Ok(HttpResponse::ok("<html>no crumb</html>").with_cookie("B", "c2")),
        ]);
        cache.get(false);
        let creds = cache.force_refresh();
        assert_eq!(creds.token, "one");
        assert_eq!(creds.session_id, "c2");
    }

    #[test]
    fn first_refresh_without_crumb_yields_empty_token() {
        let (cache, _clock) = cache(vec![Ok(HttpResponse::ok("nothing"))]);
        let creds = cache.get(false);
        assert!(creds.token.is_empty());
        assert!(creds.session_id.is_empty());
        assert_eq!(cache.refresh_count(), 1);
    }

    #[test]
    fn network_failure_is_soft_and_retried_next_time() {
        let (cache, _clock) = cache(vec![
            Err(FetchError::Network("down".into())),
            page("one", "c1"),
        ]);
        let creds = cache.get(false);
        assert!(creds.token.is_empty());
        assert_eq!(cache.refresh_count(), 0);

        assert_eq!(cache.get(false).token, "one");
    }

    #[test]
    fn debug_output_redacts_values() {
        let (cache, _clock) = cache(vec![page("secret-crumb", "secret-cookie")]);
        let rendered = format!("{:?}", cache.get(false));
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("token_len"));
    }
}
