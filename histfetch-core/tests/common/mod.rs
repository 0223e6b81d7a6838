//! Scripted transport and manual clock shared by the integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use histfetch_core::data::{Clock, DownloadProgress, FetchError, HttpResponse, HttpTransport};
use histfetch_core::FetchConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

pub const BOOTSTRAP_URL: &str = "http://bootstrap.test/quote/SPY/history";
pub const DOWNLOAD_URL: &str = "http://download.test/v7/finance/download";

pub fn test_config() -> FetchConfig {
    FetchConfig {
        bootstrap_url: BOOTSTRAP_URL.into(),
        download_url: DOWNLOAD_URL.into(),
        throttle_ms: 0,
        ..FetchConfig::default()
    }
}

/// Scripted reply for one download request.
#[derive(Debug, Clone)]
pub enum Reply {
    Csv(String),
    Status(u16),
    Unreachable,
}

/// One recorded request.
#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub symbol: Option<String>,
    pub crumb: Option<String>,
    pub cookies: Vec<(String, String)>,
}

/// In-memory data source.
///
/// The n-th bootstrap request (1-based) issues crumb `crumb-n` and cookie
/// `cookie-n`. Download replies are scripted per symbol and consumed in order;
/// once a symbol's script runs out its last reply repeats. Unscripted symbols
/// are unreachable.
#[derive(Default)]
pub struct ScriptedTransport {
    bootstraps: Mutex<u32>,
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, symbol: &str, replies: Vec<Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(symbol.to_string(), replies.into());
    }

    pub fn bootstrap_count(&self) -> u32 {
        *self.bootstraps.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Symbols of the download requests, in order.
    pub fn download_sequence(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.symbol)
            .collect()
    }

    fn next_reply(&self, symbol: &str) -> Reply {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(symbol) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Reply::Unreachable),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::Unreachable),
            None => Reply::Unreachable,
        }
    }
}

impl HttpTransport for ScriptedTransport {
    fn get(&self, url: &str, cookies: &[(&str, &str)]) -> Result<HttpResponse, FetchError> {
        let cookies: Vec<(String, String)> = cookies
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect();

        if url == BOOTSTRAP_URL {
            let n = {
                let mut count = self.bootstraps.lock().unwrap();
                *count += 1;
                *count
            };
            self.calls.lock().unwrap().push(Call {
                url: url.to_string(),
                symbol: None,
                crumb: None,
                cookies,
            });
            let body = format!(
                "<html>\n<script>root.App.main = {{\"context\":{{\"dispatcher\":{{\"stores\":{{\"CrumbStore\":{{\"crumb\":\"crumb-{n}\"}}}}}}}}}};</script>\n</html>"
            );
            return Ok(HttpResponse::ok(body).with_cookie("B", format!("cookie-{n}")));
        }

        let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::Network(e.to_string()))?;
        let symbol = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string();
        let crumb = parsed
            .query_pairs()
            .find(|(k, _)| k == "crumb")
            .map(|(_, v)| v.into_owned());
        self.calls.lock().unwrap().push(Call {
            url: url.to_string(),
            symbol: Some(symbol.clone()),
            crumb,
            cookies,
        });

        match self.next_reply(&symbol) {
            Reply::Csv(body) => Ok(HttpResponse::ok(body)),
            Reply::Status(status) => Ok(HttpResponse {
                status,
                body: String::new(),
                cookies: Vec::new(),
            }),
            Reply::Unreachable => Err(FetchError::Network(format!("{symbol}: connection refused"))),
        }
    }
}

/// Clock that only moves when told to.
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new() -> Self {
        Self(Mutex::new(
            DateTime::parse_from_rfc3339("2024-06-03T14:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
        ))
    }

    pub fn advance_secs(&self, secs: i64) {
        *self.0.lock().unwrap() += chrono::Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Progress reporter that counts calls.
#[derive(Debug, Default)]
pub struct CountingProgress {
    pub advances: usize,
    pub finished: bool,
}

impl DownloadProgress for CountingProgress {
    fn advance(&mut self) {
        self.advances += 1;
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

/// CSV body with one row per `(date, close)`; open/high/low derived from close,
/// adjusted close at half the close.
pub fn csv(rows: &[(&str, f64)]) -> String {
    let mut body = String::from("Date,Open,High,Low,Close,Adj Close,Volume");
    for (date, close) in rows {
        body.push_str(&format!(
            "\n{date},{},{},{},{close},{},{}",
            close - 1.0,
            close + 1.0,
            close - 2.0,
            close / 2.0,
            1_000_000
        ));
    }
    body
}

pub fn ok(rows: &[(&str, f64)]) -> Reply {
    Reply::Csv(csv(rows))
}
