//! HTTP transport seam.
//!
//! Everything that touches the network goes through [`HttpTransport`] so the
//! credential cache and the fetcher can be driven by a scripted transport in tests.

use super::provider::FetchError;
use crate::config::FetchConfig;
use reqwest::header::COOKIE;
use std::time::Duration;

/// A fully-read HTTP response.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// Cookies set by the response, as `(name, value)`.
    pub cookies: Vec<(String, String)>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            cookies: Vec::new(),
        }
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Value of the last cookie set under `name`.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Blocking GET with explicit request cookies.
pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str, cookies: &[(&str, &str)]) -> Result<HttpResponse, FetchError>;
}

/// `reqwest::blocking` transport.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, cookies: &[(&str, &str)]) -> Result<HttpResponse, FetchError> {
        let mut request = self.client.get(url);
        if !cookies.is_empty() {
            let header = cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header(COOKIE, header);
        }

        let resp = request
            .send()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let status = resp.status().as_u16();
        let cookies = resp
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        let body = resp
            .text()
            .map_err(|e| FetchError::Network(format!("reading body: {e}")))?;

        Ok(HttpResponse {
            status,
            body,
            cookies,
        })
    }
}
