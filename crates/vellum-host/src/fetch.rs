//! The guarded fetch proxy.
//!
//! The sandboxed renderer has no network access; every data request it
//! makes arrives at the host as a `guardedFetchRequest` and is answered
//! through a [`GuardedFetcher`]. The host decides what to actually
//! fetch, so URL policy (allowlists, offline bundles) lives in the
//! fetcher implementation, not in document-controlled code.

use std::collections::HashMap;
use std::time::Duration;
use vellum_api::FetchOptions;

/// What a fetch produced, minus the request correlation id (the
/// sandbox wrapper fills that in).
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub status: u16,
    pub body: Option<String>,
    pub error: Option<String>,
}

impl FetchOutcome {
    pub fn ok(status: u16, body: String) -> Self {
        Self {
            status,
            body: Some(body),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: 0,
            body: None,
            error: Some(message.into()),
        }
    }
}

pub trait GuardedFetcher {
    fn fetch(&self, url: &str, options: Option<&FetchOptions>) -> FetchOutcome;
}

/// Real HTTP fetcher. Transport failures come back as error outcomes,
/// never as panics; non-2xx statuses are passed through for the
/// renderer to report.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardedFetcher for HttpFetcher {
    fn fetch(&self, url: &str, options: Option<&FetchOptions>) -> FetchOutcome {
        let method = options
            .and_then(|o| o.method.as_deref())
            .unwrap_or("GET")
            .to_ascii_uppercase();
        let method = match method.parse::<reqwest::Method>() {
            Ok(method) => method,
            Err(err) => return FetchOutcome::error(format!("bad method: {err}")),
        };
        let mut request = self.client.request(method, url);
        if let Some(options) = options {
            if let Some(headers) = &options.headers {
                for (name, value) in headers {
                    request = request.header(name, value);
                }
            }
            if let Some(body) = &options.body {
                request = request.body(body.clone());
            }
        }
        match request.send() {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.text() {
                    Ok(body) => FetchOutcome::ok(status, body),
                    Err(err) => FetchOutcome::error(err.to_string()),
                }
            }
            Err(err) => FetchOutcome::error(err.to_string()),
        }
    }
}

/// Table-backed fetcher for tests and offline bundles: URLs not in the
/// table get a 404.
#[derive(Debug, Default)]
pub struct TableFetcher {
    responses: HashMap<String, (u16, String)>,
}

impl TableFetcher {
    pub fn with(mut self, url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        self.responses.insert(url.into(), (status, body.into()));
        self
    }
}

impl GuardedFetcher for TableFetcher {
    fn fetch(&self, url: &str, _options: Option<&FetchOptions>) -> FetchOutcome {
        match self.responses.get(url) {
            Some((status, body)) => FetchOutcome::ok(*status, body.clone()),
            None => FetchOutcome {
                status: 404,
                body: None,
                error: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_fetcher_answers_known_urls() {
        let fetcher = TableFetcher::default().with("https://example.com/a.csv", 200, "x\n1\n");
        let hit = fetcher.fetch("https://example.com/a.csv", None);
        assert_eq!(hit.status, 200);
        assert_eq!(hit.body.as_deref(), Some("x\n1\n"));

        let miss = fetcher.fetch("https://example.com/missing", None);
        assert_eq!(miss.status, 404);
        assert!(miss.body.is_none());
    }
}
