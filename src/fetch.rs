use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use tracing::{debug, warn};

use crate::error::CrawlError;
use crate::request::{Method, RequestDescriptor};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const TIMEOUT: Duration = Duration::from_secs(25);
const MAX_RETRIES: u32 = 2;
const BASE_BACKOFF_MS: u64 = 1500;

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
    pub latency_ms: u64,
}

/// Turns a request descriptor into page content. Anything but a 200 is an error.
pub trait Fetcher {
    fn fetch(&self, req: &RequestDescriptor) -> Result<FetchedPage, CrawlError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(referer: Option<&str>) -> Result<Self, CrawlError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9,pt-BR;q=0.8"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        if let Some(r) = referer.and_then(|r| HeaderValue::from_str(r).ok()) {
            headers.insert(REFERER, r);
        }
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(TIMEOUT)
            .cookie_store(true)
            .build()
            .map_err(|e| CrawlError::fetch("-", None, format!("http client: {e}")))?;
        Ok(HttpFetcher { client })
    }

    fn fetch_once(&self, req: &RequestDescriptor) -> Result<FetchedPage, CrawlError> {
        let builder = match req.method {
            Method::Get => self.client.get(&req.url),
            Method::Post => self.client.post(&req.url).form(&req.body.clone().unwrap_or_default()),
        };

        let start = Instant::now();
        let resp = builder
            .send()
            .map_err(|e| CrawlError::fetch(&req.url, None, e.to_string()))?;
        let status = resp.status().as_u16();
        let url = resp.url().to_string();
        let body = resp
            .text()
            .map_err(|e| CrawlError::fetch(&req.url, Some(status), e.to_string()))?;
        let latency_ms = start.elapsed().as_millis() as u64;

        if status != 200 {
            return Err(CrawlError::fetch(&req.url, Some(status), format!("HTTP {status}")));
        }
        debug!(url = %url, status, latency_ms, bytes = body.len(), "fetched");
        Ok(FetchedPage {
            url,
            status,
            body,
            latency_ms,
        })
    }
}

fn is_retryable(err: &CrawlError) -> bool {
    matches!(err, CrawlError::Fetch { status: Some(s), .. } if *s == 429 || (500..=503).contains(s))
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, req: &RequestDescriptor) -> Result<FetchedPage, CrawlError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(req) {
                Err(e) if is_retryable(&e) && attempt < MAX_RETRIES => {
                    let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                    warn!(
                        "Throttled on {} (attempt {}/{}), backing off {:.1}s",
                        req.url,
                        attempt + 1,
                        MAX_RETRIES,
                        backoff.as_secs_f64()
                    );
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    use super::*;

    /// Serves canned bodies by URL (GET) or fingerprint (POST) and records every request.
    #[derive(Default)]
    pub struct FakeFetcher {
        pub pages: HashMap<String, String>,
        /// Request URL -> final URL, applied before the page lookup.
        pub redirects: HashMap<String, String>,
        pub calls: Rc<RefCell<Vec<RequestDescriptor>>>,
    }

    impl FakeFetcher {
        pub fn page(mut self, key: &str, body: &str) -> Self {
            self.pages.insert(key.to_string(), body.to_string());
            self
        }

        pub fn redirect(mut self, from: &str, to: &str) -> Self {
            self.redirects.insert(from.to_string(), to.to_string());
            self
        }
    }

    impl Fetcher for FakeFetcher {
        fn fetch(&self, req: &RequestDescriptor) -> Result<FetchedPage, CrawlError> {
            self.calls.borrow_mut().push(req.clone());
            let url = self.redirects.get(&req.url).unwrap_or(&req.url);
            let body = self
                .pages
                .get(url)
                .or_else(|| self.pages.get(&req.fingerprint()))
                .ok_or_else(|| CrawlError::fetch(&req.url, Some(404), "HTTP 404"))?;
            Ok(FetchedPage {
                url: url.clone(),
                status: 200,
                body: body.clone(),
                latency_ms: 0,
            })
        }
    }

    #[test]
    fn only_throttling_is_retried() {
        assert!(is_retryable(&CrawlError::fetch("u", Some(429), "x")));
        assert!(is_retryable(&CrawlError::fetch("u", Some(503), "x")));
        assert!(!is_retryable(&CrawlError::fetch("u", Some(404), "x")));
        assert!(!is_retryable(&CrawlError::fetch("u", None, "timeout")));
    }
}
