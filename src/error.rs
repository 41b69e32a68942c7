use thiserror::Error;

/// Failures a crawl step can raise. Negative-but-normal results (no next
/// page, an explicit "no results" page, a poll timeout) are outcomes, not errors.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("fetch failed for {url}: {reason}")]
    Fetch {
        url: String,
        status: Option<u16>,
        reason: String,
    },
    #[error("no usable search input on {0}")]
    SearchInputNotFound(String),
    #[error("could not submit query '{0}'")]
    SubmitFailed(String),
    #[error("browser session could not be started: {0}")]
    SessionStart(String),
    #[error("browser error: {0}")]
    Browser(String),
    #[error("frequency tables unavailable: {0}")]
    FrequencyTables(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CrawlError {
    pub fn fetch(url: &str, status: Option<u16>, reason: impl Into<String>) -> Self {
        CrawlError::Fetch {
            url: url.to_string(),
            status,
            reason: reason.into(),
        }
    }
}
