use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use thiserror::Error;
use url::Url;

use crate::config::MonitorConfig;

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: Url,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("no response from {url} within {budget_ms} ms")]
    Timeout { url: String, budget_ms: u64 },

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("unsupported content type \"{content_type}\" from {url}")]
    NotHtml { content_type: String, url: String },
}

impl FetchError {
    /// Stable name recorded in a target's `last_error`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => "InvalidUrl",
            Self::Timeout { .. } => "Timeout",
            Self::Http(err) if err.is_timeout() => "Timeout",
            Self::Http(_) => "HttpError",
            Self::UnexpectedStatus { .. } => "UnexpectedStatus",
            Self::NotHtml { .. } => "ParseError",
        }
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Site policy check. Never fails: problems reading the policy allow access.
    async fn is_allowed_by_policy(&self, url: &Url) -> bool;

    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .context("build page fetch http client")?;
        Ok(Self { client })
    }

    pub fn from_config(config: &MonitorConfig) -> anyhow::Result<Self> {
        Self::new(&config.user_agent, config.timeout())
    }

    async fn robots_txt(&self, url: &Url) -> anyhow::Result<Option<String>> {
        let robots_url = url.join("/robots.txt").context("build robots.txt url")?;
        let response = self
            .client
            .get(robots_url.clone())
            .send()
            .await
            .with_context(|| format!("GET {robots_url}"))?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let body = response.text().await.context("read robots.txt body")?;
        Ok(Some(body))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn is_allowed_by_policy(&self, url: &Url) -> bool {
        match self.robots_txt(url).await {
            Ok(Some(body)) => robots_allows(&body, url.path()),
            Ok(None) => true,
            Err(err) => {
                tracing::debug!(url = %url, ?err, "robots.txt unavailable; allowing");
                true
            }
        }
    }

    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            let lowered = content_type.to_ascii_lowercase();
            if !(lowered.starts_with("text/html") || lowered.starts_with("application/xhtml+xml")) {
                return Err(FetchError::NotHtml {
                    content_type: content_type.to_owned(),
                    url: url.to_string(),
                });
            }
        }

        let final_url = response.url().clone();
        let html = response.text().await?;
        Ok(FetchedPage {
            url: final_url,
            html,
        })
    }
}

/// Applies the `User-agent: *` groups of a robots.txt: any non-empty
/// `Disallow` value that prefixes `path` blocks it.
pub fn robots_allows(robots_txt: &str, path: &str) -> bool {
    let mut in_wildcard_group = false;
    for line in robots_txt.lines() {
        let line = line.trim();
        if let Some(agent) = directive_value(line, "user-agent:") {
            in_wildcard_group = agent == "*";
        } else if in_wildcard_group
            && let Some(disallowed) = directive_value(line, "disallow:")
            && !disallowed.is_empty()
            && path.starts_with(disallowed)
        {
            return false;
        }
    }
    true
}

fn directive_value<'a>(line: &'a str, directive: &str) -> Option<&'a str> {
    let head = line.get(..directive.len())?;
    if !head.eq_ignore_ascii_case(directive) {
        return None;
    }
    Some(line[directive.len()..].trim())
}
