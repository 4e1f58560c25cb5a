use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;

use crate::diff::DEFAULT_MAX_CHARS;
use crate::normalize::Normalizer;
use crate::notification::{LogNotifier, Notifier, SendGridNotifier};

pub const DEFAULT_DATA_DIR: &str = "./pagewatch-data";
pub const DEFAULT_USER_AGENT: &str = "pagewatch/0.1 (+change monitor)";
pub const DEFAULT_SENDGRID_BASE_URL: &str = "https://api.sendgrid.com";

const DEFAULT_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_INTERVAL_MINUTES: u64 = 15;
const DEFAULT_JITTER_MS_MAX: u64 = 3_000;
const DEFAULT_MAX_CONCURRENCY: usize = 4;

#[derive(Clone)]
pub struct MonitorConfig {
    pub data_dir: PathBuf,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub interval_minutes: u64,
    pub jitter_ms_max: u64,
    pub max_concurrency: usize,
    pub summary_max_chars: usize,
    pub seed_urls: Vec<String>,
    pub headline_hosts: Vec<String>,
    pub mail_from: Option<String>,
    pub mail_to: Vec<String>,
    pub sendgrid_api_key: Option<String>,
    pub sendgrid_base_url: String,
}

impl fmt::Debug for MonitorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorConfig")
            .field("data_dir", &self.data_dir)
            .field("user_agent", &self.user_agent)
            .field("timeout_ms", &self.timeout_ms)
            .field("interval_minutes", &self.interval_minutes)
            .field("jitter_ms_max", &self.jitter_ms_max)
            .field("max_concurrency", &self.max_concurrency)
            .field("summary_max_chars", &self.summary_max_chars)
            .field("seed_urls", &self.seed_urls)
            .field("headline_hosts", &self.headline_hosts)
            .field("mail_from", &self.mail_from)
            .field("mail_to", &self.mail_to)
            .field(
                "sendgrid_api_key",
                &self.sendgrid_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("sendgrid_base_url", &self.sendgrid_base_url)
            .finish()
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            jitter_ms_max: DEFAULT_JITTER_MS_MAX,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            summary_max_chars: DEFAULT_MAX_CHARS,
            seed_urls: Vec::new(),
            headline_hosts: Vec::new(),
            mail_from: None,
            mail_to: Vec::new(),
            sendgrid_api_key: None,
            sendgrid_base_url: DEFAULT_SENDGRID_BASE_URL.to_owned(),
        }
    }
}

impl MonitorConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::build(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn build<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            data_dir: get("PAGEWATCH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            user_agent: get("PAGEWATCH_USER_AGENT").unwrap_or(defaults.user_agent),
            timeout_ms: parse_nonzero_or(
                "PAGEWATCH_TIMEOUT_MS",
                get("PAGEWATCH_TIMEOUT_MS"),
                defaults.timeout_ms,
            )?,
            interval_minutes: parse_nonzero_or(
                "PAGEWATCH_INTERVAL_MINUTES",
                get("PAGEWATCH_INTERVAL_MINUTES"),
                defaults.interval_minutes,
            )?,
            jitter_ms_max: parse_or(
                "PAGEWATCH_JITTER_MS_MAX",
                get("PAGEWATCH_JITTER_MS_MAX"),
                defaults.jitter_ms_max,
            )?,
            max_concurrency: parse_or(
                "PAGEWATCH_MAX_CONCURRENCY",
                get("PAGEWATCH_MAX_CONCURRENCY"),
                defaults.max_concurrency,
            )?,
            summary_max_chars: parse_or(
                "PAGEWATCH_SUMMARY_MAX_CHARS",
                get("PAGEWATCH_SUMMARY_MAX_CHARS"),
                defaults.summary_max_chars,
            )?,
            seed_urls: split_list(get("PAGEWATCH_SEED_URLS")),
            headline_hosts: split_list(get("PAGEWATCH_HEADLINE_HOSTS")),
            mail_from: get("PAGEWATCH_MAIL_FROM"),
            mail_to: split_list(get("PAGEWATCH_MAIL_TO")),
            sendgrid_api_key: get("SENDGRID_API_KEY"),
            sendgrid_base_url: get("PAGEWATCH_SENDGRID_BASE_URL")
                .unwrap_or(defaults.sendgrid_base_url),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.headline_hosts.clone())
    }

    /// SendGrid when an API key is configured, otherwise log-only delivery.
    pub fn notifier(&self) -> anyhow::Result<Arc<dyn Notifier>> {
        let Some(api_key) = self.sendgrid_api_key.clone() else {
            tracing::debug!("SENDGRID_API_KEY not set; notifications are logged only");
            return Ok(Arc::new(LogNotifier));
        };
        let from = self
            .mail_from
            .clone()
            .context("PAGEWATCH_MAIL_FROM is required when SENDGRID_API_KEY is set")?;
        let notifier = SendGridNotifier::new(
            &self.sendgrid_base_url,
            api_key,
            from,
            self.mail_to.clone(),
            self.timeout(),
        )?;
        Ok(Arc::new(notifier))
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

fn parse_nonzero_or(key: &str, raw: Option<String>, default: u64) -> anyhow::Result<u64> {
    let value = parse_or(key, raw, default)?;
    anyhow::ensure!(value > 0, "invalid value for {key}: must be greater than zero");
    Ok(value)
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_owned)
            .collect()
    })
    .unwrap_or_default()
}
