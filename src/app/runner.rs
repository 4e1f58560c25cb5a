use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use chrono::Utc;
use url::Url;

use crate::app::pipeline::{self, Cycle};
use crate::app::queue::{WorkerPool, jitter};
use crate::app::store::TargetStore;
use crate::config::MonitorConfig;
use crate::diff;
use crate::fetch::{FetchError, FetchedPage, PageFetcher};
use crate::formats::MonitoredTarget;
use crate::normalize::Normalizer;
use crate::notification::Notifier;

/// `last_error` value for targets whose robots.txt disallows the page.
pub const BLOCKED_MARKER: &str = "Blocked by robots.txt";

#[derive(Debug, Clone)]
pub struct CheckSettings {
    /// Upper bound on a single page fetch.
    pub fetch_budget: Duration,
    pub summary_max_chars: usize,
    /// Registered before each batch run.
    pub seed_urls: Vec<String>,
}

impl CheckSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            fetch_budget: config.timeout(),
            summary_max_chars: config.summary_max_chars,
            seed_urls: config.seed_urls.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Blocked,
    Failed { error: String },
    Unchanged,
    Changed {
        version_id: String,
        new_item_link: Option<String>,
    },
}

#[derive(Debug)]
pub struct CheckReport {
    pub target_id: String,
    pub url: String,
    /// `Err` only for store or notification failures; fetch problems are
    /// a [`CheckOutcome::Failed`].
    pub outcome: anyhow::Result<CheckOutcome>,
}

pub struct CheckRunner {
    store: Arc<dyn TargetStore>,
    fetcher: Arc<dyn PageFetcher>,
    notifier: Arc<dyn Notifier>,
    normalizer: Normalizer,
    settings: CheckSettings,
}

impl CheckRunner {
    pub fn new(
        store: Arc<dyn TargetStore>,
        fetcher: Arc<dyn PageFetcher>,
        notifier: Arc<dyn Notifier>,
        normalizer: Normalizer,
        settings: CheckSettings,
    ) -> Self {
        Self {
            store,
            fetcher,
            notifier,
            normalizer,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn TargetStore> {
        &self.store
    }

    pub async fn check_one(&self, target_id: &str) -> anyhow::Result<CheckOutcome> {
        let target = self
            .store
            .get(target_id)
            .await
            .context("load target")?
            .ok_or_else(|| anyhow::anyhow!("target not found: {target_id}"))?;
        self.check_target(target).await
    }

    /// Runs one cycle for `target`. Fetch failures end the cycle and are
    /// recorded on the target; persistence and notification errors propagate.
    pub async fn check_target(&self, mut target: MonitoredTarget) -> anyhow::Result<CheckOutcome> {
        let now = Utc::now();
        let page = match self.fetch_allowed(&target).await {
            Ok(Some(page)) => page,
            Ok(None) => {
                tracing::warn!(target_id = %target.id, url = %target.url, "blocked by robots.txt");
                target.last_checked_at = Some(now);
                target.last_error = Some(BLOCKED_MARKER.to_owned());
                self.store.put(&target).await.context("save target")?;
                return Ok(CheckOutcome::Blocked);
            }
            Err(err) => {
                let error = format!("{}: {err}", err.kind());
                tracing::error!(target_id = %target.id, url = %target.url, %error, "check failed");
                target.last_checked_at = Some(now);
                target.last_error = Some(error.clone());
                self.store.put(&target).await.context("save target")?;
                return Ok(CheckOutcome::Failed { error });
            }
        };

        let base_url = Url::parse(&target.url).unwrap_or(page.url);
        let document = self.normalizer.normalize(&page.html, &base_url);

        match pipeline::evaluate(&mut target, &document, now, self.settings.summary_max_chars) {
            Cycle::Unchanged => {
                self.store.put(&target).await.context("save target")?;
                tracing::info!(target_id = %target.id, url = %target.url, "no changes");
                Ok(CheckOutcome::Unchanged)
            }
            Cycle::Changed(changed) => {
                self.store
                    .commit_change(&target, &changed.version)
                    .await
                    .context("save change")?;
                tracing::info!(
                    target_id = %target.id,
                    url = %target.url,
                    hash = %changed.version.content_hash,
                    new_item = ?changed.new_item,
                    baseline = changed.baseline,
                    "change detected"
                );

                self.notifier
                    .deliver(&changed.notification)
                    .await
                    .context("deliver change notification")?;

                Ok(CheckOutcome::Changed {
                    version_id: changed.version.version_id.clone(),
                    new_item_link: changed.new_item.map(|item| item.link),
                })
            }
        }
    }

    /// `Ok(None)` when the site policy disallows the page.
    async fn fetch_allowed(
        &self,
        target: &MonitoredTarget,
    ) -> Result<Option<FetchedPage>, FetchError> {
        let url = Url::parse(&target.url).map_err(|err| FetchError::InvalidUrl {
            url: target.url.clone(),
            reason: err.to_string(),
        })?;

        if !self.fetcher.is_allowed_by_policy(&url).await {
            return Ok(None);
        }

        let budget = self.settings.fetch_budget;
        match tokio::time::timeout(budget, self.fetcher.fetch(&url)).await {
            Ok(result) => result.map(Some),
            Err(_) => Err(FetchError::Timeout {
                url: target.url.clone(),
                budget_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Registers seed URLs, then checks every target through `pool`.
    pub async fn check_all(
        self: &Arc<Self>,
        pool: &WorkerPool,
        jitter_ms_max: u64,
    ) -> anyhow::Result<Vec<CheckReport>> {
        for url in &self.settings.seed_urls {
            self.store
                .register(url)
                .await
                .with_context(|| format!("register seed url: {url}"))?;
        }

        let targets = self.store.list().await.context("list targets")?;
        tracing::info!(targets = targets.len(), "checking all targets");

        let mut pending = Vec::with_capacity(targets.len());
        for target in targets {
            let target_id = target.id.clone();
            let url = target.url.clone();
            let runner = Arc::clone(self);
            let handle = pool.spawn(jitter(jitter_ms_max), async move {
                runner.check_target(target).await
            });
            pending.push((target_id, url, handle));
        }

        let mut reports = Vec::with_capacity(pending.len());
        for (target_id, url, handle) in pending {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(err) => Err(anyhow::anyhow!("check task aborted: {err}")),
            };
            if let Err(err) = &outcome {
                tracing::error!(target_id = %target_id, url = %url, ?err, "target check failed");
            }
            reports.push(CheckReport {
                target_id,
                url,
                outcome,
            });
        }
        Ok(reports)
    }

    /// Renders a stored version against the target's current content.
    pub async fn diff_version(&self, target_id: &str, version_id: &str) -> anyhow::Result<String> {
        let target = self
            .store
            .get(target_id)
            .await
            .context("load target")?
            .ok_or_else(|| anyhow::anyhow!("target not found: {target_id}"))?;
        let version = self
            .store
            .version(target_id, version_id)
            .await
            .context("load version")?
            .ok_or_else(|| anyhow::anyhow!("version not found: {version_id}"))?;

        let current = target.last_normalized_content.unwrap_or_default();
        Ok(diff::summarize(
            Some(&version.content),
            &current,
            self.settings.summary_max_chars,
        ))
    }

    pub async fn send_test_notification(&self) -> anyhow::Result<()> {
        self.notifier
            .deliver_test()
            .await
            .context("deliver test notification")
    }
}
