//! Command handlers behind the CLI. Output is plain text on stdout.

use std::sync::Arc;

use anyhow::Context as _;
use url::Url;

use crate::app::queue::WorkerPool;
use crate::app::runner::{CheckOutcome, CheckRunner, CheckSettings};
use crate::app::scheduler::{self, BatchStats};
use crate::app::store::{LocalFsTargetStore, TargetStore};
use crate::cli::{AddArgs, Command, DiffArgs, TargetArgs};
use crate::config::MonitorConfig;
use crate::fetch::HttpFetcher;

pub async fn run(command: Command, config: MonitorConfig) -> anyhow::Result<()> {
    let store: Arc<dyn TargetStore> = Arc::new(LocalFsTargetStore::new(&config.data_dir));

    match command {
        Command::Add(args) => add(store.as_ref(), args).await.context("add"),
        Command::Remove(args) => remove(store.as_ref(), args).await.context("remove"),
        Command::List => list(store.as_ref()).await.context("list"),
        Command::Versions(args) => versions(store.as_ref(), args).await.context("versions"),
        Command::Diff(args) => diff(&runner(store, &config)?, args).await.context("diff"),
        Command::Check(args) => check(&runner(store, &config)?, args).await.context("check"),
        Command::CheckAll => check_all(Arc::new(runner(store, &config)?), &config)
            .await
            .context("check-all"),
        Command::Watch => watch(Arc::new(runner(store, &config)?), &config)
            .await
            .context("watch"),
        Command::TestNotify => runner(store, &config)?
            .send_test_notification()
            .await
            .map(|()| println!("test notification sent"))
            .context("test-notify"),
    }
}

fn runner(store: Arc<dyn TargetStore>, config: &MonitorConfig) -> anyhow::Result<CheckRunner> {
    let fetcher = HttpFetcher::from_config(config).context("build fetcher")?;
    let notifier = config.notifier().context("build notifier")?;
    Ok(CheckRunner::new(
        store,
        Arc::new(fetcher),
        notifier,
        config.normalizer(),
        CheckSettings::from_config(config),
    ))
}

async fn add(store: &dyn TargetStore, args: AddArgs) -> anyhow::Result<()> {
    let url = args.url.trim();
    let parsed = Url::parse(url).with_context(|| format!("parse url: {url}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("url must be http or https: {url}");
    }

    let target = store.register(url).await?;
    println!("{}\t{}", target.id, target.url);
    Ok(())
}

async fn remove(store: &dyn TargetStore, args: TargetArgs) -> anyhow::Result<()> {
    if !store.delete(&args.id).await? {
        anyhow::bail!("target not found: {}", args.id);
    }
    println!("removed {}", args.id);
    Ok(())
}

async fn list(store: &dyn TargetStore) -> anyhow::Result<()> {
    for target in store.list().await? {
        let checked = target
            .last_checked_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "-".to_owned());
        let error = target.last_error.as_deref().unwrap_or("-");
        println!("{}\t{}\t{checked}\t{error}", target.id, target.url);
    }
    Ok(())
}

async fn versions(store: &dyn TargetStore, args: TargetArgs) -> anyhow::Result<()> {
    if store.get(&args.id).await?.is_none() {
        anyhow::bail!("target not found: {}", args.id);
    }
    for version in store.versions(&args.id).await? {
        println!(
            "{}\t{}\t{}",
            version.version_id,
            version.created_at.to_rfc3339(),
            version.content_hash
        );
    }
    Ok(())
}

async fn diff(runner: &CheckRunner, args: DiffArgs) -> anyhow::Result<()> {
    let rendered = runner.diff_version(&args.id, &args.version).await?;
    println!("{rendered}");
    Ok(())
}

async fn check(runner: &CheckRunner, args: TargetArgs) -> anyhow::Result<()> {
    let outcome = runner.check_one(&args.id).await?;
    println!("{}\t{}", args.id, describe(&outcome));
    Ok(())
}

async fn check_all(runner: Arc<CheckRunner>, config: &MonitorConfig) -> anyhow::Result<()> {
    let pool = WorkerPool::new(config.max_concurrency);
    let reports = runner.check_all(&pool, config.jitter_ms_max).await?;

    for report in &reports {
        let line = match &report.outcome {
            Ok(outcome) => describe(outcome),
            Err(err) => format!("error: {err:#}"),
        };
        println!("{}\t{}\t{line}", report.target_id, report.url);
    }

    let stats = BatchStats::from_reports(&reports);
    if reports.iter().any(|report| report.outcome.is_err()) {
        anyhow::bail!("{} of {} checks did not complete", stats.failed, reports.len());
    }
    Ok(())
}

async fn watch(runner: Arc<CheckRunner>, config: &MonitorConfig) -> anyhow::Result<()> {
    let pool = WorkerPool::new(config.max_concurrency);
    tracing::info!(
        interval_minutes = config.interval_minutes,
        max_concurrency = config.max_concurrency,
        "watching targets"
    );
    scheduler::watch(runner, pool, config.jitter_ms_max, config.interval(), async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(?err, "listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    })
    .await;
    Ok(())
}

fn describe(outcome: &CheckOutcome) -> String {
    match outcome {
        CheckOutcome::Blocked => "blocked".to_owned(),
        CheckOutcome::Failed { error } => format!("failed: {error}"),
        CheckOutcome::Unchanged => "unchanged".to_owned(),
        CheckOutcome::Changed {
            new_item_link: Some(link),
            ..
        } => format!("changed\t{link}"),
        CheckOutcome::Changed { .. } => "changed".to_owned(),
    }
}
