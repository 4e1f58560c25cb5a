use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    pagewatch::logging::init().context("init logging")?;

    let cli = pagewatch::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let mut config = pagewatch::config::MonitorConfig::from_env().context("load config")?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir.into();
    }
    tracing::debug!(?config, "loaded config");

    pagewatch::commands::run(cli.command, config).await
}
