use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use time::OffsetDateTime;

use fieldwatch::notify::SlackNotifier;
use fieldwatch::{
    Cli, Config, FetchPool, HttpPageFetcher, Notifier, Pipeline, RowExtractor, logging, merge,
    store,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init()?;
    let config = Config::from_cli(cli).context("invalid configuration")?;

    let strategy = merge::strategy_for(config.merge, OffsetDateTime::now_utc().date());
    let store = store::open(&config.store, strategy.header())?;
    let fetcher = Arc::new(HttpPageFetcher::new(&config)?);
    let pool = FetchPool::new(fetcher, Arc::new(RowExtractor::new()?), config.concurrency);
    let notifier = config.webhook.clone().map(SlackNotifier::new).transpose()?;

    let pipeline = Pipeline {
        config: &config,
        store: store.as_ref(),
        strategy: strategy.as_ref(),
        pool: &pool,
        notifier: notifier.as_ref().map(|n| n as &dyn Notifier),
    };
    let summary = pipeline
        .run()
        .await
        .context("record store unavailable, nothing was fetched")?;
    summary.log();
    Ok(())
}
