use std::path::Path;

use anyhow::Result;

use credit_radar::config::Config;
use credit_radar::pipeline::{CycleOrchestrator, TickerSubstringMatcher};
use credit_radar::sources::rss::RssNewsClient;
use credit_radar::sources::worldbank::WorldBankClient;
use credit_radar::sources::yahoo::YahooMarketData;
use credit_radar::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Make sure config/default.toml exists (or set CREDIT_RADAR_CONFIG)");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                config
                    .logging
                    .level
                    .parse()
                    .unwrap_or_else(|_| "info".parse().unwrap())
            }),
        )
        .init();

    tracing::info!(
        issuers = ?config.pipeline.tracked_tickers(),
        interval_secs = config.pipeline.effective_interval().as_secs(),
        database = %config.database.path,
        "starting credit-radar"
    );

    let timeout = config.sources.request_timeout();
    let market = YahooMarketData::new(&config.sources.market_base_url, timeout)?;
    let macro_source = WorldBankClient::new(&config.sources.macro_base_url, timeout)?;
    let news = RssNewsClient::new(timeout)?;
    let store = Store::open(Path::new(&config.database.path))?;

    let mut orchestrator = CycleOrchestrator::new(
        &config,
        market,
        macro_source,
        news,
        Box::new(TickerSubstringMatcher),
        store,
    );
    orchestrator.run().await;
    Ok(())
}
