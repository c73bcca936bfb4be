//! Run command implementation

use clap::Args;
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::{Config, ExecutionMode};
use crate::engine::{Collaborators, Engine};
use crate::execution::{ArenaClient, ExecutionClient, PaperEngine};
use crate::feed::{BinanceFeed, PriceFeed};
use crate::market::PolyscanClient;
use crate::storage::SqliteStore;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run a single tick and exit
    #[arg(long)]
    pub once: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let engine_config = &config.engine;

        let market = Arc::new(PolyscanClient::new(
            config.market.clone(),
            engine_config.market_timeout(),
        )?);

        let execution: Arc<dyn ExecutionClient> = match engine_config.mode {
            ExecutionMode::Paper => Arc::new(PaperEngine::new(
                config.risk.initial_portfolio_value,
                config.pricing.fee_rate,
            )),
            ExecutionMode::Arena => Arc::new(ArenaClient::new(
                &config.market,
                engine_config.execution_timeout(),
            )?),
        };

        let store = Arc::new(SqliteStore::open(&config.storage.db_path)?);

        let feed = BinanceFeed::new(config.feed.symbol.clone(), config.feed.channel_capacity);
        let rx = feed.subscribe().await?;

        tracing::info!(
            mode = engine_config.mode.as_str(),
            symbol = %config.feed.symbol,
            db = %config.storage.db_path.display(),
            "Collaborators ready"
        );

        let collaborators = Collaborators {
            market,
            execution,
            store,
        };
        let mut engine = Engine::new(config, rx, collaborators, chrono::Utc::now());

        if self.once {
            let report = engine.run_once().await;
            tracing::info!(?report, "Single tick complete");
            engine.shutdown().await?;
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
                return;
            }
            tracing::info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        });

        engine.run(shutdown_rx).await?;
        Ok(())
    }
}
