use clap::Parser;
use poly_latency::cli::{Cli, Commands};
use poly_latency::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            toml::from_str(include_str!("../config.toml.example"))?
        }
    };

    poly_latency::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!(mode = config.engine.mode.as_str(), "Starting trading loop");
            args.execute(&config).await?;
        }
        Commands::Report(args) => {
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Feed: {} {}", config.feed.exchange, config.feed.symbol);
            println!(
                "  Signal: window={}s trigger={}bps",
                config.signal.window_seconds, config.signal.trigger_bps
            );
            println!("  Markets: {} ({})", config.market.base_url, config.market.category);
            println!("  Execution: {}", config.engine.mode.as_str());
            println!(
                "  Budget: default=${} max=${} daily=${}",
                config.budget.default_buy_usd,
                config.budget.max_buy_usd,
                config.budget.max_daily_spend_usd
            );
            println!(
                "  Exits: tp={}c sl={}c max_hold={}s",
                config.exit.take_profit_cents,
                config.exit.stop_loss_cents,
                config.exit.max_hold_seconds
            );
            println!("  Storage: {}", config.storage.db_path.display());
        }
    }

    Ok(())
}
