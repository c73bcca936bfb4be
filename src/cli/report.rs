//! Report command implementation

use chrono::{NaiveDate, Utc};
use clap::Args;

use crate::config::Config;
use crate::storage::{SqliteStore, TradeStore};

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// UTC day to report (YYYY-MM-DD); defaults to today
    #[arg(long)]
    pub day: Option<NaiveDate>,
}

impl ReportArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let day = self.day.unwrap_or_else(|| Utc::now().date_naive());
        let store = SqliteStore::open(&config.storage.db_path)?;

        let rollup = store.daily_rollup(day).await?;
        let activations = store
            .load_daily_metrics(day)
            .await?
            .map_or(0, |m| m.kill_switch_activations);

        println!("Daily report for {}", rollup.day);
        println!("  Trades:         {}", rollup.trades);
        println!("  Wins / Losses:  {} / {}", rollup.wins, rollup.losses);
        println!("  Win rate:       {}", rollup.win_rate.round_dp(4));
        println!("  Total PnL:      {}", rollup.total_pnl.round_dp(4));
        println!("  Average PnL:    {}", rollup.avg_pnl.round_dp(4));
        println!("  Exit failures:  {}", rollup.exit_failures);
        println!("  Kill switches:  {}", activations);
        Ok(())
    }
}
