//! Trading Consultant
//!
//! Screens the S&P 500 on fundamentals once a day and writes an LLM
//! consultation report for the survivors.

use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trading_consultant::{
    client::{TradingViewClient, YahooClient},
    config::Config,
    model::{ConsultationModel, LlmModel},
    notify::Notifier,
    pipeline::Pipeline,
};

#[derive(Parser)]
#[command(name = "trading-consultant")]
#[command(about = "Daily stock analysis daemon")]
struct Cli {
    /// Run a single analysis cycle and exit
    #[arg(long)]
    once: bool,

    /// Limit number of tickers for quick dry runs
    #[arg(long)]
    limit: Option<usize>,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;
    if config.debug_mode {
        tracing::info!("DEBUG_MODE on: every filter comparison will be logged");
    }

    let schedule = config.schedule.clone();
    let pipeline = build_pipeline(config)?;

    if cli.once {
        pipeline.run_cycle(cli.limit, Utc::now()).await?;
        return Ok(());
    }

    tracing::info!("Starting scheduler ({} UTC daily)", schedule.daily_at);
    loop {
        let now = Utc::now();
        let next = schedule.next_run_after(now)?;
        tracing::info!("Next analysis cycle at {}", next);

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                return Ok(());
            }
        }

        // Failures are reported by the pipeline; keep the schedule going
        if let Err(e) = pipeline.run_cycle(cli.limit, Utc::now()).await {
            tracing::error!("Scheduled cycle failed: {}", e);
        }
    }
}

fn build_pipeline(config: Config) -> anyhow::Result<Pipeline> {
    let notifier = if let Some(tg) = &config.telegram {
        Notifier::new(tg.bot_token.clone(), tg.chat_id.clone())
    } else {
        tracing::warn!("Telegram not configured, notifications disabled");
        Notifier::disabled()
    };

    let market = Arc::new(YahooClient::new(&config.data)?);
    let technicals = Arc::new(TradingViewClient::new(&config.data)?);
    let model = Arc::new(LlmModel::from_config(&config.llm)?);
    tracing::info!("Consultation provider: {}", model.name());

    Ok(Pipeline::new(config, market, technicals, model, notifier))
}
