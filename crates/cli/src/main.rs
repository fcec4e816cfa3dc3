use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ltv_guard_binance::{ApiCredentials, BinanceClient, BinanceGateway};
use ltv_guard_core::config::{AppConfig, AssetPair, StrategyParams};
use ltv_guard_core::ConfigLoader;
use ltv_guard_data::{DatabaseClient, PgStore, StoredAlertDispatcher};
use ltv_guard_orchestrator::CycleDriver;
use ltv_guard_strategy::PortfolioInitializer;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ltv-guard")]
#[command(about = "LTV-banded leveraged yield automation", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the automation loop on the configured interval
    Run,
    /// Run one cycle for a single portfolio and exit
    Cycle {
        #[arg(long)]
        portfolio: i64,
    },
    /// Initialize a new portfolio with USD capital
    Init {
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        capital: Decimal,
    },
    /// Resume automation for a portfolio
    Start {
        #[arg(long)]
        portfolio: i64,
    },
    /// Pause automation for a portfolio
    Stop {
        #[arg(long)]
        portfolio: i64,
    },
    /// Unwind all positions and freeze a portfolio
    EmergencyStop {
        #[arg(long)]
        portfolio: i64,
    },
}

struct App {
    driver: CycleDriver,
    initializer: PortfolioInitializer,
    params: StrategyParams,
    tick_interval: Duration,
}

async fn build_app(config_path: &str) -> Result<App> {
    let config: AppConfig = ConfigLoader::load_from(config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;
    let params = StrategyParams::from_config(&config.strategy, &config.automation)?;
    let pair = AssetPair::from_config(&config.strategy);

    let credentials = ApiCredentials::from_env()?;
    let client = BinanceClient::new(&config.binance, credentials)?;
    let gateway = Arc::new(BinanceGateway::new(client));

    let database = DatabaseClient::connect(&config.database).await?;
    let store = Arc::new(PgStore::new(database.pool()));
    let alerts = Arc::new(StoredAlertDispatcher::new(database.pool()));

    let initializer =
        PortfolioInitializer::new(gateway.clone(), store.clone(), &config.strategy);
    let driver = CycleDriver::new(gateway, store, alerts, pair, params.clone());

    Ok(App {
        driver,
        initializer,
        params,
        tick_interval: Duration::from_secs(config.automation.tick_interval_secs),
    })
}

async fn run_loop(app: &App) -> Result<()> {
    tracing::info!(
        interval_secs = app.tick_interval.as_secs(),
        "automation loop started"
    );
    let mut ticker = tokio::time::interval(app.tick_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match app.driver.run_pass().await {
            Ok(summary) => {
                if !summary.failed.is_empty() {
                    tracing::warn!(failed = ?summary.failed, "pass had failures");
                }
            }
            Err(err) => tracing::error!(error = %err, "automation pass failed"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let app = build_app(&cli.config).await?;

    match cli.command {
        Commands::Run => run_loop(&app).await?,
        Commands::Cycle { portfolio } => match app.driver.run_cycle_now(portfolio).await {
            Ok(Some(outcome)) => {
                tracing::info!(
                    portfolio,
                    tier = outcome.tier.as_str(),
                    ltv = %outcome.ltv,
                    "cycle completed"
                );
            }
            Ok(None) => tracing::warn!(portfolio, "cycle already in flight, nothing run"),
            Err(err) => anyhow::bail!("cycle failed: {err}"),
        },
        Commands::Init { owner, capital } => {
            let outcome = app
                .initializer
                .initialize(owner, capital, &app.params)
                .await
                .map_err(|err| anyhow::anyhow!("initialization failed: {err}"))?;
            tracing::info!(
                portfolio = outcome.portfolio_id,
                total_value = %outcome.total_value,
                "portfolio initialized"
            );
        }
        Commands::Start { portfolio } => {
            app.driver
                .start_automation(portfolio)
                .await
                .map_err(|err| anyhow::anyhow!("start failed: {err}"))?;
        }
        Commands::Stop { portfolio } => {
            app.driver
                .stop_automation(portfolio)
                .await
                .map_err(|err| anyhow::anyhow!("stop failed: {err}"))?;
        }
        Commands::EmergencyStop { portfolio } => {
            let report = app
                .driver
                .emergency_stop(portfolio)
                .await
                .map_err(|err| anyhow::anyhow!("emergency stop failed: {err}"))?;
            tracing::info!(
                portfolio,
                redeemed = report.redeemed.len(),
                repaid = report.repaid.len(),
                "portfolio unwound and frozen"
            );
        }
    }

    Ok(())
}
