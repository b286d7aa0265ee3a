use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;
use ukci_core::{NewTenant, SubscriptionTier};
use ukci_monitor::{Monitor, MonitorConfig};
use ukci_store::{MonitorStore, PgStore};
use ukci_web::AppState;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "ukci-cli")]
#[command(about = "Companies House monitoring command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Web API, plus cron jobs when UKCI_SCHEDULER_ENABLED is set.
    Serve,
    /// Cron jobs only, until Ctrl-C.
    Worker,
    /// One due pass, optionally for a single tenant.
    CheckDue {
        #[arg(long)]
        tenant: Option<Uuid>,
    },
    /// Checks one company now, ignoring the interval.
    Check { company_id: Uuid },
    /// Alert retention sweep and unread digest.
    Sweep,
    Migrate,
    Search {
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    CreateTenant {
        name: String,
        #[arg(long, default_value = "free")]
        tier: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ukci=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = MonitorConfig::from_env();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Migrate => {
            connect(&config).await?;
            println!("migrations applied");
        }
        Commands::CreateTenant { name, tier } => {
            let subscription_tier = tier
                .parse::<SubscriptionTier>()
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            let store = connect(&config).await?;
            let tenant = store
                .create_tenant(NewTenant {
                    name,
                    subscription_tier,
                })
                .await
                .context("creating tenant")?;
            println!("tenant created: id={} slug={}", tenant.id, tenant.slug);
        }
        Commands::Search { query, limit } => {
            let registry = config.build_registry().await?;
            let results = registry
                .search_companies(&query, limit)
                .await
                .context("searching the registry")?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Check { company_id } => {
            let monitor = monitor(&config).await?;
            let summary = monitor
                .scheduler()
                .check_now(company_id)
                .await
                .with_context(|| format!("checking company {company_id}"))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::CheckDue { tenant } => {
            let monitor = monitor(&config).await?;
            let batch = monitor
                .scheduler()
                .run_due_pass(tenant)
                .await
                .context("running due pass")?;
            println!(
                "due pass complete: selected={} succeeded={} failed={} not_found={} alerts={}",
                batch.selected, batch.succeeded, batch.failed, batch.not_found, batch.alerts_created
            );
        }
        Commands::Sweep => {
            let monitor = monitor(&config).await?;
            let report = monitor.sweeper().sweep(Utc::now()).await?;
            monitor.sweeper().unread_digest().await?;
            println!(
                "sweep complete: read_expired={} past_expiry={}",
                report.read_expired, report.past_expiry
            );
        }
        Commands::Worker => {
            let monitor = monitor(&config).await?;
            let config = MonitorConfig {
                scheduler_enabled: true,
                ..config
            };
            let sched = monitor
                .maybe_build_scheduler(&config)
                .await?
                .context("scheduler disabled")?;
            sched.start().await.context("starting scheduler")?;
            info!("worker running; press Ctrl-C to stop");
            signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            info!("worker stopping");
        }
        Commands::Serve => {
            let monitor = monitor(&config).await?;
            if let Some(sched) = monitor.maybe_build_scheduler(&config).await? {
                sched.start().await.context("starting scheduler")?;
            }
            ukci_web::serve(AppState::new(monitor), config.web_port).await?;
        }
    }

    Ok(())
}

async fn connect(config: &MonitorConfig) -> Result<Arc<PgStore>> {
    let store = PgStore::connect(&config.database_url, 10)
        .await
        .context("connecting to database")?;
    store.migrate().await.context("applying migrations")?;
    Ok(Arc::new(store))
}

async fn monitor(config: &MonitorConfig) -> Result<Arc<Monitor>> {
    let store = connect(config).await?;
    let monitor = Monitor::from_config(config, store)
        .await
        .context("building monitor")?;
    Ok(Arc::new(monitor))
}
