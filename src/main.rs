//! Service entry point.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use training_job_manager::api::{self, ApiServer, ApiState};
use training_job_manager::auth::{IdentityResolver, JwksConfig, JwksResolver, ServiceToken};
use training_job_manager::config::Config;
use training_job_manager::db::{JobStore, MemoryJobStore, PgJobStore};
use training_job_manager::jobs::JobManager;
use training_job_manager::queue::{HttpQueueConfig, HttpWorkQueue, SimulatedQueue, WorkQueue};

const DEFAULT_LOG_FILTER: &str = "training_job_manager=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(name = "training-job-manager", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")));

    let config = Config::from_env().context("invalid configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Migrate => migrate(config).await,
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn migrate(config: Config) -> anyhow::Result<()> {
    let database = config
        .database
        .as_ref()
        .context("DATABASE_URL must be set to run migrations")?;
    let store = PgJobStore::new(database).await?;
    store.run_migrations().await?;
    tracing::info!("Migrations applied");
    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    config.require_identity_provider()?;

    let store: Arc<dyn JobStore> = match &config.database {
        Some(database) => {
            let store = PgJobStore::new(database).await?;
            store.run_migrations().await?;
            tracing::info!("Connected to PostgreSQL job store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, jobs are kept in memory and lost on restart");
            Arc::new(MemoryJobStore::new())
        }
    };

    let queue: Arc<dyn WorkQueue> = match &config.queue {
        Some(queue) => Arc::new(HttpWorkQueue::new(HttpQueueConfig {
            url: queue.url.clone(),
            token: queue.token.clone(),
            timeout: config.timeouts.queue,
        })?),
        None => {
            tracing::warn!("JOB_QUEUE_URL not set, dispatch is simulated");
            Arc::new(SimulatedQueue)
        }
    };

    let jwks = match (&config.auth.jwks_url, &config.auth.issuer) {
        (Some(url), _) => JwksConfig {
            jwks_url: url.clone(),
            issuer: config.auth.issuer.clone(),
            audience: config.auth.audience.clone(),
            fetch_timeout: config.timeouts.auth,
        },
        (None, Some(issuer)) => JwksConfig {
            audience: config.auth.audience.clone(),
            ..JwksConfig::from_issuer(issuer, config.timeouts.auth)
        },
        (None, None) => anyhow::bail!("no identity provider configured"),
    };
    tracing::info!(jwks_url = %jwks.jwks_url, "Verifying caller tokens against key set");
    let resolver: Arc<dyn IdentityResolver> = Arc::new(JwksResolver::new(jwks)?);

    let service_token = ServiceToken::new(config.auth.service_token.clone());
    if !service_token.is_configured() {
        tracing::info!("SERVICE_API_TOKEN not set, admin listing and service callbacks disabled");
    }
    if config.auth.allow_anonymous {
        tracing::warn!("Anonymous submissions enabled");
    }

    let manager = Arc::new(JobManager::new(store, queue, resolver, config.timeouts));
    let state = ApiState {
        manager,
        service_token,
        allow_anonymous: config.auth.allow_anonymous,
    };

    let addr = config.server.addr()?;
    let app = api::app(state, &config.server.cors_allowed_origins);
    let mut server = ApiServer::start(addr, app)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");
    server.shutdown().await;
    Ok(())
}
