use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use concept_visualizer::{
    ai::JigsawStackClient,
    config::Config,
    db::{self, ConceptRepository, PgConceptRepository, PgTaskRepository},
    middleware::spawn_limiter_cleanup,
    queue::{RedisJobQueue, Worker},
    routes::create_router,
    services::{ConceptService, StaleTaskSweeper, TaskService},
    storage::{Buckets, ObjectStore, S3ObjectStore},
    utils::init_logger,
    AppState,
};

const LIMITER_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "concept-visualizer")]
#[command(about = "Logo concept generation API and worker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Consume generation and refinement jobs
    Worker,
}

struct Backends {
    pool: PgPool,
    tasks: TaskService,
    concepts: Arc<dyn ConceptRepository>,
    store: Arc<dyn ObjectStore>,
    queue: Arc<RedisJobQueue>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config.server);

    let backends = connect(&config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, backends).await,
        Command::Worker => run_worker(config, backends).await,
    }
}

async fn connect(config: &Config) -> anyhow::Result<Backends> {
    let pool = db::create_pool(&config.database).await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    info!("Database migrations completed");

    let store = S3ObjectStore::new(&config.storage)?;
    let queue = RedisJobQueue::connect(&config.redis).await?;

    Ok(Backends {
        tasks: TaskService::new(Arc::new(PgTaskRepository::new(pool.clone()))),
        concepts: Arc::new(PgConceptRepository::new(pool.clone())),
        store: Arc::new(store),
        queue: Arc::new(queue),
        pool,
    })
}

async fn serve(config: Config, backends: Backends) -> anyhow::Result<()> {
    let concepts = ConceptService::new(
        backends.concepts,
        backends.store,
        Buckets::from(&config.storage),
    );
    let state = AppState::new(config.clone(), backends.tasks, concepts, backends.queue)
        .with_pool(backends.pool);

    let limiter_cleanup = state
        .rate_limiter
        .clone()
        .map(|limiter| spawn_limiter_cleanup(limiter, LIMITER_CLEANUP_INTERVAL));

    let app = create_router(state);

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            wait_for_ctrl_c().await;
        })
        .await
        .context("Server error")?;

    if let Some(cleanup) = limiter_cleanup {
        cleanup.abort();
    }
    info!("Server stopped");
    Ok(())
}

async fn run_worker(config: Config, backends: Backends) -> anyhow::Result<()> {
    let generator = JigsawStackClient::new(&config.jigsawstack)?;

    let sweeper = StaleTaskSweeper::new(
        backends.tasks.clone(),
        Duration::from_secs(config.worker.sweep_interval_secs),
        Duration::from_secs(config.worker.task_timeout_secs),
    )
    .spawn();

    let worker = Arc::new(Worker::new(
        backends.tasks,
        backends.concepts,
        backends.store,
        Arc::new(generator),
        Buckets::from(&config.storage),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_ctrl_c().await;
        info!("Shutdown requested, finishing in-flight jobs");
        let _ = shutdown_tx.send(true);
    });

    worker
        .run(backends.queue, config.worker.concurrency, shutdown_rx)
        .await;

    sweeper.abort();
    Ok(())
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
