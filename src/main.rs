use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{response::Html, routing::get, Extension, Router};
use mongodb::{options::ClientOptions, Client as MongoClient};
use tokio_cron_scheduler::{Job, JobScheduler};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, EnvFilter};

use catalog_sync_service::cli::{print_usage, Command};
use catalog_sync_service::clients::MagentoClient;
use catalog_sync_service::config::Config;
use catalog_sync_service::models::JobStatus;
use catalog_sync_service::schema::{build_schema, CatalogSyncSchema, ServiceContext};
use catalog_sync_service::storage::MongoCatalog;
use catalog_sync_service::sync::{ImportStrategy, SyncEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load this crate's .env regardless of current working directory, and override any pre-set envs
    let _ = dotenvy::from_filename_override(concat!(env!("CARGO_MANIFEST_DIR"), "/.env"));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(true)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{}", message);
            print_usage();
            std::process::exit(2);
        }
    };
    if command == Command::Help {
        print_usage();
        return Ok(());
    }

    let cfg = Config::from_env()?;
    tracing::info!(
        database = %cfg.database_name,
        magento_url = %cfg.magento_url,
        store_code = %cfg.magento_store_code,
        scheduler_enabled = cfg.enable_scheduler,
        transactions = cfg.mongodb_transactions,
        "Loaded configuration"
    );

    let client_options = ClientOptions::parse(&cfg.mongodb_uri).await?;
    let mongo_client = MongoClient::with_options(client_options)?;
    let db = mongo_client.database(&cfg.database_name);
    let catalog = MongoCatalog::new(mongo_client.clone(), db, cfg.mongodb_transactions);
    if let Err(e) = catalog.ensure_indexes().await {
        tracing::warn!(error = %e, "Failed to create catalog indexes");
    }

    let source = Arc::new(MagentoClient::new(&cfg)?);
    let engine = Arc::new(SyncEngine::with_catalog(source, catalog.clone(), cfg.watermark_key.clone()));
    let strategy = Arc::new(ImportStrategy::new(engine, Arc::new(catalog.clone())));

    if let Command::Sync { store_id } = command {
        let job = strategy.run(&store_id).await?;
        println!("{}", serde_json::to_string_pretty(&job)?);
        if job.status == JobStatus::Failed {
            anyhow::bail!("import for store {} failed: {}", store_id, job.error.unwrap_or_default());
        }
        return Ok(());
    }

    let graphql_schema = build_schema(ServiceContext {
        strategy: strategy.clone(),
        stores: Arc::new(catalog.clone()),
        categories: Arc::new(catalog),
    });

    let scheduler = JobScheduler::new().await?;
    if cfg.enable_scheduler {
        start_sync_scheduler(&scheduler, &cfg, strategy.clone()).await?;
        scheduler.start().await?;
        tracing::info!(cron = %cfg.sync_cron, stores = ?cfg.sync_store_ids, "Sync scheduler started");
    }

    let app = Router::new()
        .route("/graphql", get(graphql_playground).post(graphql_handler))
        .route("/health", get(health_check))
        .layer(Extension(graphql_schema))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.port).parse()?;
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                tracing::error!(port = cfg.port, "Port is already in use. Try changing PORT env var or stop the other process.");
            }
            return Err(e.into());
        }
    };
    tracing::info!(port = cfg.port, "Catalog sync service listening");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn graphql_playground() -> Html<String> {
    Html(async_graphql::http::playground_source(
        async_graphql::http::GraphQLPlaygroundConfig::new("/graphql"),
    ))
}

async fn graphql_handler(
    Extension(schema): Extension<CatalogSyncSchema>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

async fn health_check() -> &'static str {
    "OK"
}

async fn start_sync_scheduler(
    scheduler: &JobScheduler,
    cfg: &Config,
    strategy: Arc<ImportStrategy>,
) -> anyhow::Result<()> {
    let schedule = cron::Schedule::from_str(&cfg.sync_cron)
        .map_err(|e| anyhow::anyhow!("Invalid SYNC_CRON '{}': {}", cfg.sync_cron, e))?;
    if let Some(next) = schedule.upcoming(chrono::Utc).next() {
        tracing::info!(next_run = %next.to_rfc3339(), "Next scheduled import");
    }
    if cfg.sync_store_ids.is_empty() {
        tracing::warn!("SYNC_STORE_IDS is empty; scheduled imports will do nothing");
    }

    let store_ids = cfg.sync_store_ids.clone();
    let import_job = Job::new_async(cfg.sync_cron.as_str(), move |_uuid, _l| {
        let strategy = strategy.clone();
        let store_ids = store_ids.clone();
        Box::pin(async move {
            for store_id in store_ids {
                match strategy.run(&store_id).await {
                    Ok(job) => tracing::info!(store_id = %store_id, status = ?job.status, "Scheduled import finished"),
                    Err(e) => tracing::error!(store_id = %store_id, error = %e, "Scheduled import failed"),
                }
            }
        })
    })?;

    scheduler.add(import_job).await?;

    Ok(())
}
