mod config;
mod logging;
mod statsd;

use amazon_ads::AdsError;
use amazon_ads::client::AdsClient;
use api::aggregator::Aggregator;
use api::config::StoreKind;
use api::performance::{ElasticsearchMetrics, MetricsError};
use api::routes::AppState;
use clap::{Parser, Subcommand, ValueEnum};
use config::{Config, ConfigError};
use docdb_cache::negative_cache::NegativeCache;
use docdb_cache::{CachedAdsApi, DocumentStore, MemoryStore, MongoStore, StoreError};
use shared::admin_service::{AdminService, Readiness};
use shared::http::run_http_service;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

const READINESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "visibly", about = "Caching backend for the Amazon Advertising APIs")]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, default_value = "visibly.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the API and admin listeners
    Serve {
        /// Overrides `api.default_store`
        #[arg(long, value_enum)]
        store: Option<StoreArg>,
    },
    /// Load and validate the config, then exit
    CheckConfig {
        #[arg(long, value_enum)]
        store: Option<StoreArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreArg {
    Mongo,
    Memory,
}

impl From<StoreArg> for StoreKind {
    fn from(arg: StoreArg) -> Self {
        match arg {
            StoreArg::Mongo => StoreKind::Mongo,
            StoreArg::Memory => StoreKind::Memory,
        }
    }
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Statsd(#[from] statsd::StatsdError),
    #[error("vendor client: {0}")]
    Ads(#[from] AdsError),
    #[error("document store: {0}")]
    Store(#[from] StoreError),
    #[error("metrics backend: {0}")]
    Metrics(#[from] MetricsError),
    #[error(transparent)]
    Serve(#[from] api::ServeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        CliCommand::CheckConfig { store } => {
            let store = store.map_or(config.api.default_store, StoreKind::from);
            config
                .validate(store)
                .map(|()| println!("config ok"))
                .map_err(CliError::from)
        }
        CliCommand::Serve { store } => {
            let store = store.map_or(config.api.default_store, StoreKind::from);
            let _sentry = logging::init(config.logging.as_ref());
            serve(config, store)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "visibly exited");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn serve(config: Config, store_kind: StoreKind) -> Result<(), CliError> {
    config.validate(store_kind)?;

    if let Some(metrics) = &config.metrics {
        statsd::init(metrics)?;
    }

    let vendor = Arc::new(AdsClient::new(&config.amazon_ads)?);

    let (store, negative_cache): (Arc<dyn DocumentStore>, NegativeCache) =
        match (store_kind, &config.docdb) {
            (StoreKind::Mongo, Some(docdb)) => (
                Arc::new(MongoStore::connect(docdb).await?) as Arc<dyn DocumentStore>,
                NegativeCache::new(docdb.negative_cache_size, docdb.negative_cache_ttl()),
            ),
            (StoreKind::Mongo, None) => return Err(ConfigError::MissingDocdb.into()),
            (StoreKind::Memory, docdb) => {
                tracing::warn!("using the in-memory store, cached entities are lost on restart");
                let negative_cache = match docdb {
                    Some(docdb) => {
                        NegativeCache::new(docdb.negative_cache_size, docdb.negative_cache_ttl())
                    }
                    None => NegativeCache::new(10_000, Duration::from_secs(30)),
                };
                (Arc::new(MemoryStore::new()) as Arc<dyn DocumentStore>, negative_cache)
            }
        };

    let metrics_source = Arc::new(ElasticsearchMetrics::new(&config.search)?);
    let state = AppState {
        ads: Arc::new(CachedAdsApi::new(vendor, store.clone(), negative_cache)),
        aggregator: Arc::new(Aggregator::new(metrics_source, config.api.batch_size)),
    };

    let readiness = Readiness::new();
    let admin = AdminService::<CliError>::new(readiness.clone(), statsd::METRIC_GROUPS);

    tokio::try_join!(
        async {
            api::serve(&config.api.listener, state)
                .await
                .map_err(CliError::from)
        },
        run_http_service(
            &config.api.admin_listener.host,
            config.api.admin_listener.port,
            admin
        ),
        watch_readiness(store, readiness),
    )?;

    Ok(())
}

/// Marks the service ready while the document store answers pings.
async fn watch_readiness(
    store: Arc<dyn DocumentStore>,
    readiness: Readiness,
) -> Result<(), CliError> {
    let mut interval = tokio::time::interval(READINESS_INTERVAL);

    loop {
        interval.tick().await;

        let ready = match store.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "document store ping failed");
                false
            }
        };

        if ready != readiness.is_ready() {
            tracing::info!(ready, "readiness changed");
        }
        readiness.set_ready(ready);
    }
}
