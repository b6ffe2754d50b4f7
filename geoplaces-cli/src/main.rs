//! GeoPlaces CLI - Command-line interface
//!
//! This binary runs the geographic search service: it loads the country
//! catalog, starts the country manager, and serves the HTTP search/admin
//! surface until an operator terminates the manager (exit 0) or the manager
//! dies (non-zero exit).

mod error;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use error::CliError;
use geoplaces::catalog::CatalogParser;
use geoplaces::config::{ProxySettings, Settings};
use geoplaces::http;
use geoplaces::manager::CountryManager;
use geoplaces::store::JsonFileStore;
use geoplaces::upstream::ReqwestGeonamesClient;

// ============================================================================
// CLI Argument Definitions
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "geoplaces", version = geoplaces::VERSION, about = "Geographic search over geonames populated places")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the search service
    Serve {
        /// Address the HTTP surface binds to
        #[arg(long)]
        bind: Option<SocketAddr>,
        /// Path to the geonames countryInfo.txt catalog file
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Directory for per-country cache files and the document store
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Forward proxy host for upstream downloads
        #[arg(long)]
        proxy_host: Option<String>,
        /// Forward proxy port (requires --proxy-host)
        #[arg(long)]
        proxy_port: Option<u16>,
        /// Enable debug-level logging
        #[arg(long)]
        debug: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            catalog,
            data_dir,
            proxy_host,
            proxy_port,
            debug,
        } => {
            init_logging(debug);
            if let Err(e) = serve(bind, catalog, data_dir, proxy_host, proxy_port).await {
                e.exit();
            }
        }
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_settings(
    bind: Option<SocketAddr>,
    catalog: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    proxy_host: Option<String>,
    proxy_port: Option<u16>,
) -> Result<Settings, CliError> {
    let mut settings = Settings::default();
    if let Some(bind) = bind {
        settings.bind_addr = bind;
    }
    if let Some(catalog) = catalog {
        settings.catalog_file = catalog;
    }
    if let Some(data_dir) = data_dir {
        settings.data_dir = data_dir;
    }
    settings.proxy = match (proxy_host, proxy_port) {
        (Some(host), Some(port)) => Some(ProxySettings { host, port }),
        (None, None) => None,
        _ => {
            return Err(CliError::Config(
                "--proxy-host and --proxy-port must be given together".to_string(),
            ))
        }
    };
    Ok(settings)
}

async fn serve(
    bind: Option<SocketAddr>,
    catalog: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    proxy_host: Option<String>,
    proxy_port: Option<u16>,
) -> Result<(), CliError> {
    info!("GeoPlaces v{}", geoplaces::VERSION);

    let settings = Arc::new(build_settings(
        bind, catalog, data_dir, proxy_host, proxy_port,
    )?);

    let catalog_file = std::fs::File::open(&settings.catalog_file).map_err(|e| {
        CliError::Catalog(format!(
            "could not open {}: {}",
            settings.catalog_file.display(),
            e
        ))
    })?;
    let catalog =
        CatalogParser::parse_all(catalog_file).map_err(|e| CliError::Catalog(e.to_string()))?;
    info!(countries = catalog.len(), "catalog loaded");

    let client = Arc::new(ReqwestGeonamesClient::new(&settings).map_err(CliError::Upstream)?);
    let store = Arc::new(
        JsonFileStore::new(settings.data_dir.join("store")).map_err(CliError::Store)?,
    );

    let (manager_handle, manager) =
        CountryManager::spawn(catalog, Arc::clone(&settings), client, store);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .map_err(CliError::Bind)?;
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(http::serve(
        listener,
        manager_handle.clone(),
        shutdown.clone(),
    ));

    // Ctrl-C is the console spelling of the terminate command.
    let interrupt_handle = manager_handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, terminating");
            let _ = interrupt_handle.terminate().await;
        }
    });

    // The process lives exactly as long as the manager.
    let outcome = manager.await;
    shutdown.cancel();
    let _ = server.await;

    match outcome {
        Ok(()) => {
            info!("country manager terminated, shutting down");
            Ok(())
        }
        Err(e) => Err(CliError::ManagerCrashed(e.to_string())),
    }
}
