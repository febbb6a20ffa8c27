//! `stationd` daemon serving the ground-station training workflow over HTTP.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use station_core::{
    DeviceConfigStore, FileSessionStore, MemorySessionStore, SchemeService, SessionStore,
    StationWorkflow,
};
use station_spec::{GatewayCheck, SchemeCatalog, TopologyRegistry};
use stationd::{router, AppState};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Stationd command line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase output verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Override log level (e.g. info, debug, trace).
    #[arg(long, env = "STATION_LOG_LEVEL")]
    log_level: Option<String>,
    /// Antenna topology definition.
    #[arg(
        long,
        env = "STATION_TOPOLOGY",
        value_name = "FILE",
        help = "Path to a JSON-encoded TopologySpec; the built-in two-pair table when omitted"
    )]
    topology: Option<PathBuf>,
    /// Gateway acceptance policy.
    #[arg(
        long,
        value_enum,
        default_value_t = GatewayPolicy::Lenient,
        env = "STATION_GATEWAY_CHECK"
    )]
    gateway_check: GatewayPolicy,
    /// Session store backend.
    #[arg(long, value_enum, default_value_t = StoreKind::Memory, env = "STATION_STORE")]
    store: StoreKind,
    /// Directory of the file store.
    #[arg(
        long,
        env = "STATION_DATA_DIR",
        value_name = "DIR",
        default_value = "./station-data"
    )]
    data_dir: PathBuf,
    /// Subcommand.
    #[command(subcommand)]
    command: Commands,
}

/// Commands for stationd.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API.
    Serve {
        /// Bind address.
        #[arg(long, env = "STATION_ADDR", default_value = "127.0.0.1:8080")]
        addr: String,
    },
    /// Print the antennas and consoles of the topology.
    Devices,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum GatewayPolicy {
    Lenient,
    Strict,
}

impl From<GatewayPolicy> for GatewayCheck {
    fn from(policy: GatewayPolicy) -> Self {
        match policy {
            GatewayPolicy::Lenient => GatewayCheck::Lenient,
            GatewayPolicy::Strict => GatewayCheck::Strict,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StoreKind {
    Memory,
    File,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = cli
        .log_level
        .as_deref()
        .map(|lvl| lvl.to_ascii_uppercase())
        .map(|lvl| match lvl.as_str() {
            "TRACE" => Level::TRACE,
            "DEBUG" => Level::DEBUG,
            "WARN" => Level::WARN,
            "ERROR" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or_else(|| match cli.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        });
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(env_filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let registry = Arc::new(load_topology(cli.topology.as_deref()).await?);
    match cli.command {
        Commands::Devices => {
            let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
            let workflow = StationWorkflow::new(registry, store, cli.gateway_check.into());
            println!(
                "{}",
                serde_json::to_string_pretty(&workflow.available_devices())?
            );
        }
        Commands::Serve { addr } => {
            let (sessions, devices) = open_store(cli.store, &cli.data_dir)?;
            let workflow = StationWorkflow::new(registry, sessions, cli.gateway_check.into());
            let schemes = SchemeService::new(Arc::new(SchemeCatalog::reference()), devices);
            serve(workflow, schemes, &addr).await?;
        }
    }
    Ok(())
}

type Stores = (Arc<dyn SessionStore>, Arc<dyn DeviceConfigStore>);

fn open_store(kind: StoreKind, data_dir: &std::path::Path) -> anyhow::Result<Stores> {
    match kind {
        StoreKind::Memory => {
            let store = Arc::new(MemorySessionStore::new());
            let sessions: Arc<dyn SessionStore> = store.clone();
            let devices: Arc<dyn DeviceConfigStore> = store;
            Ok((sessions, devices))
        }
        StoreKind::File => {
            info!("session and device records under {}", data_dir.display());
            let store = Arc::new(FileSessionStore::open(data_dir)?);
            let sessions: Arc<dyn SessionStore> = store.clone();
            let devices: Arc<dyn DeviceConfigStore> = store;
            Ok((sessions, devices))
        }
    }
}

async fn serve(
    workflow: StationWorkflow,
    schemes: SchemeService,
    addr: &str,
) -> anyhow::Result<()> {
    let antennas = workflow.registry().len();
    let gateway_check = workflow.gateway_check();
    let state = Arc::new(AppState::new(workflow, schemes)?);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        antennas,
        ?gateway_check,
        "stationd listening on {}",
        listener.local_addr()?
    );
    axum::serve(listener, router(state).into_make_service()).await?;
    Ok(())
}

async fn load_topology(path: Option<&std::path::Path>) -> anyhow::Result<TopologyRegistry> {
    let Some(path) = path else {
        return Ok(TopologyRegistry::reference());
    };
    let data = tokio::fs::read(path).await?;
    let registry = TopologyRegistry::from_json(&data)?;
    info!(
        "loaded {} antennas from {}",
        registry.len(),
        path.display()
    );
    Ok(registry)
}
