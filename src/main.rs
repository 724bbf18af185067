//! echo-ha-bridge entry point
//!
//! `serve` runs the admin HTTP endpoints and the configured flow nodes;
//! `query` runs one registry query and prints the result as JSON.

use anyhow::Context;
use clap::{Parser, Subcommand};
use echo_ha_bridge::{
    client::{CallOptions, WebSocketClient},
    config::{ConnectionResolver, ManagedEnvironment, ServerConfig, StaticDirectory},
    error_recovery::{RetryExecutor, RetryPolicy},
    flow::NodeRegistry,
    http_transport::{self, AppState},
    logging,
    registry::{DeviceFilter, RegistryService},
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "echo-ha-bridge")]
#[command(about = "Home Assistant registry bridge for echo device flow nodes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "ECHO_HA_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the admin HTTP server and the configured flow nodes
    Serve {
        /// Address to bind (overrides configuration)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one registry query and print the result
    Query {
        /// Server configuration id; the first usable one when omitted
        #[arg(long)]
        server: Option<String>,

        /// Extra attempts on connection errors and timeouts
        #[arg(long, default_value_t = 0)]
        retries: u32,

        #[command(subcommand)]
        query: QueryCommand,
    },
}

#[derive(Subcommand, Debug)]
enum QueryCommand {
    /// List devices
    Devices {
        #[arg(long)]
        area: Option<String>,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        domain: Option<String>,
    },
    /// List entities
    Entities {
        #[arg(long)]
        device: Option<String>,
    },
    /// List areas, labels and domain counts
    Filters,
    /// Show the live state of one entity
    EntityInfo { entity: String },
}

fn registry_service(config: &ServerConfig, cancel: Option<CancellationToken>) -> RegistryService {
    let directory = Arc::new(StaticDirectory::new(config.servers.clone()));
    let resolver = ConnectionResolver::new(directory, ManagedEnvironment::from_env());

    let mut options = CallOptions::default().with_timeout(config.client.request_timeout);
    if let Some(cancel) = cancel {
        options = options.with_cancellation(cancel);
    }

    RegistryService::new(resolver, Arc::new(WebSocketClient::new(options)))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            trigger.cancel();
        }
    });
    token
}

async fn serve(mut config: ServerConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.http.host = host;
    }
    if let Some(port) = port {
        config.http.port = port;
    }

    let nodes = NodeRegistry::from_config(&config)?;
    nodes.start_all().await;

    let state = Arc::new(AppState {
        registry: registry_service(&config, None),
        nodes: nodes.clone(),
    });

    let shutdown = cancel_on_ctrl_c();
    let result = http_transport::serve(&config.http, state, shutdown).await;

    nodes.close_all().await;
    result.context("admin HTTP server failed")
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn query(
    config: &ServerConfig,
    server: Option<String>,
    retries: u32,
    query: QueryCommand,
) -> anyhow::Result<()> {
    let service = registry_service(config, Some(cancel_on_ctrl_c()));
    let executor = RetryExecutor::new(RetryPolicy::with_attempts(retries.saturating_add(1)));
    let server = server.as_deref();

    match query {
        QueryCommand::Devices {
            area,
            label,
            domain,
        } => {
            let filter = DeviceFilter::new(area.as_deref(), label.as_deref(), domain.as_deref());
            let devices = executor
                .execute(|| service.list_devices(server, &filter))
                .await?;
            print_json(&devices)
        }
        QueryCommand::Entities { device } => {
            let entities = executor
                .execute(|| service.list_entities(server, device.as_deref()))
                .await?;
            print_json(&entities)
        }
        QueryCommand::Filters => {
            let filters = executor.execute(|| service.list_filters(server)).await?;
            print_json(&filters)
        }
        QueryCommand::EntityInfo { entity } => {
            let info = executor
                .execute(|| service.get_entity_info(server, &entity))
                .await?;
            print_json(&info)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ServerConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let _log_guard = logging::init(&config.logging, cli.debug)?;

    if ManagedEnvironment::from_env().is_managed() {
        info!("Running as managed add-on; using the supervisor endpoint");
    } else if config.servers.is_empty() {
        warn!("No Home Assistant servers configured");
    }

    match cli.command {
        Command::Serve { host, port } => {
            info!("Starting echo-ha-bridge v{}", env!("CARGO_PKG_VERSION"));
            serve(config, host, port).await
        }
        Command::Query {
            server,
            retries,
            query: command,
        } => query(&config, server, retries, command).await,
    }
}
