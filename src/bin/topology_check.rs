//! # Topology Check
//!
//! Loads tome definitions from a JSON file, wires them into a ring or
//! hub-and-spoke network, runs one health check plus a validation pass and
//! prints the resulting topology report. Useful for checking a network layout
//! before deploying it.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tome_core::config::ConfigManager;
use tome_core::logging;
use tome_core::messaging::MessageBroker;
use tome_core::registry::{TomeConfig, TomeRegistry};
use tome_core::topology::{ConnectionConfig, ConnectionTopology, StructuralConfig};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Layout {
    Ring,
    Hub,
}

#[derive(Parser)]
#[command(name = "topology_check")]
#[command(about = "Build a tome network from definitions and report its health")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// JSON file holding an array of tome definitions
    tomes: PathBuf,

    /// Network layout to build
    #[arg(short, long, value_enum, default_value = "ring")]
    layout: Layout,

    /// Hub tome id for the hub layout (defaults to the first tome)
    #[arg(long)]
    hub: Option<String>,

    /// Connection config applied to every generated connection
    #[arg(long)]
    connection: Option<PathBuf>,

    /// Structural config with declared routes and navigation
    #[arg(long)]
    structural: Option<PathBuf>,

    /// Configuration directory (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        error!(error = %err, "❌ TOPOLOGY CHECK: Failed");
        eprintln!("topology_check: {err:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let manager = ConfigManager::load_from_directory(cli.config_dir.clone()).context("loading configuration")?;
    logging::init_with_config(&manager.config().logging);

    let tomes: Vec<TomeConfig> = read_json(&cli.tomes)?;
    if tomes.is_empty() {
        bail!("{} contains no tome definitions", cli.tomes.display());
    }
    let connection: ConnectionConfig = match &cli.connection {
        Some(path) => read_json(path)?,
        None => ConnectionConfig::default(),
    };
    let structural: Option<StructuralConfig> = cli.structural.as_deref().map(read_json::<StructuralConfig>).transpose()?;

    let registry = Arc::new(TomeRegistry::new(manager.config().registry.clone()));
    let ids = tomes
        .into_iter()
        .map(|tome| registry.register(tome).map(|instance| instance.id().to_string()))
        .collect::<tome_core::Result<Vec<_>>>()?;

    // Single pass, no background monitor
    let mut topology_config = manager.config().topology.clone();
    topology_config.monitor_enabled = false;
    let topology = ConnectionTopology::new(
        Arc::clone(&registry),
        Arc::new(MessageBroker::offline()),
        topology_config,
    );

    let connection_ids = match cli.layout {
        Layout::Ring => topology.create_network(&ids, &connection)?,
        Layout::Hub => {
            let hub = cli.hub.clone().unwrap_or_else(|| ids[0].clone());
            let spokes: Vec<&String> = ids.iter().filter(|id| **id != hub).collect();
            topology.create_hub_network(&hub, &spokes, &connection)?
        }
    };

    let summary = topology.run_health_check();
    let validation = topology.validate_network(structural.as_ref());

    info!(
        tomes = ids.len(),
        connections = connection_ids.len(),
        healthy = summary.healthy,
        valid = validation.valid,
        "✅ TOPOLOGY CHECK: Completed"
    );

    let report = json!({
        "environment": manager.environment(),
        "connectionIds": connection_ids,
        "topology": topology.get_network_topology(),
        "health": topology.network_health(),
        "validation": validation,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    topology.destroy();
    if validation.valid {
        Ok(())
    } else {
        bail!("network validation reported {} issue(s)", validation.issues.len())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}
