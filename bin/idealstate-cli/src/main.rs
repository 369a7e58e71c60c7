//! idealstate CLI - ideal state placement on the command line
//!
//! Computes ideal storage and distributor nodes for partitions from a
//! canonical distribution configuration and a cluster state string.

use anyhow::Result;
use clap::{Parser, Subcommand};
use idealstate_common::{ClusterState, DistributionConfig, NodeType, PartitionId, StateSet};
use idealstate_placement::Distribution;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "idealstate-cli")]
#[command(about = "Ideal state placement CLI")]
#[command(version)]
struct Args {
    /// Canonical distribution configuration
    #[arg(short, long, env = "IDEALSTATE_CONFIG")]
    config: Option<String>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute ideal nodes for one or more partitions
    Nodes {
        /// Cluster state, e.g. "distributor:10 storage:10 .3.s:d"
        #[arg(short, long, env = "IDEALSTATE_CLUSTER_STATE")]
        state: ClusterState,
        /// Node type to place on (storage or distributor)
        #[arg(short = 't', long, default_value = "storage")]
        node_type: NodeType,
        /// Allowed node states
        #[arg(long, default_value = "uim")]
        states: StateSet,
        /// Override the configured redundancy
        #[arg(short, long)]
        redundancy: Option<u16>,
        /// Number of used bits of the given partition keys
        #[arg(short, long, default_value_t = 16)]
        used_bits: u8,
        /// Also split the storage nodes into leaf groups
        #[arg(long)]
        split: bool,
        /// Partition keys, decimal or 0x-prefixed hex
        #[arg(required = true)]
        partitions: Vec<String>,
    },
    /// Split node indices into leaf groups
    Split {
        /// Node indices
        #[arg(required = true)]
        nodes: Vec<u16>,
    },
    /// Print a flat configuration with nodes 0..N
    FlatConfig {
        /// Number of nodes
        #[arg(short, long)]
        nodes: u16,
        /// Copies per partition
        #[arg(short, long, default_value_t = 2)]
        redundancy: u16,
        /// Place every partition on every node
        #[arg(long)]
        global: bool,
    },
}

/// Parse a partition key given in decimal or 0x-prefixed hex
fn parse_key(s: &str) -> Result<u64> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| anyhow::anyhow!("Invalid partition key: '{s}'"))
}

fn load_distribution(config: Option<&str>) -> Result<Distribution> {
    let config = config.ok_or_else(|| {
        anyhow::anyhow!("No distribution configuration given (use --config or IDEALSTATE_CONFIG)")
    })?;
    Distribution::from_serialized(config)
        .map_err(|e| anyhow::anyhow!("Invalid distribution configuration: {e}"))
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match args.command {
        Commands::Nodes {
            state,
            node_type,
            states,
            redundancy,
            used_bits,
            split,
            partitions,
        } => {
            let distribution = load_distribution(args.config.as_deref())?;
            tracing::info!(%distribution, %state, "computing ideal nodes");

            let mut results = Vec::with_capacity(partitions.len());
            for key in &partitions {
                let partition = PartitionId::new(used_bits, parse_key(key)?)?;
                let nodes =
                    distribution.ideal_nodes(node_type, &state, partition, states, redundancy)?;
                let mut entry = json!({
                    "partition": partition.to_string(),
                    "node_type": node_type.to_string(),
                    "nodes": nodes,
                });
                if split && node_type == NodeType::Storage {
                    entry["leaf_groups"] = json!(distribution.split_nodes_into_leaf_groups(&nodes));
                }
                results.push(entry);
            }
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Split { nodes } => {
            let distribution = load_distribution(args.config.as_deref())?;
            let buckets = distribution.split_nodes_into_leaf_groups(&nodes);
            println!("{}", serde_json::to_string(&buckets)?);
        }
        Commands::FlatConfig {
            nodes,
            redundancy,
            global,
        } => {
            let mut config = DistributionConfig::flat(redundancy, nodes);
            config.global = global;
            // Validates the configuration before printing it
            let distribution = Distribution::from_config(config)?;
            println!("{}", distribution.serialized());
        }
    }

    Ok(())
}
