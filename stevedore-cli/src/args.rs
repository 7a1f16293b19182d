use clap::{Parser, Subcommand};
use std::path::PathBuf;

use stevedore_core::{PortMapping, RestartPolicy};

/// Container lifecycle orchestrator CLI.
#[derive(Parser, Debug)]
#[command(name = "stevedore")]
#[command(
    about = "Build, publish and run a containerized service with one command",
    long_about = None
)]
pub struct Cli {
    /// Engine binary to drive (docker-compatible).
    #[arg(long, global = true, default_value = "docker")]
    pub engine: String,

    /// State file location (default: $STEVEDORE_STATE_FILE or
    /// ~/.local/state/stevedore/state.json).
    #[arg(long, global = true)]
    pub state_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build, tag, push and run a service, then wait for it to be healthy.
    Deploy {
        /// Path to the service spec file (TOML).
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Container name (default: last segment of the image).
        #[arg(long)]
        name: Option<String>,

        /// Image reference without the tag.
        #[arg(long)]
        image: Option<String>,

        #[arg(long)]
        tag: Option<String>,

        /// Port mapping HOST:CONTAINER (repeatable).
        #[arg(short, long = "port")]
        ports: Vec<PortMapping>,

        /// Environment file passed to the container.
        #[arg(long)]
        env_file: Option<PathBuf>,

        /// Volume mount NAME:/container/path (repeatable).
        #[arg(short, long = "volume")]
        volumes: Vec<String>,

        /// Restart policy: always, unless-stopped, on-failure, no.
        #[arg(long)]
        restart: Option<RestartPolicy>,

        /// Registry prefix for tag/push.
        #[arg(long)]
        registry: Option<String>,

        /// Skip the push step even when a registry is configured.
        #[arg(long)]
        no_push: bool,
    },
    /// Stop and remove a deployed service.
    Stop {
        /// Service name.
        name: String,
    },
    /// Report tracked lifecycle state: one service, or all tracked ones.
    Status {
        /// Service name. Omit to list every tracked service.
        name: Option<String>,
    },
    /// Print container logs for a service.
    Logs {
        /// Service name.
        name: String,

        /// Only the last N lines.
        #[arg(long)]
        tail: Option<usize>,
    },
}
