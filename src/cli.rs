use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ClientConfig;

/// nioctl - manage blocks and services on a nio server
#[derive(Parser)]
#[command(name = "nioctl")]
#[command(about = "Manage blocks and services on a nio automation server")]
#[command(version)]
pub struct Cli {
    /// JSON configuration file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Server host, overrides the file and NIO_HOST
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Server port, overrides the file and NIO_PORT
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Basic auth user, overrides the file and NIO_USER
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Basic auth password, overrides the file and NIO_PASSWORD
    #[arg(long, global = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the server version information
    Version,
    /// List blocks
    Blocks,
    /// List services and their execution graphs
    Services,
    /// Print the template of a block type
    Template {
        /// Block type name
        block_type: String,
    },
    /// Start services in order, waiting for each to report started
    Start {
        #[arg(required = true)]
        services: Vec<String>,
    },
    /// Stop services in order
    Stop {
        #[arg(required = true)]
        services: Vec<String>,
    },
    /// Create an empty service
    CreateService {
        name: String,
        /// Start the service when the server starts
        #[arg(long)]
        auto_start: bool,
        /// Service log level, the server default is ERROR
        #[arg(long)]
        log_level: Option<String>,
    },
    /// Delete blocks not used by any service
    Clean,
    /// Delete every block and service on the server
    DeleteAll {
        /// Confirm destructive operation
        #[arg(long)]
        confirm: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Configuration file (or defaults), then environment, then flags
    pub fn resolve_config(&self) -> Result<ClientConfig> {
        self.resolve_config_with(|key| std::env::var(key).ok())
    }

    pub fn resolve_config_with<F>(&self, lookup: F) -> Result<ClientConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load_from_file(path)?,
            None => ClientConfig::default(),
        };
        config.apply_env_from(lookup)?;

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(user) = &self.user {
            config.username = user.clone();
        }
        if let Some(password) = &self.password {
            config.password = password.clone();
        }

        config.validate()?;
        Ok(config)
    }
}
