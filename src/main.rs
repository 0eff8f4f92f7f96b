//! nioctl - Main entry point
//!
//! Thin command line front end over the `nio_client` library.

use anyhow::{Context, Result};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use nio_client::cli::{Cli, Commands};
use nio_client::{Instance, Service};

/// Initialize the logger; `RUST_LOG` overrides the default `info` level
fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logger();

    let cli = Cli::parse_args();
    let config = cli.resolve_config().context("Invalid client configuration")?;
    debug!("Connecting to {}", config.base_url());

    if let Commands::DeleteAll { confirm: false } = cli.command {
        anyhow::bail!("delete-all removes every block and service; pass --confirm to proceed");
    }

    let mut instance = Instance::connect(config.clone())
        .with_context(|| format!("Failed to connect to {}", config.base_url()))?;

    match cli.command {
        Commands::Version => {
            println!("{}", serde_json::to_string_pretty(&instance.nio()?)?);
        }
        Commands::Blocks => {
            for (name, block) in instance.blocks() {
                println!("{}\t{}", name, block.block_type());
            }
        }
        Commands::Services => {
            for (name, service) in instance.services() {
                println!("{}", name);
                for entry in service.execution() {
                    println!("  {} -> [{}]", entry.name, entry.receivers.join(", "));
                }
            }
        }
        Commands::Template { block_type } => {
            let template = instance.template(&block_type)?;
            println!("{}", serde_json::to_string_pretty(template)?);
        }
        Commands::Start { services } => {
            let services = lookup(&instance, &services)?;
            instance.start(services)?;
            info!("All services started");
        }
        Commands::Stop { services } => {
            let services = lookup(&instance, &services)?;
            instance.stop(services)?;
        }
        Commands::CreateService {
            name,
            auto_start,
            log_level,
        } => {
            let mut service = Service::new(name)?;
            service.set_auto_start(auto_start);
            if let Some(level) = log_level {
                service.set_log_level(level);
            }
            instance.add_service(service)?;
        }
        Commands::Clean => {
            let removed = instance.clean()?;
            for name in &removed {
                println!("{}", name);
            }
        }
        Commands::DeleteAll { .. } => {
            instance.delete_all()?;
        }
    }

    Ok(())
}

fn lookup<'a>(instance: &'a Instance, names: &[String]) -> Result<Vec<&'a Service>> {
    names
        .iter()
        .map(|name| {
            instance
                .service(name)
                .with_context(|| format!("No service named '{}'", name))
        })
        .collect()
}
