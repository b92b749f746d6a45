//! docker-migrate entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::info;
use serde::Serialize;

use docker_migrate::config::Config;
use docker_migrate::{DockerDaemon, ImageDaemon, Migrator};

/// Command line flags.  Unset flags are not serialized so they leave the
/// file and environment layers of [`Config`] alone.
#[derive(Parser, Debug, Serialize)]
#[command(name = "docker-migrate", version)]
#[command(about = "Migrate images from one Docker daemon to others when no shared registry is set up")]
#[command(after_help = "Hosts are written as tcp://HOST:PORT, optionally followed by \
,ca=/path/to/ca,cert=/path/to/cert,key=/path/to/key for TLS, or unix:///path/to/docker.sock.

Example:
  docker-migrate -s tcp://192.168.56.2:2375 -d tcp://192.168.56.3:2375 -d tcp://192.168.56.4:2375")]
struct Cli {
    /// Host the images are read from
    #[arg(short = 's', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    source_host: Option<String>,

    /// Host the images are loaded into (repeatable)
    #[arg(short = 'd', long = "destination-host")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    destination_hosts: Vec<String>,

    /// Regex a tag must match for its image to migrate [default: .*]
    #[arg(short = 'p', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    image_pattern: Option<String>,

    /// Compose file whose `image:` entries select the images to migrate
    #[arg(long, conflicts_with = "image_pattern")]
    #[serde(skip_serializing_if = "Option::is_none")]
    image_file: Option<PathBuf>,

    /// Deadline for the whole migration in seconds [default: 120]
    #[arg(long = "timeout", value_name = "SECS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli)?;
    info!("Starting docker-migrate with config: {:?}", cfg);

    let pattern = cfg.selection_pattern()?;

    // Daemon handles
    let options = cfg.connect_options();
    let source: Arc<dyn ImageDaemon> = Arc::new(DockerDaemon::connect(cfg.source_host(), &options)?);
    let mut destinations: Vec<Arc<dyn ImageDaemon>> = Vec::with_capacity(cfg.destination_hosts.len());
    for host in &cfg.destination_hosts {
        destinations.push(Arc::new(DockerDaemon::connect(host, &options)?));
    }

    let migrator = Migrator::new(source, destinations, cfg.timeout());
    let report = migrator.migrate(&pattern).await?;
    println!("{}", report);

    if report.has_failures() {
        anyhow::bail!(
            "{} of {} images were not migrated to every destination",
            report.failed_images(),
            report.images.len()
        );
    }
    Ok(())
}
