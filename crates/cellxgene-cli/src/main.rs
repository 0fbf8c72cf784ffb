//! cellxgene-locate: inspect and fetch datasets by path or URI.
//!
//! Configuration comes from CXG_S3_REGION, CXG_S3_ENDPOINT, CXG_TEMP_PREFIX
//! and CXG_TEMP_DIR (a `.env` file is honoured).

use anyhow::Context;
use cellxgene_cli::{choose_region, fetch, init_cli, stat, RegionChoice};
use cellxgene_core::{render_hosted_config, DeploymentEnv, LocatorConfig};
use cellxgene_storage::{discover_s3_region_name, BackendRegistry, DataLocator};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

#[derive(Parser)]
#[command(name = "cellxgene-locate", about = "Locate and read cellxgene datasets")]
struct Cli {
    /// Region of the bucket, overriding CXG_S3_REGION
    #[arg(long, global = true)]
    region: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a location exists
    Exists {
        /// Native path or URI
        uri: String,
    },
    /// Print the size in bytes
    Size { uri: String },
    /// Print metadata as JSON
    Stat { uri: String },
    /// List entry names directly below a location
    Ls { uri: String },
    /// Write the content to stdout
    Cat { uri: String },
    /// Copy the content to a local file
    Fetch {
        uri: String,
        /// Destination path
        dest: PathBuf,
    },
    /// Print the region of an S3 bucket
    Region { uri: String },
    /// Render the hosted deployment config for HAPPY_ENV
    EnvConfig {
        #[arg(long, default_value = "config.yaml")]
        output: PathBuf,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

async fn open_locator(
    registry: &BackendRegistry,
    config: &LocatorConfig,
    explicit_region: Option<&str>,
    uri: &str,
) -> anyhow::Result<DataLocator> {
    let region = match choose_region(explicit_region, &config.s3_region) {
        RegionChoice::Known(region) => region,
        RegionChoice::Discover => discover_s3_region_name(uri)
            .await
            .with_context(|| format!("Failed to discover region of {}", uri))?,
    };

    DataLocator::with_registry(registry, uri, region.as_deref())
        .with_context(|| format!("Invalid location {}", uri))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_cli();

    let cli = Cli::parse();
    let config = LocatorConfig::from_env().context("Invalid locator configuration")?;
    let registry = BackendRegistry::from_config(&config);
    let region = cli.region.as_deref();

    match cli.command {
        Commands::Exists { uri } => {
            let locator = open_locator(&registry, &config, region, &uri).await?;
            println!("{}", locator.exists().await?);
        }
        Commands::Size { uri } => {
            let locator = open_locator(&registry, &config, region, &uri).await?;
            println!("{}", locator.size().await?);
        }
        Commands::Stat { uri } => {
            let locator = open_locator(&registry, &config, region, &uri).await?;
            print_json(&stat(&locator).await?)?;
        }
        Commands::Ls { uri } => {
            let locator = open_locator(&registry, &config, region, &uri).await?;
            for name in locator.ls().await? {
                println!("{}", name);
            }
        }
        Commands::Cat { uri } => {
            let locator = open_locator(&registry, &config, region, &uri).await?;
            let mut stream = locator.open().await?;
            let mut stdout = tokio::io::stdout();
            while let Some(chunk) = stream.next().await {
                stdout.write_all(&chunk?).await?;
            }
            stdout.flush().await?;
        }
        Commands::Fetch { uri, dest } => {
            let locator = open_locator(&registry, &config, region, &uri).await?;
            let size_bytes = fetch(&locator, &dest)
                .await
                .with_context(|| format!("Failed to fetch {} to {}", uri, dest.display()))?;
            tracing::info!(
                source = %uri,
                dest = %dest.display(),
                size_bytes = size_bytes,
                "Fetched"
            );
        }
        Commands::Region { uri } => match discover_s3_region_name(&uri).await? {
            Some(name) => println!("{}", name),
            None => println!("unknown"),
        },
        Commands::EnvConfig { output } => {
            let env = DeploymentEnv::from_env().context("HAPPY_ENV must name a deployment")?;
            let rendered = render_hosted_config(&env);
            tokio::fs::write(&output, rendered)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            tracing::info!(env = %env.as_str(), path = %output.display(), "Config written");
        }
    }

    Ok(())
}
