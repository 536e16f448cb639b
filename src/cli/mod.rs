// Command tree and dispatch

pub mod image;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config;
use crate::docker::{BollardEngine, DockerCli, ImageEngine};

#[derive(Parser, Debug)]
#[command(name = "ek", author, version, about = "Kubernetes terminal tool", long_about = None)]
pub struct Cli {
    /// Registry credentials file (TOML, or a Docker config.json)
    #[arg(long, global = true, env = "EK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v for info, -vv for debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Pull an image from its registry
    Pull {
        /// Image reference (e.g., registry.example.com/team/app:v1)
        image: String,
    },
    /// Tag a local image with a new reference
    Tag {
        /// Existing local image
        source: String,
        /// New reference (e.g., registry.example.com/team/app:v2)
        target: String,
    },
    /// Push an image to its registry
    Push {
        /// Image reference (e.g., registry.example.com/team/app:v1)
        image: String,
    },
}

/// Exit status for a failed argument parse: 0 for help/version output, 1 otherwise
pub fn parse_error_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() {
        1
    } else {
        0
    }
}

/// Builds the client used by image commands
#[async_trait]
pub trait ClientFactory: Send + Sync {
    type Engine: ImageEngine;

    async fn create(&self, config_path: &Path) -> Result<DockerCli<Self::Engine>>;
}

/// Factory that connects to the local container engine
pub struct LocalEngineFactory;

#[async_trait]
impl ClientFactory for LocalEngineFactory {
    type Engine = BollardEngine;

    async fn create(&self, config_path: &Path) -> Result<DockerCli<BollardEngine>> {
        DockerCli::connect(config_path).await
    }
}

/// Registered commands with their injected dependencies
pub struct App<F> {
    factory: F,
}

impl<F: ClientFactory> App<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    /// Run the parsed command line
    pub async fn run(&self, cli: Cli) -> Result<()> {
        let Some(command) = cli.command else {
            debug!("No subcommand given, nothing to do");
            return Ok(());
        };

        let config_path = match cli.config {
            Some(path) => path,
            None => config::default_config_path()?,
        };
        debug!("Using config file: {}", config_path.display());

        let mut client = self
            .factory
            .create(&config_path)
            .await
            .context("Failed to initialize container engine client")?;

        match command {
            Commands::Pull { image } => image::pull(&mut client, &image).await,
            Commands::Tag { source, target } => image::tag(&mut client, &source, &target).await,
            Commands::Push { image } => image::push(&mut client, &image).await,
        }
    }
}
