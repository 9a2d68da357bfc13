//! CLI argument definitions for the Framesift binary.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use framesift_core::config::FramesiftConfig;

/// Framesift - distributed video frame extraction and semantic frame search.
#[derive(Parser, Debug)]
#[command(name = "framesift", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the SQLite databases.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the worker registry.
    Registry(ServeArgs),
    /// Run the dispatcher that routes videos to leased workers.
    Dispatcher(ServeArgs),
    /// Run an extraction worker.
    Extractor(ServeArgs),
    /// Run the frame ingestion pipeline.
    Embedder(EmbedderArgs),
    /// Run the text search service.
    Query(ServeArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Address to listen on, overriding the role's configured bind.
    #[arg(short = 'b', long = "bind")]
    pub bind: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct EmbedderArgs {
    /// Run a single polling cycle and exit.
    #[arg(long = "once")]
    pub once: bool,
}

impl Command {
    pub fn role(&self) -> &'static str {
        match self {
            Command::Registry(_) => "registry",
            Command::Dispatcher(_) => "dispatcher",
            Command::Extractor(_) => "extractor",
            Command::Embedder(_) => "embedder",
            Command::Query(_) => "query",
        }
    }
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > FRAMESIFT_CONFIG env var > ~/.framesift/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("FRAMESIFT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Apply the flags that override configuration values.
    pub fn apply_to(&self, config: &mut FramesiftConfig) {
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(ref dir) = self.data_dir {
            config.general.data_dir = dir.to_string_lossy().into_owned();
        }

        let (slot, args) = match &self.command {
            Command::Registry(args) => (&mut config.registry.bind, args),
            Command::Dispatcher(args) => (&mut config.dispatcher.bind, args),
            Command::Extractor(args) => (&mut config.extractor.bind, args),
            Command::Query(args) => (&mut config.query.bind, args),
            Command::Embedder(_) => return,
        };
        if let Some(ref bind) = args.bind {
            *slot = bind.clone();
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".framesift").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".framesift").join("config.toml");
    }
    PathBuf::from("config.toml")
}
