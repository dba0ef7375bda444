mod cmd;
mod output;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use zbuild_lib::consts::DEFAULT_FILE;
use zbuild_lib::platform::arch::Arch;

use crate::cmd::{GlobalOpts, UpdateFlags};
use crate::output::OutputFormat;

/// zbuild - Resolve and lock declarative image definitions
#[derive(Parser)]
#[command(name = "zbuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Path of the definition file, relative to the build context
  #[arg(short, long, global = true, default_value = DEFAULT_FILE)]
  file: String,

  /// Build context (a local directory or a git:// URL)
  #[arg(short, long, global = true, default_value = ".")]
  context: String,

  /// Log level (error, warn, info, debug, trace). RUST_LOG takes precedence.
  #[arg(long, global = true, default_value = "info")]
  log_level: String,

  /// Docker CLI used to read files from images and git contexts
  #[arg(long, global = true, default_value = "docker")]
  docker_bin: String,

  /// Abort when the command takes longer than this (e.g., "30s", "5m")
  #[arg(long, global = true, value_parser = humantime::parse_duration)]
  timeout: Option<Duration>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Resolve every locked dependency and write the lock file
  Update {
    /// Keep the locked base image
    #[arg(long)]
    no_image_update: bool,

    /// Keep the locked system packages
    #[arg(long)]
    no_packages_update: bool,

    /// Keep the locked PHP extensions
    #[arg(long)]
    no_extensions_update: bool,

    /// Resolve APT packages from a Debian repository index instead of the
    /// base image (e.g., "buster=http://deb.debian.org/debian")
    #[arg(long = "dpkg-repo", value_name = "SUITE=URL")]
    dpkg_repos: Vec<String>,

    /// Reuse downloaded repository indexes younger than this (e.g., "6h", "0s")
    #[arg(long, value_parser = humantime::parse_duration, default_value = "6h")]
    index_ttl: Duration,

    /// Architecture of the packages resolved from repository indexes
    /// (amd64, arm64). Defaults to the host architecture.
    #[arg(long, value_parser = cmd::parse_arch)]
    arch: Option<Arch>,
  },

  /// Print the resolved configuration of a stage
  DebugConfig {
    /// Stage to resolve (use "webserver-<stage>" for the embedded webserver)
    #[arg(short, long, default_value = "dev")]
    stage: String,
  },

  /// Print the build plan of a stage
  Plan {
    /// Stage to plan (use "webserver-<stage>" for the embedded webserver)
    #[arg(short, long, default_value = "dev")]
    stage: String,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "json")]
    output: OutputFormat,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
  let ctx = CancellationToken::new();
  spawn_canceller(ctx.clone(), cli.timeout);

  let global = GlobalOpts {
    file: cli.file,
    context: cli.context,
    docker_bin: cli.docker_bin,
  };

  match cli.command {
    Commands::Update {
      no_image_update,
      no_packages_update,
      no_extensions_update,
      dpkg_repos,
      index_ttl,
      arch,
    } => {
      let flags = UpdateFlags {
        update_image_ref: !no_image_update,
        update_system_packages: !no_packages_update,
        update_extensions: !no_extensions_update,
        dpkg_repos,
        index_ttl,
        arch: arch.unwrap_or_default(),
      };
      cmd::cmd_update(&ctx, &global, flags).await
    }
    Commands::DebugConfig { stage } => cmd::cmd_debug_config(&ctx, &global, &stage).await,
    Commands::Plan { stage, output } => cmd::cmd_plan(&ctx, &global, &stage, output).await,
  }
}

/// Cancels `ctx` on Ctrl-C or once `timeout` elapsed.
fn spawn_canceller(ctx: CancellationToken, timeout: Option<Duration>) {
  tokio::spawn(async move {
    let deadline = async {
      match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
      }
    };

    tokio::select! {
      _ = ctx.cancelled() => {}
      _ = tokio::signal::ctrl_c() => {
        debug!("interrupted");
        ctx.cancel();
      }
      _ = deadline => {
        debug!("timeout reached");
        ctx.cancel();
      }
    }
  });
}
