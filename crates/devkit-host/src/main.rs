//! Devkit host command-line tool.
//!
//! # Usage
//!
//! ```text
//! devkit-host [--config <FILE>] <COMMAND>
//!
//! Commands:
//!   path check   <PATH> [--context system|title]   Validate a device path
//!   path parent  <PATH>                            Print the directory part
//!   path combine <BASE> <RELATIVE>                 Append a relative path
//!   watch <ENTITY> --script <STEPS>                Monitor a scripted entity
//! ```
//!
//! `watch` drives a real execution state monitor against a
//! [`ScriptedQueryPort`], so the poll loop, transient-error handling and the
//! terminal failure event can be exercised without a device attached:
//!
//! ```text
//! devkit-host watch Contoso.Game --script "Constrained,!transient,Running,!fatal:uninstalled"
//! ```
//!
//! # Logging
//!
//! `RUST_LOG` takes precedence; otherwise `host.log_level` from the config
//! file is used.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use devkit_core::domain::path::{combine, directory_name};
use devkit_core::{DevicePath, EntityHandle, PathContext};
use devkit_host::application::monitor::StateObserver;
use devkit_host::application::registry::MonitorRegistry;
use devkit_host::infrastructure::observers::{ChannelObserver, LoggingObserver};
use devkit_host::infrastructure::remote::ScriptedQueryPort;
use devkit_host::infrastructure::storage::config::{load_config, AppConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "devkit-host",
    about = "Host-side tooling for remote devkits",
    version
)]
struct Cli {
    /// Config file to use instead of the platform default location.
    #[arg(long, global = true, env = "DEVKIT_HOST_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Device path utilities.
    #[command(subcommand)]
    Path(PathCommand),

    /// Watch the execution state of an entity served by a scripted device.
    Watch {
        /// Entity to watch, typically a package full name.
        entity: String,

        /// Comma-separated answers: state names, `!transient`, `!fatal[:msg]`, `?raw`.
        #[arg(long)]
        script: String,
    },
}

#[derive(Debug, Subcommand)]
enum PathCommand {
    /// Validate a path and describe its origin.
    Check {
        path: String,
        #[arg(long, default_value_t = PathContext::System)]
        context: PathContext,
    },
    /// Print the directory part of a path.
    Parent { path: String },
    /// Append a relative path to a rooted base.
    Combine { base: String, relative: String },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.host.log_level)),
        )
        .init();

    match cli.command {
        Command::Path(command) => run_path(command),
        Command::Watch { entity, script } => watch(&config, EntityHandle::new(entity), &script).await,
    }
}

fn run_path(command: PathCommand) -> anyhow::Result<()> {
    match command {
        PathCommand::Check { path, context } => {
            let parsed = DevicePath::parse(&path, context)
                .with_context(|| format!("'{path}' is not a valid device path"))?;
            match parsed.origin() {
                Some(origin) => println!(
                    "{parsed}  valid, origin {}, context {}",
                    origin.token(),
                    parsed.context()
                ),
                None => println!("{parsed}  valid, relative, context {}", parsed.context()),
            }
            if parsed.is_root() {
                println!("  (root)");
            }
        }
        PathCommand::Parent { path } => match directory_name(&path)? {
            Some(parent) => println!("{parent}"),
            None => println!("<none>"),
        },
        PathCommand::Combine { base, relative } => {
            println!("{}", combine(&base, &relative)?);
        }
    }
    Ok(())
}

/// Subscribes a channel and a logging observer, prints every event, and
/// returns after the terminal event or Ctrl-C.
async fn watch(config: &AppConfig, entity: EntityHandle, script: &str) -> anyhow::Result<()> {
    let port = ScriptedQueryPort::from_script(script).context("invalid --script")?;
    if let Some(device) = &config.host.default_device {
        debug!(device = %device, "scripted watch ignores the configured device");
    }

    let registry = MonitorRegistry::new(Arc::new(port), config.monitor.to_monitor_config());
    let (channel, mut rx) = ChannelObserver::channel();
    let channel: Arc<dyn StateObserver> = channel;
    let logger: Arc<dyn StateObserver> = Arc::new(LoggingObserver::new(entity.clone()));
    registry.subscribe(&entity, Arc::clone(&channel))?;
    registry.subscribe(&entity, Arc::clone(&logger))?;
    info!(
        entities = ?registry.entities(),
        "watching execution state, press Ctrl-C to stop"
    );

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match &event.error {
                    Some(err) => {
                        println!("{} -> {} (monitoring ended: {err})", event.previous_state, event.new_state);
                        break;
                    }
                    None => println!("{} -> {}", event.previous_state, event.new_state),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    // The last unsubscribe waits for the worker thread; keep it off the runtime.
    let released = tokio::task::spawn_blocking(move || {
        registry.unsubscribe(&entity, &channel);
        registry.unsubscribe(&entity, &logger);
        registry.prune_idle()
    })
    .await
    .context("monitor shutdown task failed")?;
    debug!(released, "released idle monitors");
    Ok(())
}
