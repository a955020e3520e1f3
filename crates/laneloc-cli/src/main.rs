//! `laneloc` – lane localisation command line.
//!
//! 1. `run` boots the event bus, the lane filter node and the WebSocket
//!    bridge, and serves until **Ctrl-C**, which publishes a disable switch
//!    before exiting.
//! 2. `replay` drives the filter over a JSON-lines recording, one line per
//!    processed cycle.
//! 3. `schema` prints the JSON Schema of the filter configuration.
//! 4. `init` writes the default configuration file.

mod args;
mod config;
mod replay;

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use laneloc_middleware::{EventBus, WsBridge};
use laneloc_runtime::{LaneFilterNode, init_tracing};
use laneloc_types::{Event, EventPayload, LaneError, LaneFilterConfig, LaneStatus};
use tokio::sync::Notify;
use tracing::warn;

use crate::args::{Cli, Command, RunArgs};

fn main() -> ExitCode {
    let command = Cli::parse().into_command();

    // Held for the whole process so pending spans are flushed on exit.
    let _guard = init_tracing("laneloc");

    let result = match command {
        Command::Run(RunArgs { config, port }) => cmd_run(config.as_deref(), port),
        Command::Replay { file, config } => cmd_replay(&file, config.as_deref()),
        Command::Schema => cmd_schema(),
        Command::Init { config, force } => cmd_init(config.as_deref(), force),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// run
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_run(config_path: Option<&Path>, port: Option<u16>) -> Result<(), LaneError> {
    let cfg = config::resolve(config_path)?;
    let port = port.unwrap_or(cfg.ws_port);
    let node = LaneFilterNode::new(cfg.filter)?;

    print_banner();
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| LaneError::Channel(format!("failed to start async runtime: {e}")))?;

    runtime.block_on(async move {
        let bus = Arc::new(EventBus::default());
        let shutdown = Arc::new(Notify::new());

        let bus_ctrlc = Arc::clone(&bus);
        let shutdown_ctrlc = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            println!("{}", "⚠  Ctrl-C received – disabling lane filter …".yellow().bold());
            let stop = Event::new("laneloc-cli", EventPayload::Switch { enabled: false });
            if bus_ctrlc.publish(stop).is_ok() {
                println!("{}", "  ✓ Disable switch published.".green());
            }
            shutdown_ctrlc.notify_one();
        }) {
            warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
        }

        let node_task = tokio::spawn(node.run(Arc::clone(&bus)));
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        println!(
            "  WebSocket bridge on {}",
            format!("ws://{addr}").bold()
        );
        let server = WsBridge::new(Arc::clone(&bus)).run_ws_server(addr);

        let result = tokio::select! {
            r = server => r,
            _ = shutdown.notified() => Ok(()),
        };
        node_task.abort();
        println!("{}", "  ✓ Exiting laneloc.".green());
        result
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// replay
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_replay(file: &Path, config_path: Option<&Path>) -> Result<(), LaneError> {
    let cfg = config::resolve(config_path)?;
    let mut node = LaneFilterNode::new(cfg.filter)?;
    let reader = File::open(file).map(BufReader::new).map_err(|e| {
        LaneError::Serialization(format!("Failed to open {}: {e}", file.display()))
    })?;

    let stats = replay::replay(reader, &mut node, |out| {
        let p = &out.pose;
        let status = match p.status {
            LaneStatus::Normal if p.in_lane => "in lane".green(),
            LaneStatus::Normal => "lost".yellow(),
            LaneStatus::Recovered => "recovered".red(),
        };
        println!(
            "{}  d={:+.3}  phi={:+.3}  {:<11} {:<9} mass={:.3} segs={}",
            p.stamp.format("%H:%M:%S%.3f").to_string().dimmed(),
            p.d,
            p.phi,
            p.curvature_label.to_string(),
            status,
            out.diagnostics.max_mass,
            out.diagnostics.retained_segments,
        );
    })?;

    println!(
        "\n  {} {} cycles from {} lines ({} skipped, {} recoveries)",
        "✓".green().bold(),
        stats.cycles,
        stats.lines,
        stats.skipped,
        stats.recoveries
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// schema / init
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_schema() -> Result<(), LaneError> {
    let schema = schemars::schema_for!(LaneFilterConfig);
    let json = serde_json::to_string_pretty(&schema)
        .map_err(|e| LaneError::Serialization(e.to_string()))?;
    println!("{json}");
    Ok(())
}

fn cmd_init(config_path: Option<&Path>, force: bool) -> Result<(), LaneError> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config::config_path);
    if path.exists() && !force {
        return Err(LaneError::InvalidConfiguration(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    config::save_to(&config::CliConfig::default(), &path)?;
    println!(
        "  {} Config saved to {}",
        "✓".green().bold(),
        path.display().to_string().bold()
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!(
        "  {} {}",
        "laneloc".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Histogram lane localisation");
    println!();
}
