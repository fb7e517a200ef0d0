// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod pipeline;
pub mod types;
pub mod watch;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{Settings, resolve_settings};
use crate::engine::{ActionDispatcher, ActionFilter, LoggingBackend};
use crate::pipeline::{CoalescingPipeline, PipelineOptions};
use crate::watch::{FileWatcher, WatcherOptions};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - settings (config file + CLI overrides)
/// - the recursive file watcher
/// - the coalescing pipeline feeding the action dispatcher
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let settings = resolve_settings(args.config.as_deref(), &args.overrides())?;

    println!("==> Now monitoring folder for changes: '{}'", settings.folder.display());
    println!("{}", settings.one_line_summary());

    if args.dry_run {
        debug!(?settings, "dry-run complete (not watching)");
        return Ok(());
    }

    let watcher = Arc::new(FileWatcher::spawn(watcher_options(&settings))?);
    let pipeline = spawn_pipeline(&settings);
    watcher.get_root_watcher().listen_shared(pipeline.listener());

    // Ctrl-C → close the watcher, which ends the notification loop.
    {
        let watcher = Arc::clone(&watcher);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("Ctrl+C received; shutting down");
            watcher.close();
        });
    }

    watcher.join().await?;
    pipeline.close();
    info!("watchrun stopped");
    Ok(())
}

/// Watcher construction options derived from validated settings.
pub fn watcher_options(settings: &Settings) -> WatcherOptions {
    WatcherOptions::new(settings.folder.clone())
        .auto_register(settings.auto_register)
        .dedup_window(settings.dedup_window)
        .workers(settings.workers)
}

/// Coalescing pipeline ending in the logging action backend.
pub fn spawn_pipeline(settings: &Settings) -> CoalescingPipeline {
    let filter = ActionFilter::new(settings.kinds.iter().copied(), settings.recursive);
    let dispatcher = ActionDispatcher::new(filter, LoggingBackend);
    let options = PipelineOptions {
        quiet_period: settings.quiet_period,
        settle_delay: settings.command_delay,
    };
    CoalescingPipeline::spawn(options, Arc::new(dispatcher))
}
