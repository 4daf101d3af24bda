mod avs;
mod collaborators;
mod config;
mod dispatcher;
mod event;
mod ptl;
mod retry;
mod status;
mod timer;

use avs::AppliedVersionsStore;
use clap::Parser;
use collaborators::{
    load_multipart_cache_fixture, InMemoryMultipartCache, InMemoryNotificationSink,
    LoggingComponentRpc, NoopRootUpdatePolicy,
};
use config::CoreConfig;
use dispatcher::CoreEngine;
use event::Event;
use eyre::{eyre, Result};
use fs2::FileExt;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(
    name = "webcfg-agent",
    version,
    about = "Device-side configuration agent: dispatches subdocs to components and tracks the async apply lifecycle to completion."
)]
struct Args {
    /// Where the Applied-Versions Store's packed binary encoding is persisted between runs.
    #[arg(long, default_value = "state/avs.bin")]
    applied_versions_file: PathBuf,

    /// JSON fixture describing the cached multipart bundle the retry engine rebuilds requests
    /// from. Omit to run with an empty cache (retries always fail until one is supplied).
    #[arg(long)]
    multipart_cache_file: Option<PathBuf>,

    /// Stamped onto every upstream notification this run emits.
    #[arg(long, default_value = "gtx-0")]
    global_transaction_id: String,

    /// Process the events already queued on stdin and exit, instead of running the timer loop
    /// and waiting indefinitely for more.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let cfg = CoreConfig::from_cli(
        args.applied_versions_file,
        args.multipart_cache_file,
        args.global_transaction_id,
        args.once,
    )?;

    // Ensure the state directory exists before we create/lock the lockfile.
    if let Some(parent) = cfg.applied_versions_file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                eyre!(
                    "failed to create applied-versions directory {}: {e}",
                    parent.display()
                )
            })?;
        }
    }

    // Single-instance guard: lock alongside the applied-versions file.
    let lock_file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&cfg.lock_file)
        .map_err(|e| eyre!("failed to open lock file {}: {e}", cfg.lock_file.display()))?;
    lock_file.try_lock_exclusive().map_err(|e| {
        eyre!(
            "webcfg-agent already running or lock unavailable ({}): {e}",
            cfg.lock_file.display()
        )
    })?;
    let _lock_guard = lock_file;

    let avs = AppliedVersionsStore::load(&cfg.applied_versions_file)?;

    let cache = match &cfg.multipart_cache_file {
        Some(path) => Arc::new(load_multipart_cache_fixture(path)?),
        None => Arc::new(InMemoryMultipartCache::default()),
    };

    tracing::info!(
        applied_versions_file = %cfg.applied_versions_file.display(),
        global_tx = %cfg.global_transaction_id,
        once = cfg.once,
        "webcfg-agent starting"
    );

    let mut engine = CoreEngine::new(
        avs,
        cache,
        Arc::new(LoggingComponentRpc),
        Arc::new(InMemoryNotificationSink::new()),
        Arc::new(NoopRootUpdatePolicy),
        cfg.global_transaction_id.clone(),
    );

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    if cfg.once {
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            engine.dispatch(Event::parse(&line)).await;
        }
    } else {
        engine.spawn_timer_loop();
        let sender = engine.event_sender();
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                if sender.send(line).is_err() {
                    break;
                }
            }
        });
        engine.run().await;
    }

    engine
        .avs()
        .persist(&cfg.applied_versions_file)
        .map_err(|e| eyre!("failed to persist applied-versions store: {e}"))?;

    tracing::info!("webcfg-agent exiting");
    Ok(())
}
