use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use knotcore::config::{DaemonConfig, ZoneKind};
use knotcore::dynamic_update::{DynamicUpdateProcessor, UpdatePolicy};
use knotcore::graceful_shutdown::GracefulShutdown;
use knotcore::metrics::DnsMetrics;
use knotcore::name::Name;
use knotcore::pidfile::PidFile;
use knotcore::server::{self, ServerContext};
use knotcore::xfr::{NotifyHandler, TaskQueue, TsigContext, XfrKind, XfrTask, XfrWorker};
use knotcore::zone::{MemoryZoneStorage, ZoneStorage, ZoneStore};

/// Command-line front end for the authoritative zone daemon. Configuration
/// lives in a TOML file (`-c`); zone file loading, the on-disk journal and
/// PID-file/daemonization are owned by collaborators this binary only
/// references, not implements.
#[derive(Parser, Debug)]
#[command(name = "knotd", version, about = "Authoritative DNS zone daemon")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short = 'c', long = "config", default_value = "knotd.toml")]
    config: String,

    /// Stay attached to the controlling terminal instead of daemonizing
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Increase log verbosity; repeat for more (-v, -vv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = match DaemonConfig::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!(
                "failed to load config '{}': {e}; starting with defaults and no zones",
                cli.config
            );
            DaemonConfig::parse("").expect("the empty config always parses")
        }
    };

    init_logging(&config.log_level, cli.verbose, cli.debug);

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if config.worker_threads > 0 {
        builder.worker_threads(config.worker_threads);
    }
    let runtime = builder.build()?;
    runtime.block_on(run(config))
}

fn init_logging(configured_level: &str, verbose: u8, debug: bool) {
    let level = match verbose {
        0 if debug => "debug",
        0 => configured_level,
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: DaemonConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!(zones = config.zones.len(), listeners = config.listen_addrs.len(), "starting knotd");

    let _pid_guard = match &config.pid_file {
        Some(path) => Some(PidFile::acquire(path)?),
        None => None,
    };

    let zone_store = Arc::new(ZoneStore::new());
    let mut transfer_acl = HashMap::new();
    let mut allowed_notifiers = Vec::new();
    let mut notify_targets = HashMap::new();

    for zone in &config.zones {
        let apex = parse_apex(&zone.name);
        zone_store.create_zone(&apex);
        let key = apex.to_text().to_ascii_lowercase();
        transfer_acl.insert(key.clone(), zone.allow_transfer.clone());
        allowed_notifiers.extend(zone.allow_notify.iter().cloned());
        if !zone.notify.is_empty() {
            notify_targets.insert(key, zone.notify.clone());
        }
    }

    let storage: Arc<dyn ZoneStorage> = Arc::new(MemoryZoneStorage::new());
    let notify_handler = Arc::new(NotifyHandler::new(zone_store.clone(), allowed_notifiers));
    let update_processor = Arc::new(DynamicUpdateProcessor::new(
        zone_store.clone(),
        config.tsig_keys.clone(),
        UpdatePolicy::default(),
        notify_handler.clone(),
        notify_targets,
    ));
    let metrics = Arc::new(DnsMetrics::new()?);

    let ctx = Arc::new(ServerContext::new(
        zone_store.clone(),
        storage.clone(),
        notify_handler,
        update_processor,
        metrics,
        transfer_acl,
    ));

    let shutdown = Arc::new(GracefulShutdown::new(zone_store.clone()));
    let query_semaphore = Arc::new(Semaphore::new(config.xfr_concurrency.max(1) * 16));

    let task_queue: TaskQueue = Arc::new(crossbeam::queue::SegQueue::new());
    let xfr_worker = Arc::new(XfrWorker::new(
        task_queue.clone(),
        config.xfr_concurrency.max(1),
        config.max_bootstrap_retries,
        zone_store.clone(),
        storage,
    ));
    {
        let worker = xfr_worker.clone();
        let rx = shutdown.subscribe();
        tokio::spawn(async move { worker.run(rx).await });
    }

    for zone in &config.zones {
        if zone.kind != ZoneKind::Secondary {
            continue;
        }
        let Some(master) = zone.masters.first().copied() else {
            warn!(zone = %zone.name, "secondary zone has no configured master, skipping initial pull");
            continue;
        };
        let apex = parse_apex(&zone.name);
        let mut task = XfrTask::new(
            next_task_id(),
            XfrKind::AxfrIn,
            apex,
            master,
            std::time::Duration::from_secs(60),
        );
        if let Some(key_name) = &zone.tsig_key
            && let Some(key) = config.tsig_keys.get(key_name)
        {
            task.tsig = Some(TsigContext::new(key.clone()));
        }
        task_queue.push(task);
    }

    let mut listeners = Vec::new();
    for addr in config.listen_addrs.iter().copied() {
        let udp_ctx = ctx.clone();
        let udp_sem = query_semaphore.clone();
        let udp_rx = shutdown.subscribe();
        listeners.push(tokio::spawn(async move {
            if let Err(e) = server::run_udp_server(addr, udp_ctx, udp_sem, udp_rx).await {
                error!(%addr, error = %e, "UDP server exited");
            }
        }));

        let tcp_ctx = ctx.clone();
        let tcp_sem = query_semaphore.clone();
        let tcp_rx = shutdown.subscribe();
        listeners.push(tokio::spawn(async move {
            if let Err(e) = server::run_tcp_server(addr, tcp_ctx, tcp_sem, tcp_rx).await {
                error!(%addr, error = %e, "TCP server exited");
            }
        }));
    }

    wait_for_shutdown_signal().await;
    shutdown.shutdown().await?;

    for handle in listeners {
        handle.abort();
    }

    Ok(())
}

fn parse_apex(name: &str) -> Name {
    Name::parse(&format!("{}.", name.trim_end_matches('.')))
}

fn next_task_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Waits for a termination signal. SIGHUP/SIGUSR2 are acknowledged but not
/// acted on: config and zone reload are owned by the collaborator that
/// parses zone files and the on-disk journal, not this binary.
async fn wait_for_shutdown_signal() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
    let mut sigusr2 = signal(SignalKind::user_defined2()).expect("failed to install SIGUSR2 handler");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT, shutting down");
                return;
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                return;
            }
            _ = sighup.recv() => {
                warn!("received SIGHUP; config reload is not implemented in this build, ignoring");
            }
            _ = sigusr2.recv() => {
                info!("received SIGUSR2; zone reload signal is not implemented in this build, ignoring");
            }
        }
    }
}
