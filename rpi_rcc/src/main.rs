//! # RPI Control Core
//!
//! Loads primitive nets from JSON files and cycles them in real time.
//!
//! Nets given on the command line form a chain: the first one starts
//! immediately, each following one starts when its predecessor terminates
//! and may read the predecessor's netcomm channels. The process exits when
//! the whole chain has finished or on SIGINT/SIGTERM.

use clap::Parser;
use rpi_common::config::{ConfigLoader, LogLevel, RccConfig};
use rpi_net::runtime::{NotificationExecutor, PrimitiveRegistry, Scheduler};
use rpi_rcc::device::build_devices;
use rpi_rcc::loader::NetLoader;
use rpi_rcc::rt::RtPlan;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// RPI Control Core: cyclic primitive-net executor
#[derive(Parser, Debug)]
#[command(name = "rpi_rcc")]
#[command(version)]
#[command(about = "Deterministic cyclic executor for primitive nets")]
struct Args {
    /// Path to the control core configuration TOML.
    #[arg(short, long, default_value = "config/rcc.toml")]
    config: PathBuf,

    /// Net files to run, in chain order.
    #[arg(required = true, value_name = "NET")]
    nets: Vec<PathBuf>,

    /// CPU core to pin the cycle thread to, overriding `[rt] cpu_core`.
    #[arg(long)]
    cpu_core: Option<usize>,

    /// SCHED_FIFO priority, overriding `[rt] priority`.
    #[arg(long)]
    rt_priority: Option<i32>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = RccConfig::load(&args.config);
    setup_tracing(&args, config.as_ref().ok().map(|c| c.shared.log_level));

    info!("RPI Control Core v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = config
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        .and_then(|config| run(&args, config));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("RPI Control Core shutdown complete");
}

fn run(args: &Args, mut config: RccConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.rt.cpu_core = args.cpu_core.or(config.rt.cpu_core);
    config.rt.priority = args.rt_priority.or(config.rt.priority);
    config.validate()?;
    info!(
        "Config OK: service={}, cycle_time={}µs, devices={}",
        config.shared.service_name,
        config.engine.cycle_time_us,
        config.devices.len(),
    );

    let devices = build_devices(&config.devices)?;
    let registry = PrimitiveRegistry::with_builtins();
    let executor = NotificationExecutor::spawn(
        &format!("{}-notify", config.shared.service_name),
        config.engine.notification_queue_capacity,
    )?;
    let mut scheduler = Scheduler::new(config.engine.clone(), executor.clone());

    let loader = NetLoader::new(&registry, &devices, &config.engine);
    let handles = loader.load_chain(&mut scheduler, &args.nets)?;
    info!("Loaded {} nets", handles.len());

    // Setup signal handler for graceful shutdown.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    let shutdown = handles.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        for handle in &shutdown {
            handle.kill();
        }
        r.store(false, Ordering::SeqCst);
    })?;

    RtPlan::new(&config.rt).apply()?;
    scheduler.run(&running);

    for handle in &handles {
        info!("Net {} finished: {}", handle.id(), handle.status());
    }
    let ids: Vec<String> = scheduler.net_ids().into_iter().map(String::from).collect();
    for id in &ids {
        scheduler.unload(id)?;
    }
    executor.flush();
    executor.close();
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: Option<LogLevel>) {
    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        let level = configured.unwrap_or_default().as_directive();
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
