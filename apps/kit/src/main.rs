use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use ebpf_common::{Config, ModuleId};
use ebpf_framework::{
    CommandRegistry, ConfigError, ControlPlane, Dispatcher, ModuleRegistry, RunState,
};
use ebpf_probes::{bump_memlock_rlimit, resolve_interface, AyaSurface};
use log::{info, warn, LevelFilter};
use signal_hook::consts::{SIGINT, SIGTERM};

/// Loads the kit BPF object, attaches its hook modules and prints the
/// events they report until interrupted.
///
/// Usage:
///   sudo kit -t eth0
///   sudo kit -t eth0 -v --config kit.json
///
/// Example configuration (kit.json):
/// ```json
/// {
///   "scheduler_hook": { "enabled": true },
///   "filesystem_hook": { "enabled": true, "programs": { "tp_sys_enter_openat": false } },
///   "xdp_mode": "replace"
/// }
/// ```
#[derive(Parser, Debug)]
#[command(name = "kit")]
#[command(about = "eBPF hook module loader and event dispatcher", long_about = None)]
struct Args {
    /// Activate the XDP filter on this network interface
    #[arg(short = 't', long = "interface", value_name = "NETWORK INTERFACE")]
    interface: Option<String>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// Module configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to BPF object file
    #[arg(short, long, default_value = "bpf/kit.bpf.o")]
    bpf_obj: PathBuf,
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    // Nothing below may touch the kernel until the configuration checks out.
    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .map_err(ConfigError::from)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::default(),
    };

    let ifindex = match &args.interface {
        Some(name) => {
            let index =
                resolve_interface(name).map_err(|_| ConfigError::UnknownInterface(name.clone()))?;
            info!("Activating filter on network interface: {} (ifindex {})", name, index);
            Some(index)
        }
        None => {
            if config.network_filter.enabled {
                warn!("No interface given with -t, {} stays disabled", ModuleId::NetworkFilter);
            }
            None
        }
    };

    let registry = ModuleRegistry::from_config(&config, ifindex);
    registry.validate()?;

    bump_memlock_rlimit().context("failed to increase RLIMIT_MEMLOCK")?;

    let run_state = RunState::new();
    for sig in [SIGINT, SIGTERM] {
        signal_hook::flag::register(sig, run_state.flag())
            .with_context(|| format!("failed to register handler for signal {}", sig))?;
    }

    let dispatcher = Dispatcher::new(CommandRegistry::with_defaults(), args.verbose);
    let mut control_plane = ControlPlane::new(AyaSurface::new(&args.bpf_obj), registry, dispatcher);

    let stats = control_plane.run(&run_state)?;
    info!("Exiting cleanly after {} records", stats.records);
    Ok(())
}
