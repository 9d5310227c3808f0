mod addressing;
mod backend;
mod constants;
mod data;
mod devices;
mod input;
mod interface;
mod plugin;
mod store;
mod transport;

#[cfg(debug_assertions)]
mod sim;

use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre;

use addressing::baud_code;
use backend::{BackendConfig, build_backend};
use interface::InterfaceMode;
use plugin::{Plugin, PluginConfig};
use store::MemoryStore;
use transport::{run_host_loop, spawn_console_reader};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "DTS238 three-phase energy meter poller")]
struct Args {
    /// Serial port path (e.g. /dev/ttyUSB0)
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate (9600, 4800, 2400 or 1200)
    #[arg(short, long)]
    baud: Option<u32>,

    /// Meter slave addresses, comma separated; append new meters at the end
    #[arg(short, long, default_value = "2,3,4")]
    meters: String,

    /// Poll interval in seconds
    #[arg(
        short = 'i',
        long,
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..=300)
    )]
    poll_interval: u64,

    /// Language for device names (en, it)
    #[arg(short, long, default_value = "en")]
    language: String,

    /// Device interface
    #[arg(short = 'I', long, value_enum, default_value_t = InterfaceMode::Remote)]
    interface: InterfaceMode,

    /// Disable meter address rewrites
    #[arg(short = 'r', long, default_value_t = false)]
    read_only: bool,
}

#[derive(Debug, Clone)]
struct RuntimeArgs {
    backend: BackendConfig,
    plugin: PluginConfig,
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let args = Args::parse();
    let runtime = resolve_runtime_args(&args)?;

    let backend = build_backend(&runtime.backend)?;
    let mut plugin = Plugin::new(runtime.plugin, backend, MemoryStore::default());
    plugin.on_start()?;

    let (event_tx, event_rx) = mpsc::channel();
    // Detached: a blocked stdin read must not hold up shutdown.
    let _console = spawn_console_reader(event_tx);
    run_host_loop(&mut plugin, &event_rx);

    plugin.on_stop();
    Ok(())
}

fn resolve_runtime_args(args: &Args) -> eyre::Result<RuntimeArgs> {
    let interface = {
        #[cfg(debug_assertions)]
        {
            resolve_interface_mode(args)
        }
        #[cfg(not(debug_assertions))]
        {
            resolve_interface_mode(args)?
        }
    };
    let baud = args.baud.unwrap_or(interface.default_baud());
    let baud_code =
        baud_code(baud).ok_or_else(|| eyre::eyre!("unsupported baud rate {baud} for DTS238"))?;

    let port = match interface {
        InterfaceMode::Simulation => None,
        InterfaceMode::Remote => Some(args.port.clone().ok_or_else(|| {
            eyre::eyre!("serial port required unless using simulation interface")
        })?),
    };

    Ok(RuntimeArgs {
        backend: BackendConfig {
            port,
            baud,
            interface,
            meters: addressing::parse_meter_addresses(&args.meters),
        },
        plugin: PluginConfig {
            poll_interval: Duration::from_secs(args.poll_interval),
            meters: args.meters.clone(),
            language: args.language.clone(),
            baud_code,
            read_only: args.read_only,
        },
    })
}

#[cfg(debug_assertions)]
fn resolve_interface_mode(args: &Args) -> InterfaceMode {
    args.interface
}

#[cfg(not(debug_assertions))]
fn resolve_interface_mode(args: &Args) -> eyre::Result<InterfaceMode> {
    if args.interface == InterfaceMode::Simulation {
        return Err(eyre::eyre!(
            "simulation interface is only available in debug builds"
        ));
    }
    Ok(args.interface)
}
