//! `water-devices` entry point.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::{
    config::HookBuilder,
    eyre::{self, Result},
};
use tracing_subscriber::EnvFilter;
use waterui_device::output::{OutputFormat, set_global_output_format};

use commands::{Session, list, select, watch};

/// Discover, watch and select `WaterUI` target devices.
#[derive(Parser, Debug)]
#[command(name = "water-devices", version, about, long_about = None)]
struct Cli {
    /// Output in JSON format (machine-readable).
    #[arg(long, global = true)]
    json: bool,

    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only consider the device with this id (case-insensitive).
    #[arg(long, global = true, env = "WATER_DEVICE")]
    device: Option<String>,

    /// Project root containing `Water.toml`.
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List connected devices.
    List(list::Args),

    /// Print devices as they appear and disappear until Ctrl+C.
    Watch(watch::Args),

    /// Pick a target device per configured platform.
    Select(select::Args),
}

fn init_tracing(verbose: u8, json: bool) -> Result<()> {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().try_init()
    } else {
        builder.without_time().try_init()
    }
    .map_err(|err| eyre::eyre!(err))
}

fn main() -> Result<()> {
    HookBuilder::default()
        .display_env_section(false)
        .issue_url("https://github.com/water-rs/waterui/issues/new")
        .install()?;

    let cli = Cli::parse();

    set_global_output_format(if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    });
    init_tracing(cli.verbose, cli.json)?;

    let session = Session::open(&cli.project, cli.device)?;

    smol::block_on(async {
        match cli.command {
            Commands::List(args) => list::run(&session, args).await,
            Commands::Watch(args) => watch::run(&session, args).await,
            Commands::Select(args) => select::run(&session, args).await,
        }
    })
}
