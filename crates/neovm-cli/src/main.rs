//! NeoVM command-line tool
//!
//! Runs scripts under a gas meter, with optional breakpoints, and
//! disassembles them. Scripts are given as hex or as a file path.

mod commands;
mod gas;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use neovm::VmState;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "neovm")]
#[command(about = "Run and inspect NeoVM scripts", long_about = None)]
#[command(version)]
struct Cli {
    /// Log more (-v debug, -vv trace); RUST_LOG applies otherwise
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Colored output: auto, always or never
    #[arg(long, default_value = "auto", global = true)]
    color: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a script
    Run {
        /// Script as hex, or a path to a binary or hex file
        script: String,
        /// TOML file with engine limits
        #[arg(long)]
        limits: Option<PathBuf>,
        /// GAS budget in datoshi
        #[arg(long)]
        gas: Option<u64>,
        /// Multiplier applied to every opcode price
        #[arg(long, default_value_t = gas::DEFAULT_FEE_FACTOR)]
        fee_factor: u64,
        /// Pause before the instruction at OFFSET and print the stack
        #[arg(long = "break", value_name = "OFFSET")]
        break_points: Vec<usize>,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Disassemble a script
    Disasm {
        /// Script as hex, or a path to a binary or hex file
        script: String,
        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run { script, limits, gas, fee_factor, break_points, json } => {
            let state = commands::run::execute(commands::run::RunArgs {
                script,
                limits,
                gas,
                fee_factor,
                break_points,
                json,
                color: cli.color,
            })?;
            Ok(if state == VmState::Halt { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Commands::Disasm { script, json } => {
            commands::disasm::execute(commands::disasm::DisasmArgs {
                script,
                json,
                color: cli.color,
            })?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
