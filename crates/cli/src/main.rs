//! Out-of-order core simulator CLI.
//!
//! Runs a guest ELF executable on the out-of-order core model and prints
//! the statistics banner. Configuration is a JSON document mirroring the
//! simulator's hierarchical config; the CLI uses built-in defaults when
//! no document is supplied.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use oosim_core::Config;
use oosim_core::Simulator;

#[derive(Parser, Debug)]
#[command(
    name = "oosim",
    author,
    version,
    about = "Cycle-accurate out-of-order CPU core simulator",
    long_about = "Run a RISC-V 64-bit ELF executable on a configurable superscalar \
out-of-order core model.\n\nExamples:\n  oosim run software/bin/qsort\n  oosim run --config configs/wide.json software/bin/qsort\n  oosim run --stats-sections summary,issue software/bin/qsort"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a guest ELF executable to completion.
    Run {
        /// Guest ELF executable to run.
        executable: PathBuf,

        /// JSON configuration document; defaults are used when omitted.
        #[arg(short, long)]
        config: Option<String>,

        /// Comma-separated statistics sections to print: "summary" or a
        /// counter prefix such as "issue" or "dispatch". All sections
        /// when omitted.
        #[arg(long = "stats-sections", value_delimiter = ',')]
        stats_sections: Vec<String>,

        /// Suppress the statistics banner entirely.
        #[arg(short, long)]
        quiet: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            executable,
            config,
            stats_sections,
            quiet,
        }) => cmd_run(executable, config, stats_sections, quiet),
        None => {
            eprintln!("oosim — pass a subcommand");
            eprintln!();
            eprintln!("  oosim run <executable>                     Run with defaults");
            eprintln!("  oosim run --config <doc.json> <executable> Run with a config document");
            eprintln!("  oosim run --stats-sections summary,issue <executable>");
            eprintln!();
            eprintln!("  oosim --help  for full options");
            process::exit(1);
        }
    }
}

/// Runs the simulator to completion, prints the requested statistics
/// sections, and exits with the guest's exit code.
fn cmd_run(
    executable: PathBuf,
    config: Option<String>,
    stats_sections: Vec<String>,
    quiet: bool,
) {
    let config = match config {
        Some(path) => Config::from_json_file(&path).unwrap_or_else(|e| {
            eprintln!("[!] FATAL: {e}");
            process::exit(1);
        }),
        None => Config::default(),
    };

    let mut simulator = Simulator::from_elf(&config, &executable).unwrap_or_else(|e| {
        eprintln!("[!] FATAL: {e}");
        process::exit(1);
    });

    let exit_code = simulator.run();

    if !quiet {
        simulator.print_stats_sections(&stats_sections);
    }

    match exit_code {
        Some(code) => {
            println!("\n[*] Exit code {code}");
            process::exit(code as i32);
        }
        None => {
            eprintln!("\n[!] Guest halted without exiting");
            process::exit(1);
        }
    }
}
