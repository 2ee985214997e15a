//! opbridge command-line interface
//!
//! List, describe and run native operations by name.

mod args;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use opbridge::{call, introspect, operations, CallOptions};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::args::{parse_option, parse_value, render};

#[derive(Parser)]
#[command(name = "opbridge")]
#[command(version)]
#[command(about = "Call native operations by name", long_about = None)]
struct Cli {
    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every registered operation
    List,
    /// Show the arguments of an operation
    Describe {
        /// Operation name
        operation: String,
    },
    /// Run an operation and print its result
    Run {
        /// Operation name
        operation: String,
        /// Required inputs, in order
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
        /// Optional argument as name=value
        #[arg(short = 'o', long = "option")]
        options: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    install_tracing(cli.verbose);

    match cli.command {
        Commands::List => list_operations(),
        Commands::Describe { operation } => describe_operation(&operation),
        Commands::Run { operation, args, options } => run_operation(&operation, &args, &options),
    }
}

fn install_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Print every operation with its description
fn list_operations() -> ExitCode {
    for (name, description) in operations() {
        println!("{:<16} {}", name, description);
    }
    ExitCode::SUCCESS
}

/// Print the manifest of one operation
fn describe_operation(operation: &str) -> ExitCode {
    match introspect(operation) {
        Ok(manifest) => {
            print!("{}", manifest.describe());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Parse the arguments, call the operation and print the result
fn run_operation(operation: &str, args: &[String], options: &[String]) -> ExitCode {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        match parse_value(arg) {
            Ok(value) => values.push(value),
            Err(e) => {
                eprintln!("Error: argument '{}': {}", arg, e);
                return ExitCode::FAILURE;
            }
        }
    }

    let mut call_options = CallOptions::new();
    for option in options {
        match parse_option(option) {
            Ok((name, value)) => call_options.set(name, value),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    debug!(operation, args = values.len(), options = call_options.len(), "running");
    match call(operation, &values, &call_options) {
        Ok(result) => {
            println!("{}", render(&result));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
