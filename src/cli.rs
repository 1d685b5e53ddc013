// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `meshsim`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "meshsim",
    version,
    about = "Drive a mesh network simulation of real device processes from an interactive shell.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `meshsim.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Device executable, overriding `[simulation].node_exe`.
    #[arg(long, value_name = "PATH")]
    pub node_exe: Option<String>,

    /// Initial simulation speed, overriding `[simulation].speed`.
    #[arg(long, value_name = "SPEED")]
    pub speed: Option<f64>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `MESHSIM_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
