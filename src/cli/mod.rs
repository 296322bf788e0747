//! CLI module for vidsqueeze
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::utils::logging::{LogFormat, LogLevel};

pub mod args;
pub mod commands;

/// vidsqueeze video compressor
///
/// Compresses video with a local encoder binary and falls back to an
/// in-process engine when the binary is missing or fails.
#[derive(Parser, Debug)]
#[command(name = "vidsqueeze")]
#[command(about = "vidsqueeze - Video compression with encoder fallback")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "VIDSQUEEZE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compress a video file
    Compress(args::CompressArgs),
    /// Run the HTTP service
    Serve(args::ServeArgs),
    /// Report which encoder backends can run
    Check(args::CheckArgs),
}
