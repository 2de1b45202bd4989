//! Command implementations
//!
//! Each command takes its parsed arguments, a [`PathResolver`] and the output
//! options, and returns the process exit code.

use clap::Subcommand;
use dt_core::{FileRef, PathHandle, PathResolver};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

mod cat;
pub mod config;
mod cp;
mod mkdir;
mod mv;
mod rm;
mod stat;

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy a file between any two backends
    Cp(cp::CpArgs),

    /// Move a file: copy, then delete the source
    Mv(mv::MvArgs),

    /// Print a file's contents
    Cat(cat::CatArgs),

    /// Remove a file
    Rm(rm::RmArgs),

    /// Create a directory
    Mkdir(mkdir::MkdirArgs),

    /// Show what a path points at
    Stat(stat::StatArgs),

    /// Manage the config file
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

pub async fn execute(
    command: Commands,
    resolver: &PathResolver,
    output_config: OutputConfig,
) -> ExitCode {
    match command {
        Commands::Cp(args) => cp::execute(args, resolver, output_config).await,
        Commands::Mv(args) => mv::execute(args, resolver, output_config).await,
        Commands::Cat(args) => cat::execute(args, resolver, output_config).await,
        Commands::Rm(args) => rm::execute(args, resolver, output_config).await,
        Commands::Mkdir(args) => mkdir::execute(args, resolver, output_config).await,
        Commands::Stat(args) => stat::execute(args, resolver, output_config).await,
        Commands::Config(cmd) => config::execute(cmd, output_config).await,
    }
}

/// Resolve a path argument, reporting a bad one as a usage error
fn resolve_arg(
    resolver: &PathResolver,
    text: &str,
    formatter: &Formatter,
) -> Result<PathHandle, ExitCode> {
    resolver.resolve(text).map_err(|e| {
        formatter.error(&format!("Invalid path '{text}': {e}"));
        ExitCode::UsageError
    })
}

/// Print `error` with some context and pick the exit code
fn report(formatter: &Formatter, context: &str, error: &dt_core::Error) -> ExitCode {
    formatter.error(&format!("{context}: {error}"));
    ExitCode::from_error(error)
}

/// A bare path handed to the transfer engine. Holds no cached content.
#[derive(Debug)]
struct PathRef {
    path: PathHandle,
}

impl PathRef {
    fn new(path: PathHandle) -> Self {
        Self { path }
    }
}

impl FileRef for PathRef {
    fn path(&self) -> &PathHandle {
        &self.path
    }

    fn name(&self) -> String {
        self.path.to_string()
    }

    fn clear_content(&mut self) {}
}
