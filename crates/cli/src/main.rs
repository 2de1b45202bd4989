//! dt - copy, move and inspect files across local disks, object storage and
//! SSH hosts
//!
//! Usage:
//!   dt cp ./report.csv s3://bucket/reports/
//!   dt mv ssh://deploy@host/var/out/a.json gs://archive/2024/a.json
//!   dt stat az://container/data.parquet
//!   dt config init

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use dt_core::{Backends, ConfigManager, PathResolver, SshAuth, StoreRegistry};

mod commands;
mod exit_code;
mod output;

use commands::Commands;
use exit_code::ExitCode;
use output::OutputConfig;

/// Move files between local disks, object storage and SSH hosts
#[derive(Parser, Debug)]
#[command(name = "dt", version)]
struct Cli {
    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    debug: bool,

    /// Password for ssh:// paths
    #[arg(long, global = true, env = "DT_SSH_PASSWORD", hide_env_values = true)]
    ssh_password: Option<String>,

    /// Private key for ssh:// paths, overriding the config file
    #[arg(long, global = true)]
    ssh_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_config(&self) -> OutputConfig {
        OutputConfig {
            json: self.json,
            no_color: self.no_color,
            quiet: self.quiet,
        }
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let output_config = cli.output_config();

    // Config commands must work without a readable config file.
    let command = match cli.command {
        Commands::Config(cmd) => return Ok(commands::config::execute(cmd, output_config).await),
        command => command,
    };

    let settings = ConfigManager::new()
        .and_then(|manager| manager.load())
        .context("Failed to load configuration")?;

    let stores = StoreRegistry::global();
    dt_cloud::register_stores(&stores, (&settings.s3).into())
        .await
        .context("Failed to set up object storage clients")?;
    let sessions = dt_ssh::install();

    let auth = SshAuth {
        password: cli.ssh_password.clone(),
        key_path: cli.ssh_key.clone().or(settings.ssh.key_path),
    };
    let resolver = PathResolver::new(Backends {
        sessions: Some(sessions.clone()),
        stores: Some(stores),
    })
    .with_ssh_auth(auth);

    let code = commands::execute(command, &resolver, output_config).await;

    sessions.close_all().await;
    Ok(code)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let code = run(cli).await?;
    std::process::exit(code.as_i32());
}
