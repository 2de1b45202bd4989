//! config command - create and inspect the config file

use std::fmt;

use clap::{Args, Subcommand};
use dt_core::{ConfigManager, Settings, StoragePath};
use serde::Serialize;

use super::report;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write a config file holding the default settings
    Init(InitArgs),

    /// Print the config file location and the settings in effect
    Show,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct ConfigOutput {
    path: String,
    /// Folder today's files are stored under
    storage_folder: String,
    settings: Settings,
}

impl fmt::Display for ConfigOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = toml::to_string_pretty(&self.settings).map_err(|_| fmt::Error)?;
        writeln!(f, "# {}", self.path)?;
        writeln!(f, "# storage folder: {}", self.storage_folder)?;
        write!(f, "{}", body.trim_end())
    }
}

pub async fn execute(cmd: ConfigCommands, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let manager = match ConfigManager::new() {
        Ok(manager) => manager,
        Err(e) => return report(&formatter, "Failed to locate config directory", &e),
    };

    match cmd {
        ConfigCommands::Init(args) => execute_init(args, &manager, &formatter),
        ConfigCommands::Show => execute_show(&manager, &formatter),
    }
}

fn execute_init(args: InitArgs, manager: &ConfigManager, formatter: &Formatter) -> ExitCode {
    let path = manager.config_path();
    if path.exists() && !args.force {
        formatter.error(&format!(
            "{} already exists, use --force to overwrite it",
            path.display()
        ));
        return ExitCode::Conflict;
    }

    match manager.save(&Settings::default()) {
        Ok(()) => {
            formatter.success(&format!(
                "Wrote {}",
                formatter.style_path(&path.display().to_string())
            ));
            ExitCode::Success
        }
        Err(e) => report(formatter, "Failed to write config", &e),
    }
}

fn execute_show(manager: &ConfigManager, formatter: &Formatter) -> ExitCode {
    match show(manager) {
        Ok(output) => {
            formatter.output(&output);
            ExitCode::Success
        }
        Err(e) => report(formatter, "Failed to load config", &e),
    }
}

fn show(manager: &ConfigManager) -> dt_core::Result<ConfigOutput> {
    let settings = manager.load()?;
    let config = settings.to_config()?;
    Ok(ConfigOutput {
        path: manager.config_path().display().to_string(),
        storage_folder: config
            .storage_root()
            .join(&config.storage_folders())
            .to_string(),
        settings,
    })
}
