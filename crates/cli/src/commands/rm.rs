//! rm command - remove a file

use clap::Args;
use dt_core::{PathResolver, StoragePath};

use super::{report, resolve_arg};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Remove a file
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Path to remove
    pub path: String,

    /// Succeed when the file does not exist
    #[arg(long)]
    pub missing_ok: bool,
}

pub async fn execute(args: RmArgs, resolver: &PathResolver, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let path = match resolve_arg(resolver, &args.path, &formatter) {
        Ok(path) => path,
        Err(code) => return code,
    };

    match path.delete(args.missing_ok).await {
        Ok(()) => {
            formatter.success(&format!("Removed {}", formatter.style_path(&path.to_string())));
            ExitCode::Success
        }
        Err(e) => report(&formatter, &format!("Failed to remove {path}"), &e),
    }
}
