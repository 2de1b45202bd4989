//! cp command - copy a file between backends

use std::fmt;

use clap::Args;
use dt_core::{BackendFamily, PathHandle, PathResolver, StoragePath, TransferEngine};
use serde::Serialize;

use super::{PathRef, report, resolve_arg};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Copy a file
#[derive(Args, Debug)]
pub struct CpArgs {
    /// Source path (local, s3://, gs://, az:// or ssh://)
    pub source: String,

    /// Target path. An existing directory receives a file of the same name.
    pub target: String,
}

/// Result of one transfer
#[derive(Debug, Serialize)]
pub(super) struct TransferOutput {
    pub operation: &'static str,
    pub source: String,
    pub target: String,
    pub from: BackendFamily,
    pub to: BackendFamily,
}

impl fmt::Display for TransferOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.operation == "move" { "Moved" } else { "Copied" };
        write!(f, "{verb} {} -> {}", self.source, self.target)
    }
}

pub async fn execute(args: CpArgs, resolver: &PathResolver, output_config: OutputConfig) -> ExitCode {
    transfer(&args.source, &args.target, false, resolver, output_config).await
}

/// Shared by cp and mv
pub(super) async fn transfer(
    source: &str,
    target: &str,
    delete_source: bool,
    resolver: &PathResolver,
    output_config: OutputConfig,
) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let source = match resolve_arg(resolver, source, &formatter) {
        Ok(path) => path,
        Err(code) => return code,
    };
    let target = match resolve_arg(resolver, target, &formatter) {
        Ok(path) => path,
        Err(code) => return code,
    };

    let target = match target_for(&source, target).await {
        Ok(target) => target,
        Err(e) => return report(&formatter, "Failed to inspect target", &e),
    };

    let output = TransferOutput {
        operation: if delete_source { "move" } else { "copy" },
        source: source.to_string(),
        target: target.to_string(),
        from: source.family(),
        to: target.family(),
    };

    let mut source = PathRef::new(source);
    let target = PathRef::new(target);
    match TransferEngine::new()
        .transfer_file(&mut source, &target, delete_source)
        .await
    {
        Ok(()) => {
            formatter.output(&output);
            ExitCode::Success
        }
        Err(e) => report(&formatter, "Transfer failed", &e),
    }
}

/// Place the file inside `target` when it is an existing directory
async fn target_for(source: &PathHandle, target: PathHandle) -> dt_core::Result<PathHandle> {
    let name = source.name();
    if !name.is_empty() && target.is_dir().await? {
        return Ok(target.join(&name));
    }
    Ok(target)
}
