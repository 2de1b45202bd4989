//! mv command - copy a file, then delete the source

use clap::Args;
use dt_core::PathResolver;

use crate::exit_code::ExitCode;
use crate::output::OutputConfig;

/// Move a file
#[derive(Args, Debug)]
pub struct MvArgs {
    /// Source path, deleted once the copy succeeds
    pub source: String,

    /// Target path. An existing directory receives a file of the same name.
    pub target: String,
}

pub async fn execute(args: MvArgs, resolver: &PathResolver, output_config: OutputConfig) -> ExitCode {
    super::cp::transfer(&args.source, &args.target, true, resolver, output_config).await
}
