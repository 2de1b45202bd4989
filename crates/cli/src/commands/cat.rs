//! cat command - print a file's contents

use std::fmt;

use clap::Args;
use dt_core::{PathResolver, StoragePath};
use serde::Serialize;

use super::{report, resolve_arg};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Print a file
#[derive(Args, Debug)]
pub struct CatArgs {
    /// Path to read
    pub path: String,
}

#[derive(Debug, Serialize)]
struct CatOutput {
    path: String,
    size_bytes: usize,
    /// Invalid UTF-8 is replaced with U+FFFD
    content: String,
}

impl fmt::Display for CatOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

pub async fn execute(args: CatArgs, resolver: &PathResolver, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let path = match resolve_arg(resolver, &args.path, &formatter) {
        Ok(path) => path,
        Err(code) => return code,
    };

    let data = match path.read_bytes().await {
        Ok(data) => data,
        Err(e) => return report(&formatter, &format!("Failed to read {path}"), &e),
    };

    if formatter.is_json() {
        formatter.output(&CatOutput {
            path: path.to_string(),
            size_bytes: data.len(),
            content: String::from_utf8_lossy(&data).into_owned(),
        });
        return ExitCode::Success;
    }

    match formatter.write_raw(&data) {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            formatter.error(&format!("Failed to write to stdout: {e}"));
            ExitCode::GeneralError
        }
    }
}
