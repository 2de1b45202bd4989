//! mkdir command - create a directory

use clap::Args;
use dt_core::{PathResolver, StoragePath};

use super::{report, resolve_arg};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Create a directory
#[derive(Args, Debug)]
pub struct MkdirArgs {
    /// Directory to create
    pub path: String,

    /// Create missing parents; an existing directory is not an error
    #[arg(short, long)]
    pub parents: bool,
}

pub async fn execute(args: MkdirArgs, resolver: &PathResolver, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let path = match resolve_arg(resolver, &args.path, &formatter) {
        Ok(path) => path,
        Err(code) => return code,
    };

    match path.make_dirs(args.parents).await {
        Ok(()) => {
            formatter.success(&format!("Created {}", formatter.style_path(&path.to_string())));
            ExitCode::Success
        }
        Err(e) => report(&formatter, &format!("Failed to create {path}"), &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quiet() -> OutputConfig {
        OutputConfig {
            quiet: true,
            ..Default::default()
        }
    }

    fn mkdir(path: &std::path::Path, parents: bool) -> MkdirArgs {
        MkdirArgs {
            path: path.to_string_lossy().into_owned(),
            parents,
        }
    }

    #[tokio::test]
    async fn test_mkdir_parents_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b/c");

        for _ in 0..2 {
            let code = execute(mkdir(&nested, true), &PathResolver::default(), quiet()).await;
            assert_eq!(code, ExitCode::Success);
        }
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_mkdir_existing_without_parents_conflicts() {
        let dir = TempDir::new().unwrap();
        let code = execute(mkdir(dir.path(), false), &PathResolver::default(), quiet()).await;
        assert_eq!(code, ExitCode::Conflict);
    }
}
