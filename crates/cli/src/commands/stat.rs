//! stat command - show what a path points at

use std::fmt;

use clap::Args;
use dt_core::{BackendFamily, PathHandle, PathResolver, StoragePath};
use serde::Serialize;

use super::{report, resolve_arg};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Show path information
#[derive(Args, Debug)]
pub struct StatArgs {
    /// Path to inspect
    pub path: String,
}

#[derive(Debug, Serialize)]
struct StatOutput {
    path: String,
    backend: BackendFamily,
    exists: bool,
    is_dir: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    #[serde(skip)]
    styled: Option<StyledStat>,
}

/// Pre-styled lines for human output
#[derive(Debug)]
struct StyledStat {
    lines: Vec<(String, String)>,
}

impl StatOutput {
    fn style(mut self, formatter: &Formatter) -> Self {
        let kind = match (self.exists, self.is_dir) {
            (false, _) => "missing",
            (true, true) => "directory",
            (true, false) => "file",
        };
        let mut lines = vec![
            (formatter.style_key("Path"), formatter.style_path(&self.path)),
            (formatter.style_key("Backend"), self.backend.to_string()),
            (formatter.style_key("Type"), kind.to_string()),
        ];
        if let Some(size) = self.size_bytes {
            let human = humansize::format_size(size, humansize::DECIMAL);
            lines.push((
                formatter.style_key("Size"),
                format!("{} ({size} bytes)", formatter.style_size(&human)),
            ));
        }
        self.styled = Some(StyledStat { lines });
        self
    }
}

impl fmt::Display for StatOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(styled) = &self.styled else {
            return write!(f, "{}", self.path);
        };
        for (i, (key, value)) in styled.lines.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{key:>8}: {value}")?;
        }
        Ok(())
    }
}

pub async fn execute(args: StatArgs, resolver: &PathResolver, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let path = match resolve_arg(resolver, &args.path, &formatter) {
        Ok(path) => path,
        Err(code) => return code,
    };

    match stat(&path).await {
        Ok(output) => {
            formatter.output(&output.style(&formatter));
            ExitCode::Success
        }
        Err(e) => report(&formatter, &format!("Failed to stat {path}"), &e),
    }
}

async fn stat(path: &PathHandle) -> dt_core::Result<StatOutput> {
    let exists = path.exists().await?;
    let is_dir = exists && path.is_dir().await?;
    let size_bytes = if exists && !is_dir {
        file_size(path).await?
    } else {
        None
    };

    Ok(StatOutput {
        path: path.to_string(),
        backend: path.family(),
        exists,
        is_dir,
        size_bytes,
        styled: None,
    })
}

async fn file_size(path: &PathHandle) -> dt_core::Result<Option<u64>> {
    match path {
        PathHandle::Local(local) => Ok(Some(tokio::fs::metadata(local.as_path()).await?.len())),
        PathHandle::Cloud(cloud) => {
            let info = cloud.store()?.head_object(cloud).await?;
            Ok(info.size_bytes.and_then(|n| u64::try_from(n).ok()))
        }
        PathHandle::Remote(remote) => Ok(remote.sftp().await?.stat(remote.path()).await?.size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_stat_local_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "12345").unwrap();

        let path = PathResolver::default()
            .resolve(&file.to_string_lossy())
            .unwrap();
        let output = stat(&path).await.unwrap();

        assert!(output.exists);
        assert!(!output.is_dir);
        assert_eq!(output.size_bytes, Some(5));
        assert_eq!(output.backend, BackendFamily::Local);
    }

    #[tokio::test]
    async fn test_stat_missing_and_directory() {
        let dir = TempDir::new().unwrap();
        let resolver = PathResolver::default();

        let missing = stat(&resolver.resolve(&dir.path().join("x").to_string_lossy()).unwrap())
            .await
            .unwrap();
        assert!(!missing.exists);
        assert_eq!(missing.size_bytes, None);

        let folder = stat(&resolver.resolve(&dir.path().to_string_lossy()).unwrap())
            .await
            .unwrap();
        assert!(folder.is_dir);
        assert_eq!(folder.size_bytes, None);
    }

    #[test]
    fn test_human_output() {
        let output = StatOutput {
            path: "s3://bucket/a.csv".to_string(),
            backend: BackendFamily::Cloud,
            exists: true,
            is_dir: false,
            size_bytes: Some(2048),
            styled: None,
        }
        .style(&Formatter::new(OutputConfig {
            no_color: true,
            ..Default::default()
        }));

        let text = output.to_string();
        assert!(text.contains("Backend: cloud"));
        assert!(text.contains("Type: file"));
        assert!(text.contains("(2048 bytes)"));

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["size_bytes"], 2048);
        assert!(json.get("styled").is_none());
    }
}
