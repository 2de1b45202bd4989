//! Output formatting for human-readable and JSON modes

mod formatter;

pub use formatter::Formatter;

/// Output options shared by every command
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Print machine-readable JSON instead of text
    pub json: bool,
    pub no_color: bool,
    /// Suppress everything except errors
    pub quiet: bool,
}
