//! Operation log for quotastore.
//!
//! Storage mutations, denials and quota rejections are emitted as `tracing`
//! events under the `quotastore` target. The configured level applies to
//! those events; dependencies only report warnings. `RUST_LOG` replaces
//! both when set.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::Result;

/// Parse log level string to tracing Level.
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Filter directives used when `RUST_LOG` is not set.
fn default_directives(level: Level) -> String {
    format!("warn,{}={}", env!("CARGO_CRATE_NAME"), level.as_str().to_lowercase())
}

fn storage_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(parse_level(level))))
}

/// Open the operation log, keeping earlier runs when `append` is set.
fn open_log_file(config: &LoggingConfig) -> Result<File> {
    if let Some(parent) = Path::new(&config.file).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = if config.append {
        OpenOptions::new().create(true).append(true).open(&config.file)?
    } else {
        File::create(&config.file)?
    };
    Ok(file)
}

/// Initialize logging to stdout and the operation log file.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let log_file = Arc::new(open_log_file(config)?);
    let writer = std::io::stdout.and(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(false)
                .with_line_number(false),
        )
        .with(storage_filter(&config.level))
        .init();

    Ok(())
}

/// Initialize console-only logging.
///
/// Used as a fallback when the log file cannot be opened.
pub fn init_console_only(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(true)
                .with_target(true),
        )
        .with(storage_filter(level))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_parse_level_known() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("info"), Level::INFO);
        assert_eq!(parse_level("Error"), Level::ERROR);
    }

    #[test]
    fn test_parse_level_warn_aliases() {
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("WARNING"), Level::WARN);
    }

    #[test]
    fn test_parse_level_default() {
        assert_eq!(parse_level("verbose"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_default_directives_scope_crate() {
        assert_eq!(default_directives(Level::DEBUG), "warn,quotastore=debug");
        assert_eq!(default_directives(Level::ERROR), "warn,quotastore=error");
    }

    #[test]
    fn test_open_log_file_append_keeps_trail() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = LoggingConfig {
            file: temp_dir
                .path()
                .join("logs/ops.log")
                .to_string_lossy()
                .into_owned(),
            ..LoggingConfig::default()
        };

        writeln!(open_log_file(&config).unwrap(), "first run").unwrap();
        writeln!(open_log_file(&config).unwrap(), "second run").unwrap();
        let trail = fs::read_to_string(&config.file).unwrap();
        assert_eq!(trail, "first run\nsecond run\n");

        config.append = false;
        writeln!(open_log_file(&config).unwrap(), "fresh").unwrap();
        assert_eq!(fs::read_to_string(&config.file).unwrap(), "fresh\n");
    }
}
