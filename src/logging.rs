/// File-based tracing. The TUI owns the terminal, so everything goes to
/// `{data_dir}/repochat.log` instead of stderr.
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE: &str = "repochat.log";

/// Filter from `REPOCHAT_LOG` (e.g. `repochat=trace`), else info / debug.
fn build_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env("REPOCHAT_LOG").unwrap_or_else(|_| default_filter(verbose))
}

fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::new(if verbose { "repochat=debug,info" } else { "info" })
}

/// Install the global subscriber. Keep the returned guard alive for the whole
/// process; dropping it flushes and stops the writer thread.
pub fn init(data_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
    let appender = tracing_appender::rolling::never(data_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbose))
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to install log subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_levels() {
        assert_eq!(default_filter(false).to_string().to_lowercase(), "info");
        assert!(default_filter(true).to_string().to_lowercase().contains("repochat=debug"));
    }
}
