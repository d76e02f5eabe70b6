use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// `RUST_LOG` plus the crate's own level and `warn` for dependencies
pub fn env_filter(verbose: bool) -> Result<EnvFilter> {
    let level = if verbose { "catalog_crawler=debug" } else { "catalog_crawler=info" };

    Ok(EnvFilter::from_default_env()
        .add_directive(level.parse()?)
        .add_directive("warn".parse()?))
}

/// Initialize the logging system, optionally mirroring output to `log_file`
pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
            }

            let file = fs::File::create(path)
                .with_context(|| format!("Failed to create log file: {}", path.display()))?;

            Some(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(file),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter(verbose)?)
        .with(fmt_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

/// Default log file under the platform data directory
pub fn default_log_file() -> PathBuf {
    let mut path = if let Some(proj_dirs) = directories::ProjectDirs::from("com", "catalog-crawler", "catalog-crawler") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from("./logs")
    };

    path.push("crawler.log");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_levels() {
        let quiet = env_filter(false).unwrap().to_string();
        let verbose = env_filter(true).unwrap().to_string();

        assert!(quiet.contains("catalog_crawler=info"));
        assert!(verbose.contains("catalog_crawler=debug"));
    }

    #[test]
    fn test_default_log_file_name() {
        assert!(default_log_file().ends_with("crawler.log"));
    }
}
