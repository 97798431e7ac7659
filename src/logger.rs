//! Logging for experiment runs
//!
//! Events go to stdout and, when the run writes output, to a plain text log in
//! the run directory. The file layer also records each closing `scenario`
//! span, so the log shows how long every scenario took.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use tracing_subscriber::fmt::{self, format::FmtSpan, time};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

/// Path of the run log, `None` when the run writes no output or no file is configured
pub fn log_file(settings: &Settings) -> Option<PathBuf> {
    if !settings.output.write {
        return None;
    }
    settings
        .log
        .file
        .as_ref()
        .map(|name| Path::new(&settings.output.path).join(name))
}

/// Install the global subscriber for a run
///
/// The filter comes from `settings.log.level`. Calling it again in the same
/// process keeps the first subscriber but still creates the new run log.
pub fn setup_log(settings: &Settings) -> Result<()> {
    let filter = EnvFilter::try_new(settings.log.level.as_str())?;

    let file_layer = match log_file(settings) {
        Some(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let file = File::create(&path)?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_timer(time::uptime())
                    .with_span_events(FmtSpan::CLOSE),
            )
        }
        None => None,
    };

    let stdout_layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(time::uptime());

    if tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("global subscriber already set, keeping it");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_log_lives_in_the_output_directory() {
        let mut settings = Settings::default();
        settings.output.path = "runs/today".to_string();
        assert_eq!(
            log_file(&settings),
            Some(Path::new("runs/today").join("run.log"))
        );

        settings.log.file = Some("debug.log".to_string());
        assert_eq!(
            log_file(&settings),
            Some(Path::new("runs/today").join("debug.log"))
        );

        settings.output.write = false;
        assert_eq!(log_file(&settings), None);

        settings.output.write = true;
        settings.log.file = None;
        assert_eq!(log_file(&settings), None);
    }
}
