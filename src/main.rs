mod channel;
mod cli;
mod config;
mod error;
mod model;
mod panel;
mod protocol;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;
use error::PanelError;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "CYCLE_PANEL_LOG";

/// Default filter when `CYCLE_PANEL_LOG` is unset. Headless stderr already
/// carries the status lines, so only warnings are added there.
fn default_filter(headless: bool) -> &'static str {
    if headless {
        "cycle_panel=warn"
    } else {
        "cycle_panel=info"
    }
}

/// Exit code for a failed run, when it differs from the default of 1.
fn exit_code(err: &anyhow::Error) -> Option<i32> {
    match err.downcast_ref::<PanelError>() {
        Some(PanelError::Validation(_)) => Some(2),
        _ => None,
    }
}

/// Route tracing output. The TUI owns the terminal, so it logs to a daily
/// rolling file; headless mode logs warnings to stderr.
fn init_tracing(headless: bool) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_filter(headless)));

    let log_dir = dirs::data_local_dir().map(|d| d.join("cycle-panel").join("logs"));
    match log_dir {
        Some(dir) if !headless && cfg!(feature = "tui") => {
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::daily(&dir, "cycle-panel.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let headless = args.headless;
    let _guard = init_tracing(headless)?;

    match cli::run(args).await {
        Ok(()) => {
            if headless {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("{e:#}");
            // Validation failures were already reported as a notice.
            if let Some(code) = exit_code(&e) {
                std::process::exit(code);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_defaults_depend_on_mode() {
        assert_eq!(default_filter(false), "cycle_panel=info");
        assert_eq!(default_filter(true), "cycle_panel=warn");
    }

    #[test]
    fn validation_failures_exit_with_two() {
        let err = anyhow::Error::from(PanelError::Validation("blank".into()));
        assert_eq!(exit_code(&err), Some(2));
        let err = anyhow::Error::from(PanelError::Transport("refused".into()));
        assert_eq!(exit_code(&err), None);
    }
}
