use crate::channel::{self, ChannelEvent};
use crate::config::{self, FileConfig, Settings};
use crate::model::{InboundMessage, StartForm};
use crate::panel::ControlPanel;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let mut out = std::io::LineWriter::new(std::io::stdout().lock());
        let mut err = std::io::LineWriter::new(std::io::stderr().lock());

        while let Some(line) = rx.blocking_recv() {
            let _ = match line {
                OutputLine::Stdout(msg) => writeln!(out, "{}", msg),
                OutputLine::Stderr(msg) => writeln!(err, "{}", msg),
            };
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "cycle-panel",
    version,
    about = "Control panel for a remote cycle runner"
)]
pub struct Cli {
    /// Base URL of the cycle runner server [default: http://127.0.0.1:5000]
    #[arg(long)]
    pub server: Option<String>,

    /// Keywords to prefill (required before starting)
    #[arg(long)]
    pub keywords: Option<String>,

    /// Target website to prefill (required before starting)
    #[arg(long)]
    pub website: Option<String>,

    /// Number of cycles, passed through as typed [default: 10]
    #[arg(long, allow_hyphen_values = true)]
    pub cycles: Option<String>,

    /// Delay between cycles, passed through as typed [default: 30]
    #[arg(long, allow_hyphen_values = true)]
    pub delay: Option<String>,

    /// Run without the terminal UI; status lines go to stderr
    #[arg(long)]
    pub headless: bool,

    /// In headless mode, submit a start request once connected
    #[arg(long, requires = "headless")]
    pub start: bool,

    /// Give up connecting after this long [default: 10s]
    #[arg(long)]
    pub connect_timeout: Option<humantime::Duration>,

    /// Headless: how long to wait for the stop acknowledgement after Ctrl-C [default: 5s]
    #[arg(long)]
    pub stop_grace: Option<humantime::Duration>,

    /// Path to a TOML config file (default: <config dir>/cycle-panel/config.toml)
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,
}

pub async fn run(args: Cli) -> Result<()> {
    let file = config::load(args.config.as_deref())?;
    let settings = build_settings(&args, file)?;
    tracing::info!("server {}", settings.server);

    if args.headless {
        return run_headless(settings, args.start).await;
    }

    #[cfg(feature = "tui")]
    {
        crate::tui::run(settings).await
    }
    #[cfg(not(feature = "tui"))]
    {
        // Fallback when built without TUI support.
        run_headless(settings, args.start).await
    }
}

/// Merge CLI flags over the config file over built-in defaults.
pub fn build_settings(args: &Cli, file: FileConfig) -> Result<Settings> {
    let server = args
        .server
        .clone()
        .or(file.server)
        .unwrap_or_else(|| config::DEFAULT_SERVER.to_string());
    let server = Url::parse(&server).with_context(|| format!("invalid server URL `{server}`"))?;
    // Fail early on schemes the channel cannot speak.
    channel::endpoint_url(&server)?;

    let form = StartForm {
        keywords: args
            .keywords
            .clone()
            .or(file.form.keywords)
            .unwrap_or_default(),
        website: args
            .website
            .clone()
            .or(file.form.website)
            .unwrap_or_default(),
        cycles: args
            .cycles
            .clone()
            .or_else(|| file.form.cycles.map(|n| n.to_string()))
            .unwrap_or_else(|| config::DEFAULT_CYCLES.to_string()),
        delay: args
            .delay
            .clone()
            .or_else(|| file.form.delay.map(|n| n.to_string()))
            .unwrap_or_else(|| config::DEFAULT_DELAY.to_string()),
    };

    Ok(Settings {
        server,
        form,
        connect_timeout: args
            .connect_timeout
            .map(Duration::from)
            .or(file.connect_timeout)
            .unwrap_or(config::DEFAULT_CONNECT_TIMEOUT),
        stop_grace: args
            .stop_grace
            .map(Duration::from)
            .or(file.stop_grace)
            .unwrap_or(config::DEFAULT_STOP_GRACE),
    })
}

/// Print status lines and notices appended since the last call.
fn flush_panel(panel: &mut ControlPanel, seen: &mut u64, out_tx: &mpsc::UnboundedSender<OutputLine>) {
    for entry in panel.log().since(*seen) {
        let _ = out_tx.send(OutputLine::Stderr(format!(
            "{} {}",
            entry.timestamp(),
            entry.text
        )));
    }
    *seen = panel.log().total_appended();
    while let Some(notice) = panel.dismiss_notice() {
        let _ = out_tx.send(OutputLine::Stderr(format!("! {}", notice.message)));
    }
}

/// Line-mode session: no terminal UI, optional auto-start, Ctrl-C stops.
async fn run_headless(settings: Settings, start: bool) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let res = headless_session(&settings, start, tokio::signal::ctrl_c(), &out_tx).await;
    drop(out_tx);
    let _ = out_handle.await;
    res
}

/// Drive one headless run until it finishes or `shutdown` resolves and the
/// stop is acknowledged (or the grace period runs out).
async fn headless_session<F>(
    settings: &Settings,
    start: bool,
    shutdown: F,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
) -> Result<()>
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ChannelEvent>();
    let (outbound, channel_handle) = channel::spawn_channel(settings.channel_config(), event_tx);
    let mut panel = ControlPanel::new(outbound);

    let mut seen = 0u64;
    let mut start_pending = start;
    let mut start_submitted = false;
    let mut interrupted = false;
    let mut stop_deadline: Option<tokio::time::Instant> = None;
    tokio::pin!(shutdown);

    let res: Result<()> = loop {
        tokio::select! {
            ev = event_rx.recv() => {
                let Some(ev) = ev else { break Ok(()) };
                let was_running = panel.is_running();
                let connected = matches!(ev, ChannelEvent::Inbound(InboundMessage::Connected));
                let stopped = matches!(ev, ChannelEvent::Inbound(InboundMessage::StopSuccess(_)));
                let disconnected = matches!(ev, ChannelEvent::Disconnected(_));

                panel.handle_channel_event(ev);
                if connected && start_pending {
                    start_pending = false;
                    if let Err(e) = panel.submit_start(&settings.form) {
                        flush_panel(&mut panel, &mut seen, out_tx);
                        break Err(e.into());
                    }
                    start_submitted = true;
                }
                flush_panel(&mut panel, &mut seen, out_tx);

                if disconnected || (stopped && (was_running || interrupted)) {
                    break Ok(());
                }
            }
            sig = &mut shutdown, if !interrupted => {
                sig.context("listen for Ctrl-C")?;
                interrupted = true;
                // A start may still be unacknowledged; stop it anyway.
                if !panel.is_running() && !start_submitted {
                    break Ok(());
                }
                let _ = out_tx.send(OutputLine::Stderr("Stopping…".into()));
                panel.submit_stop()?;
                stop_deadline = Some(tokio::time::Instant::now() + settings.stop_grace);
            }
            _ = tokio::time::sleep_until(stop_deadline.unwrap_or_else(tokio::time::Instant::now)), if stop_deadline.is_some() => {
                let _ = out_tx.send(OutputLine::Stderr(format!(
                    "No stop acknowledgement within {}; leaving the job to the server",
                    humantime::format_duration(settings.stop_grace)
                )));
                break Ok(());
            }
        }
    };

    // Final progress goes to stdout so scripts can pick it up.
    let progress = panel.progress();
    let _ = out_tx.send(OutputLine::Stdout(format!(
        "cycle {}/{} ({:?})",
        progress.current,
        progress.total,
        panel.run_state()
    )));

    panel.dispose();
    let _ = tokio::time::timeout(Duration::from_secs(2), channel_handle).await;
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::test_server::{accept_connected, drain, next_text, text};
    use crate::config::FormDefaults;
    use crate::error::PanelError;
    use futures::SinkExt;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("cycle-panel").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_apply_without_flags_or_file() {
        let s = build_settings(&cli(&[]), FileConfig::default()).unwrap();
        assert_eq!(s.server.as_str(), "http://127.0.0.1:5000/");
        assert_eq!(s.form.cycles, "10");
        assert_eq!(s.form.delay, "30");
        assert!(s.form.keywords.is_empty());
        assert_eq!(s.connect_timeout, config::DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(s.stop_grace, config::DEFAULT_STOP_GRACE);
    }

    #[test]
    fn flags_override_file() {
        let file = FileConfig {
            server: Some("http://file-host:5000".into()),
            connect_timeout: Some(Duration::from_secs(30)),
            stop_grace: None,
            form: FormDefaults {
                keywords: Some("from file".into()),
                website: Some("file.example".into()),
                cycles: Some(7),
                delay: None,
            },
        };
        let s = build_settings(
            &cli(&[
                "--server",
                "https://cli-host",
                "--website",
                "cli.example",
                "--connect-timeout",
                "3s",
            ]),
            file,
        )
        .unwrap();
        assert_eq!(s.server.host_str(), Some("cli-host"));
        assert_eq!(s.form.website, "cli.example");
        assert_eq!(s.form.keywords, "from file");
        assert_eq!(s.form.cycles, "7");
        assert_eq!(s.form.delay, config::DEFAULT_DELAY);
        assert_eq!(s.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn numeric_flags_pass_through_unvalidated() {
        let s = build_settings(&cli(&["--cycles", "lots", "--delay", "-5"]), FileConfig::default())
            .unwrap();
        assert_eq!(s.form.cycles, "lots");
        assert_eq!(s.form.delay, "-5");
    }

    #[test]
    fn rejects_unusable_server_urls() {
        assert!(build_settings(&cli(&["--server", "not a url"]), FileConfig::default()).is_err());
        assert!(build_settings(&cli(&["--server", "ftp://host"]), FileConfig::default()).is_err());
    }

    #[test]
    fn start_requires_headless() {
        assert!(Cli::try_parse_from(["cycle-panel", "--start"]).is_err());
        assert!(Cli::try_parse_from(["cycle-panel", "--headless", "--start"]).is_ok());
    }

    fn session_settings(addr: std::net::SocketAddr, website: &str) -> Settings {
        Settings {
            server: Url::parse(&format!("http://{addr}")).unwrap(),
            form: StartForm {
                keywords: "seo tips".into(),
                website: website.into(),
                cycles: "3".into(),
                delay: "1".into(),
            },
            connect_timeout: Duration::from_secs(5),
            stop_grace: Duration::from_secs(5),
        }
    }

    /// Split collected output into (stdout, stderr) lines.
    fn collect(mut rx: mpsc::UnboundedReceiver<OutputLine>) -> (Vec<String>, Vec<String>) {
        let (mut out, mut err) = (Vec::new(), Vec::new());
        while let Ok(line) = rx.try_recv() {
            match line {
                OutputLine::Stdout(l) => out.push(l),
                OutputLine::Stderr(l) => err.push(l),
            }
        }
        (out, err)
    }

    #[tokio::test]
    async fn headless_start_runs_until_server_stops() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let settings = session_settings(listener.local_addr().unwrap(), "example.com");

        let server = tokio::spawn(async move {
            let mut ws = accept_connected(&listener).await;
            let start = next_text(&mut ws).await.unwrap();
            assert!(start.starts_with(r#"42["start_cycles""#), "{start}");
            for frame in [
                r#"42["start_success",{"message":"Started"}]"#,
                r#"42["status_update",{"cycle":3,"total_cycles":3,"message":"Cycle 3 done"}]"#,
                r#"42["stop_success",{"message":"All cycles finished"}]"#,
            ] {
                ws.send(text(frame)).await.unwrap();
            }
            drain(&mut ws).await
        });

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        headless_session(&settings, true, std::future::pending(), &out_tx)
            .await
            .unwrap();

        assert_eq!(server.await.unwrap(), vec!["41".to_string()]);
        let (out, err) = collect(out_rx);
        assert_eq!(out, vec!["cycle 3/3 (Idle)".to_string()]);
        assert!(err.iter().any(|l| l.ends_with("Cycle 3 done")));
        assert!(err.iter().any(|l| l.ends_with("All cycles finished")));
    }

    #[tokio::test]
    async fn interrupt_stops_a_start_that_is_not_yet_acknowledged() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let settings = session_settings(listener.local_addr().unwrap(), "example.com");
        let (started_tx, started_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(async move {
            let mut ws = accept_connected(&listener).await;
            let start = next_text(&mut ws).await.unwrap();
            assert!(start.starts_with(r#"42["start_cycles""#), "{start}");
            started_tx.send(()).unwrap();
            assert_eq!(
                next_text(&mut ws).await.as_deref(),
                Some(r#"42["stop_cycles"]"#)
            );
            ws.send(text(r#"42["stop_success",{"message":"Stopped"}]"#))
                .await
                .unwrap();
            drain(&mut ws).await
        });

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let shutdown = async move {
            let _ = started_rx.await;
            Ok(())
        };
        headless_session(&settings, true, shutdown, &out_tx)
            .await
            .unwrap();

        assert_eq!(server.await.unwrap(), vec!["41".to_string()]);
        let (out, err) = collect(out_rx);
        assert_eq!(out, vec!["cycle 0/0 (Idle)".to_string()]);
        assert!(err.iter().any(|l| l.ends_with("Stopped")));
    }

    #[tokio::test]
    async fn blank_website_ends_headless_with_validation_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let settings = session_settings(listener.local_addr().unwrap(), "  ");

        let server = tokio::spawn(async move {
            let mut ws = accept_connected(&listener).await;
            drain(&mut ws).await
        });

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let err = headless_session(&settings, true, std::future::pending(), &out_tx)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PanelError>(),
            Some(PanelError::Validation(_))
        ));
        assert_eq!(server.await.unwrap(), vec!["41".to_string()]);
        let (_, err_lines) = collect(out_rx);
        assert!(err_lines
            .iter()
            .any(|l| l == "! Please fill in both keywords and target website!"));
    }

    #[tokio::test]
    async fn server_disconnect_ends_headless() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let settings = session_settings(listener.local_addr().unwrap(), "example.com");

        let server = tokio::spawn(async move {
            let mut ws = accept_connected(&listener).await;
            ws.send(text("41")).await.unwrap();
            drain(&mut ws).await
        });

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        headless_session(&settings, false, std::future::pending(), &out_tx)
            .await
            .unwrap();

        assert!(server.await.unwrap().is_empty());
        let (out, err) = collect(out_rx);
        assert_eq!(out, vec!["cycle 0/0 (Idle)".to_string()]);
        assert!(err.iter().any(|l| l.contains("Disconnected from server")));
    }
}
