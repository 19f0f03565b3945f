//! Headless live widget: host messages on stdin, host-bound envelopes on
//! stdout (one JSON object per line), logs on stderr.

mod harness;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use envelope::Envelope;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use widget::chat::{LoopbackHub, LoopbackTransport};
use widget::config::ConfigError;
use widget::control::ChannelHostPort;
use widget::media::HeadlessMediaEngine;
use widget::{WidgetConfig, WidgetSession};

use harness::{Harness, HarnessError};

/// How long to wait for queued envelopes to reach stdout at exit.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("harness: {0}")]
    Harness(#[from] HarnessError),
}

#[derive(Parser, Debug)]
#[command(name = "livewidget", about = "Headless live video + chat widget session")]
struct Cli {
    /// Signaling channel the chat session joins.
    #[arg(long, env = "WIDGET_CHAT_CHANNEL", default_value = "widget")]
    channel: String,

    #[arg(long, env = "WIDGET_USER_ID", default_value = "viewer")]
    user_id: String,

    #[arg(long, env = "WIDGET_USER_NAME")]
    user_name: Option<String>,

    /// Origin assumed for input lines that carry a bare envelope.
    #[arg(long, env = "WIDGET_HOST_ORIGIN", default_value = "http://localhost")]
    origin: String,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("ignoring unreadable .env: {e}");
        }
    }
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = WidgetConfig::from_env()?;

    let hub = LoopbackHub::new();
    let mut transport = LoopbackTransport::new(hub.clone(), cli.channel.clone(), cli.user_id);
    if let Some(name) = cli.user_name {
        transport = transport.with_user_name(name);
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_envelopes(rx));

    let session = WidgetSession::start(
        config,
        Arc::new(transport),
        Arc::new(HeadlessMediaEngine::new()),
        Arc::new(ChannelHostPort::new(tx)),
    );
    tracing::info!(channel = %cli.channel, origin = %cli.origin, "livewidget ready");

    let harness = Harness::new(Arc::clone(&session), hub, cli.channel, cli.origin);
    let outcome = harness.run(BufReader::new(tokio::io::stdin())).await;

    session.shutdown().await;
    drop(harness);
    drop(session);
    match tokio::time::timeout(WRITER_DRAIN, writer).await {
        Ok(Err(e)) => tracing::warn!(error = %e, "envelope writer ended abnormally"),
        Err(_) => tracing::warn!("envelope writer still running at exit"),
        Ok(Ok(())) => {}
    }
    outcome.map_err(AppError::from)
}

/// Write each host-bound envelope as one JSON line until every sender is gone.
async fn write_envelopes(mut rx: mpsc::UnboundedReceiver<Envelope>) {
    let mut stdout = tokio::io::stdout();
    while let Some(envelope) = rx.recv().await {
        let mut line = match envelope::encode(&envelope) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, kind = %envelope.kind, "envelope not encoded");
                continue;
            }
        };
        line.push('\n');
        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            tracing::warn!(error = %e, "stdout closed, dropping envelopes");
            break;
        }
        if let Err(e) = stdout.flush().await {
            tracing::warn!(error = %e, "stdout flush failed");
        }
    }
}
