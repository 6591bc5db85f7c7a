//! `hookr listen`: wires a [`RelayClient`] to the output sinks and drives it
//! until shutdown.
//!
//! Status lines (banner, connection notices, errors) go to stderr; stdout
//! carries only rendered events.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use crossterm::style::Color;
use tracing::{info, warn};

use hookr_client::config::DEFAULT_URL;
use hookr_client::{ClientConfig, ReconnectPolicy, RelayClient, RelayError};

use crate::config::CliConfig;
use crate::output::{key_preview, paint, OutputFormat};
use crate::shutdown::{Shutdown, ShutdownReason};
use crate::sink::{self, ConsoleSink, FileSink};

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Extra time allowed for the reader to wind down after the close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Arguments for `hookr listen`.
#[derive(Args, Debug, Clone)]
pub struct ListenArgs {
    /// Your hookR client API key
    pub client_key: String,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Append received events to this file (one JSON record per line)
    #[arg(long, value_name = "FILE")]
    pub save: Option<PathBuf>,

    /// hookR service URL [default: wss://web.hookr.cloud/events]
    #[arg(long, env = "HOOKR_URL")]
    pub url: Option<String>,

    /// Handshake timeout in seconds [default: 10]
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Exit instead of reconnecting when the connection drops
    #[arg(long)]
    pub no_reconnect: bool,

    /// Reconnect attempts before giving up [default: 5]
    #[arg(long, value_name = "N")]
    pub max_reconnect_attempts: Option<u32>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Effective settings for one listen session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenSettings {
    pub url: String,
    pub client_key: String,
    pub format: OutputFormat,
    pub save: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub color: bool,
}

impl ListenSettings {
    /// Merge flags (and their env fallbacks) over the config file over
    /// built-in defaults.
    pub fn resolve(args: &ListenArgs, file: &CliConfig) -> Self {
        let color =
            !args.no_color && std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self {
            url: args
                .url
                .clone()
                .or_else(|| file.url.clone())
                .unwrap_or_else(|| DEFAULT_URL.to_string()),
            client_key: args.client_key.clone(),
            format: args.format.or(file.format).unwrap_or_default(),
            save: args.save.clone().or_else(|| file.save.clone()),
            connect_timeout: Duration::from_secs(
                args.connect_timeout
                    .or(file.connect_timeout_secs)
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            reconnect: !args.no_reconnect && file.reconnect.unwrap_or(true),
            max_reconnect_attempts: args
                .max_reconnect_attempts
                .or(file.max_reconnect_attempts)
                .unwrap_or_else(|| ReconnectPolicy::default().max_attempts.unwrap_or(5)),
            color,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(&self.url, &self.client_key);
        config.connect_timeout = self.connect_timeout;
        config.reconnect = self.reconnect.then(|| ReconnectPolicy {
            max_attempts: Some(self.max_reconnect_attempts),
            ..ReconnectPolicy::default()
        });
        config
    }
}

/// How a listen session finished.
#[derive(Debug)]
pub enum ListenOutcome {
    /// Stopped on request (signal or programmatic).
    Shutdown(ShutdownReason),
    /// The initial connect failed.
    ConnectFailed(RelayError),
    /// The client stopped on its own; carries the last reported error.
    SessionEnded(Option<RelayError>),
}

impl ListenOutcome {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Shutdown(_) => 0,
            Self::ConnectFailed(_) | Self::SessionEnded(_) => 1,
        }
    }
}

/// Entry point for `hookr listen`.
pub async fn run(args: ListenArgs) -> anyhow::Result<ListenOutcome> {
    let settings = ListenSettings::resolve(&args, &CliConfig::load());
    let shutdown = Shutdown::new();
    shutdown
        .install_signal_handlers()
        .context("Failed to install signal handlers")?;
    listen(&settings, &shutdown).await
}

/// Run one session with resolved settings until `shutdown` fires or the
/// client stops on its own.
pub async fn listen(
    settings: &ListenSettings,
    shutdown: &Shutdown,
) -> anyhow::Result<ListenOutcome> {
    let status = Status::new(settings.color);
    status.banner(settings);

    let client = RelayClient::new(settings.client_config());
    sink::attach(&client, ConsoleSink::stdout(settings.format, settings.color));
    if let Some(path) = &settings.save {
        let file_sink = FileSink::open(path)
            .with_context(|| format!("Cannot open save file {}", path.display()))?;
        info!(path = %path.display(), "Saving events to file");
        sink::attach(&client, file_sink);
    }

    client.on_connected(move |conn| {
        if conn.reconnected {
            status.line(
                &format!("🔗 WebSocket reconnected (session {})", conn.generation),
                Color::Blue,
            );
        } else {
            status.line("🔗 WebSocket connected", Color::Blue);
        }
    });

    let last_error: Arc<Mutex<Option<RelayError>>> = Arc::default();
    let recorded = Arc::clone(&last_error);
    client.on_error(move |err| {
        status.line(&format!("❌ Error: {err}"), Color::Red);
        *recorded.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.clone());
    });

    let connected = tokio::select! {
        result = client.connect() => result,
        reason = shutdown.wait() => {
            client.close();
            return Ok(ListenOutcome::Shutdown(reason));
        }
    };
    if let Err(e) = connected {
        status.line(&format!("❌ Failed to connect: {e}"), Color::Red);
        return Ok(ListenOutcome::ConnectFailed(e));
    }

    status.line("✅ Connected to hookR service", Color::Green);
    status.line("Waiting for webhook events...", Color::DarkGrey);
    status.line("Press Ctrl+C to stop", Color::DarkGrey);
    status.blank();

    tokio::select! {
        reason = shutdown.wait() => {
            status.line("👋 Shutting down...", Color::Yellow);
            client.close();
            let grace = client.config().close_timeout + CLOSE_GRACE;
            if tokio::time::timeout(grace, client.closed()).await.is_err() {
                warn!(?grace, "Relay client did not stop in time");
            }
            Ok(ListenOutcome::Shutdown(reason))
        }
        () = client.closed() => {
            let err = last_error.lock().unwrap_or_else(PoisonError::into_inner).take();
            status.line("Connection to hookR service ended", Color::Red);
            Ok(ListenOutcome::SessionEnded(err))
        }
    }
}

/// Status printer for stderr.
#[derive(Debug, Clone, Copy)]
struct Status {
    color: bool,
}

impl Status {
    const fn new(color: bool) -> Self {
        Self { color }
    }

    fn banner(self, settings: &ListenSettings) {
        self.line("🎣 Connecting to hookR service...", Color::Blue);
        self.line(
            &format!("   Client Key: {}", key_preview(&settings.client_key)),
            Color::DarkGrey,
        );
        self.line(&format!("   Service URL: {}", settings.url), Color::DarkGrey);
        self.blank();
    }

    fn line(self, text: &str, color: Color) {
        let _ = writeln!(io::stderr().lock(), "{}", paint(text, color, self.color));
    }

    fn blank(self) {
        let _ = writeln!(io::stderr().lock());
    }
}
