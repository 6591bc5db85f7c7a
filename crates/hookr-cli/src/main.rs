//! hookR CLI
//!
//! Quick webhook listener: streams hook calls from the hookR service to the
//! terminal over WebSocket.

use std::io::Write;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use hookr_cli::runner::{self, ListenArgs};

#[derive(Parser, Debug)]
#[command(name = "hookr")]
#[command(version, about = "Quick webhook listener via WebSocket", long_about = None)]
struct Cli {
    /// Emit log lines as JSON (logs go to stderr)
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Listen for incoming webhooks via the hookR WebSocket
    Listen(ListenArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Target directives match by prefix, so this covers every hookr_* crate.
    hookr_core::tracing_init::init_tracing("hookr=warn", cli.log_json);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting hookr");

    let result = match cli.command {
        Commands::Listen(args) => runner::run(args).await,
    };

    match result {
        Ok(outcome) => {
            info!(?outcome, "hookr finished");
            ExitCode::from(outcome.exit_code())
        }
        Err(e) => {
            error!(error = %e, "hookr failed");
            let _ = writeln!(std::io::stderr().lock(), "❌ {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn listen_subcommand_parses() {
        let cli = Cli::try_parse_from(["hookr", "listen", "abc", "--format", "json", "--log-json"]);
        assert!(matches!(
            cli,
            Ok(Cli {
                log_json: true,
                command: Commands::Listen(ListenArgs { ref client_key, .. }),
            }) if client_key == "abc"
        ));
    }

    #[test]
    fn listen_requires_client_key() {
        assert!(Cli::try_parse_from(["hookr", "listen"]).is_err());
    }
}
