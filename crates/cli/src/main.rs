use std::io::Write;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use social_content_dl_core::{
    APP_NAME, ChannelDownloadResult, LogFormat, TerminalPrompt, init_logging, load_config,
    run_telegram_download,
};
use tokio_util::sync::CancellationToken;

const ENV_HELP: &str = "\
Environment variables:
  TELEGRAM_PHONE          Phone number of the account (fallback: PHONE_NUMBER)
  TELEGRAM_APP_ID         API id (default: 17349)
  TELEGRAM_APP_HASH       API hash
  DOWNLOAD_PATH           Target directory (default: ./downloads)
  TELEGRAM_SESSION_FILE   Session file (default: telegram.session)
  SOCIAL_CONTENT_DL_LOG   Log filter (fallback: RUST_LOG, default: info)

Example:
  social-content-dl telegram @musicchannel 50";

#[derive(Parser, Debug)]
#[command(name = "social-content-dl")]
#[command(about = "Download documents posted to a social media channel", long_about = None)]
#[command(after_help = ENV_HELP)]
struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long)]
    json_logs: bool,

    /// Print the run summary (and errors) as JSON.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download documents from a Telegram channel.
    Telegram {
        /// Channel username, with or without a leading `@`.
        channel: String,
        /// Number of recent messages to scan; 0 leaves it to the server.
        #[arg(value_parser = clap::value_parser!(i32).range(0..))]
        limit: Option<i32>,
    },
}

#[derive(Debug, Serialize)]
struct CliError {
    code: &'static str,
    message: String,
    retryable: bool,
}

impl CliError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: false,
        }
    }

    fn retryable(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: true,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = if e.use_stderr() { 1 } else { 0 };
            std::process::exit(code);
        }
    };

    let json = cli.json;
    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            emit_error(&e, json);
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Plain
    };
    init_logging(format);

    match cli.cmd {
        Command::Telegram { channel, limit } => {
            let config = load_config().map_err(map_core_err)?;
            config.require_phone_number().map_err(map_core_err)?;

            let cancel = CancellationToken::new();
            spawn_ctrl_c_handler(cancel.clone());

            let result = run_telegram_download(
                &config,
                &channel,
                limit.unwrap_or(0),
                Arc::new(TerminalPrompt),
                Some(&cancel),
            )
            .await
            .map_err(|e| {
                tracing::error!(event = "run.failed", error = %e, "{e}");
                map_core_err(e)
            })?;

            print_summary(&result, cli.json);
            Ok(())
        }
    }
}

/// First Ctrl-C cancels the run so the session is still saved; a second one exits at once.
fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if on_interrupt(&cancel) == Interrupt::Exit {
                let _ = writeln!(std::io::stderr(), "error: interrupted");
                std::process::exit(1);
            }
        }
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Cancel,
    Exit,
}

fn on_interrupt(cancel: &CancellationToken) -> Interrupt {
    if cancel.is_cancelled() {
        return Interrupt::Exit;
    }
    tracing::warn!(event = "run.interrupt", "interrupted, stopping (press Ctrl-C again to quit)");
    cancel.cancel();
    Interrupt::Cancel
}

fn print_summary(result: &ChannelDownloadResult, json: bool) {
    if json {
        match serde_json::to_string(result) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(event = "summary.encode_failed", error = %e),
        }
        return;
    }
    println!(
        "{APP_NAME}: {} downloaded, {} already present, {} failed ({} bytes)",
        result.downloaded, result.skipped_existing, result.failed, result.bytes_written
    );
}

fn map_core_err(e: social_content_dl_core::Error) -> CliError {
    use social_content_dl_core::Error;

    match e {
        Error::InvalidConfig { message } => CliError::new("config.invalid", message),
        e @ (Error::Auth { .. } | Error::InvalidPassword) => {
            CliError::new("auth.failed", e.to_string())
        }
        e @ Error::Resolve { .. } => CliError::new("channel.unresolved", e.to_string()),
        e @ Error::History { .. } => CliError::retryable("history.failed", e.to_string()),
        e @ Error::Telegram { .. } => CliError::retryable("telegram.unavailable", e.to_string()),
        Error::Cancelled => CliError::new("task.cancelled", "cancelled"),
        other => CliError::new("unknown", other.to_string()),
    }
}

fn emit_error(e: &CliError, json: bool) {
    let line = if json {
        serde_json::to_string(e).unwrap_or_else(|_| {
            "{\"code\":\"unknown\",\"message\":\"json encode failed\",\"retryable\":false}"
                .to_string()
        })
    } else {
        format!("error: {}", e.message)
    };
    let _ = writeln!(std::io::stderr(), "{line}");
}
