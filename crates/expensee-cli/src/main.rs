//! Expensee CLI - track expenses, budgets and receipts from the terminal.
//!
//! Credentials live in the OS keyring; the session survives between runs
//! until `expensee logout` or the server rejects the refresh token.

mod cli;
mod commands;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use expensee_core::auth::KeyringCredentialStore;
use expensee_core::{ApiClient, ApiError, Config, SessionStore};

use cli::Cli;

/// Initialize the tracing subscriber for logging.
///
/// Stderr gets the `RUST_LOG` filter (default `warn`). With `--log-file`,
/// a daily rolling file under the cache dir receives the same events; the
/// returned guard must live until exit so buffered lines are flushed.
fn init_tracing(log_file: bool) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file.then(Config::log_dir) {
        Some(Ok(dir)) => {
            let appender = tracing_appender::rolling::daily(dir, "expensee.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Some(Err(e)) => {
            eprintln!("File logging disabled: {}", e);
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file);

    let mut config = Config::load()?;
    if let Some(ref url) = cli.api_url {
        config.api_base_url = url.clone();
    }
    info!(api = %config.api_base_url, "Expensee CLI starting");

    let session = SessionStore::new();
    let client = ApiClient::new(
        &config,
        Arc::new(KeyringCredentialStore::new()),
        Arc::new(session.clone()),
    )?;

    let result = commands::run(cli.command, &client, &session, &mut config).await;

    if let Err(ref e) = result {
        let session_ended = e
            .downcast_ref::<ApiError>()
            .is_some_and(ApiError::is_authentication);
        if session_ended {
            eprintln!("Session ended; run `expensee login` to sign in again.");
        }
    }
    result
}
