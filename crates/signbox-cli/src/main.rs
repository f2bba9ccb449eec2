//! signbox - command-line client for a signing file-storage service.
//!
//! Log in once, then upload files (optionally signed by the server),
//! download them, and check the signature of local files.

mod app;
mod cli;

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use signbox_core::Config;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use cli::{Cli, Commands};

/// Log file name in the cache directory
const LOG_FILE: &str = "signbox.log";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the log file on drop and must be kept alive.
fn init_tracing(to_file: bool) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = if to_file {
        let dir = Config::cache_dir()?;
        std::fs::create_dir_all(&dir)?;
        let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, LOG_FILE));
        (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
    } else {
        (None, None)
    };
    let stderr_layer = file_layer.is_none().then(|| fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(filter)
        .init();
    Ok(guard)
}

async fn run(app: &mut App, command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Login { email, remember } => app.login(email, remember).await?,
        Commands::Register { email, name } => app.register(email, name).await?,
        Commands::Logout { forget } => app.logout(forget).await,
        Commands::Status => app.status(),
        Commands::List => app.list().await?,
        Commands::Info { id } => app.info(&id).await?,
        Commands::Upload { path, sign } => app.upload(&path, sign).await?,
        Commands::Download { id, output } => app.download(&id, output).await?,
        Commands::Verify { paths, json } => {
            if !app.verify(&paths, json).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file)?;
    info!("signbox starting");

    let mut app = App::new()?;
    let result = run(&mut app, cli.command).await;
    app.report_session_change();

    info!("signbox shutting down");
    result
}
