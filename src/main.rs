//! CLI wiring (SPEC_FULL.md §10.6): thin by design. All coordination
//! logic lives in the library; this binary just assembles the concrete
//! backend, installs signal handling, and runs the worker loop.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use sheetfleet::callback::LoggingCallback;
use sheetfleet::config::Config;
use sheetfleet::extractor::YoutubeDataApiExtractor;
use sheetfleet::gateway::google::GoogleSheetsBackend;
use sheetfleet::gateway::Gateway;
use sheetfleet::signal::CancellationToken;
use sheetfleet::Orchestrator;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env().context("loading configuration from the environment")?;

    let backend = GoogleSheetsBackend::new(config.spreadsheet_id.clone(), &config.service_account_file)
        .context("initializing the Google Sheets backend")?;
    let gateway = Gateway::new(Box::new(backend), config.base_interval);
    gateway.ensure_headers().context("initializing sheet headers")?;

    let orchestrator = Orchestrator::new(&gateway, &config).context("registering worker")?;

    let cancel = CancellationToken::new();
    cancel
        .install_handlers()
        .context("installing SIGINT/SIGTERM handlers")?;

    // No downstream YouTube Data API key configured: the reference
    // extractor still runs but will fail at the API boundary, which is
    // the correct, documented behavior (extractor failure -> Source DLQ)
    // until an embedding deployment supplies YOUTUBE_API_KEY.
    let api_key = std::env::var("YOUTUBE_API_KEY").unwrap_or_default();
    let extractor = YoutubeDataApiExtractor::new(api_key);
    let callback = LoggingCallback;

    orchestrator
        .run(&extractor, &callback, &cancel)
        .context("worker loop exited with an error")?;

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal startup or runtime error");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
