use std::fs::File;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use natter::backend::SupabaseBackend;
use natter::core::config::{self, CliOverrides};
use natter::core::session::{self, SessionStore};
use natter::core::time_format::Locale;
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

#[derive(Parser)]
#[command(name = "natter", about = "Terminal chat room on a hosted Postgres backend")]
struct Args {
    /// Language for relative timestamps
    #[arg(short, long, value_enum)]
    locale: Option<Locale>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    dotenv::dotenv().ok();

    // Initialize file logger - writes to natter.log in current directory
    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .build();

    if let Ok(log_file) = File::create("natter.log") {
        let _ = WriteLogger::init(LevelFilter::Debug, log_config, log_file);
    }

    let file_config = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("natter: {e}");
            return ExitCode::FAILURE;
        }
    };
    let resolved = match config::resolve(&file_config, &CliOverrides { locale: args.locale }) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Startup aborted: {}", e);
            eprintln!("natter: {e}");
            return ExitCode::FAILURE;
        }
    };

    log::info!(
        "Natter starting up against {} (locale {:?})",
        resolved.backend_url,
        resolved.locale
    );

    let backend = Arc::new(SupabaseBackend::new(
        resolved.backend_url.clone(),
        resolved.anon_key.clone(),
    ));
    let mut store = SessionStore::new(backend, Duration::from_secs(resolved.heartbeat_secs));
    if let Some(path) = session::session_path() {
        store = store.with_persistence(path);
    }
    let store = Arc::new(store);

    if let Err(e) = store.restore().await {
        log::warn!("Could not restore previous session: {}", e);
    }

    let result = natter::tui::run(&resolved, store.clone());
    store.teardown().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Terminal error: {}", e);
            eprintln!("natter: {e}");
            ExitCode::FAILURE
        }
    }
}
