//! reviewcache - cached Google reviews from the command line

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use reviewcache::app::App;
use reviewcache::cli::{log_level, Cli};
use reviewcache::config::CREDENTIAL_ENV;

/// Logs go to stderr so command output on stdout stays clean
fn init_logging(verbose: u8) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let credential = std::env::var(CREDENTIAL_ENV).ok();
    let result = match App::open(cli.data_dir.as_deref(), credential) {
        Ok(app) => app.run(cli.command, &mut io::stdout()).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
