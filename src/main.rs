use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod config;
mod docker;
mod streams;

use cli::{App, Cli, LocalEngineFactory};
use docker::JsonError;

/// Default log filter when RUST_LOG is not set
fn default_log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Exit status for a failed command.
///
/// Engine protocol errors have already been written to stderr by the display
/// routine and carry their own code; everything else is printed here.
fn report_error(err: &anyhow::Error) -> i32 {
    if let Some(json_error) = err.downcast_ref::<JsonError>() {
        debug!("Engine reported error: {:#}", err);
        return json_error.exit_code();
    }
    eprintln!("Error: {:#}", err);
    1
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = cli::parse_error_exit_code(&e);
            let _ = e.print();
            std::process::exit(code);
        }
    };

    // Logs go to stderr; stdout is reserved for engine output
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_log_filter(cli.verbose).into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let app = App::new(LocalEngineFactory);
    if let Err(e) = app.run(cli).await {
        std::process::exit(report_error(&e));
    }
}
