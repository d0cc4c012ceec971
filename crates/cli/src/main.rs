//! The `foresight` command line interface.

#[macro_use]
extern crate tracing;

use clap::Parser;
use eyre::Result;
use tracing_subscriber::{EnvFilter, fmt};

mod args;
mod cmd;
mod handler;

use args::Foresight;

fn main() -> Result<()> {
    handler::install();
    let args = Foresight::parse();
    subscriber(args.global.verbosity);
    run(args)
}

#[tokio::main]
async fn run(args: Foresight) -> Result<()> {
    cmd::run(args).await
}

/// Initializes the tracing subscriber, `RUST_LOG` takes precedence over `-v`.
fn subscriber(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("foresight={level},foresight_wallet={level}")));
    let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}
