//! `bmcdump-offload`: copies one dump artifact to its offload destination.

use std::path::PathBuf;
use std::process::ExitCode;

use bmcdump_daemon::offload::{offload_file, Destination, ACCEPT_TIMEOUT};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "bmcdump-offload")]
#[command(about = "Offload a dump artifact", long_about = None)]
struct Args {
    /// Dump entry id.
    #[arg(long)]
    id: u32,

    /// Artifact to send.
    #[arg(long)]
    path: PathBuf,

    /// Destination: `unix://<socket>`, `file://<path>` or a path.
    #[arg(long)]
    uri: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let result = match Destination::parse(&args.uri) {
        Ok(dest) => offload_file(args.id, &args.path, &dest, ACCEPT_TIMEOUT).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("bmcdump-offload: dump {}: {}", args.id, e);
            ExitCode::FAILURE
        }
    }
}
