use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use foundation_slow_upstream::{ServiceConfig, SlowUpstreamService, DEFAULT_PORT};

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Slow HTTP upstream: answers every request after a path dependent delay
/// (`/slow-process` 5s, `/slow-api` 3s, anything else 1s).
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Port to listen on, bound on all interfaces
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

fn main() -> std::result::Result<(), BoxedError> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ServiceConfig::new(args.port);
    let service = SlowUpstreamService::bind(config).inspect_err(|err| {
        tracing::error!("Failed to start slow upstream service on {config}: {err}");
    })?;

    let shutdown = service.shutdown_handle();
    ctrlc::set_handler(move || shutdown.stop())?;

    // in-flight handlers are abandoned once serve returns and main exits
    service.serve()?;
    Ok(())
}
