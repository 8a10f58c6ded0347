//! agy-proxy - standalone model-id normalizing proxy.
//!
//! Prints `PROXY_READY:<port>` on stdout once listening; all logs go to stderr.

use std::io::{self, IsTerminal, Write};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, error, info};

use ccs_agy_proxy::{
    AgyProxy, ProxyConfig,
    config::{DEFAULT_MAX_BODY_BYTES, DEFAULT_TIMEOUT_MS, DEFAULT_UPSTREAM_URL},
};

#[derive(Parser, Debug)]
#[command(
    name = "agy-proxy",
    version,
    about = "Forward requests to the agy gateway and normalize model ids in responses"
)]
struct Args {
    /// Upstream gateway base URL.
    #[arg(long, env = "AGY_UPSTREAM_URL", default_value = DEFAULT_UPSTREAM_URL)]
    upstream_url: String,

    /// Log every request.
    #[arg(short, long)]
    verbose: bool,

    /// Per-request timeout in milliseconds.
    #[arg(long, env = "AGY_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Maximum inbound request body size in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,
}

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = ProxyConfig::new(args.upstream_url)
        .with_verbose(args.verbose)
        .with_timeout_ms(args.timeout_ms)
        .with_max_body_bytes(args.max_body_bytes);

    let mut proxy = AgyProxy::new(config);
    proxy.start().await.context("starting proxy")?;

    // Stop this instance if a handler panics.
    let shutdown = proxy.shutdown_handle();
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        shutdown.stop();
        default_hook(panic);
    }));

    tokio::select! {
        () = shutdown_signal() => {
            info!("Shutdown signal received");
            proxy.stop();
            Ok(())
        }
        result = proxy.wait() => {
            proxy.stop();
            result.context("serving proxy")?;
            anyhow::bail!("proxy exited unexpectedly")
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "ccs_agy_proxy={},agy_proxy={}",
            level.as_str().to_lowercase(),
            level.as_str().to_lowercase()
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(io::stderr().is_terminal()),
        )
        .try_init()
        .ok();

    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    builder.filter_level(level);
    builder.try_init().ok();
}
