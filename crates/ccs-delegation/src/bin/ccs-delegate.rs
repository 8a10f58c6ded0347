//! ccs-delegate - run the CLI agent headlessly and print its result.
//!
//! ## Usage
//!
//! ```bash
//! # Print the final answer
//! ccs-delegate "summarize src/lib.rs"
//!
//! # Full result record as JSON, resuming an earlier session
//! ccs-delegate --json --resume 1f0c... "continue"
//!
//! # Show tool calls as they happen, pass extra flags to the agent
//! ccs-delegate -v "refactor parser" -- --max-turns 5
//! ```

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug};

use ccs_delegation::{
    DelegationConfig, ExecutionOptions, HeadlessExecutor, extract_session_info, verbose,
};

#[derive(Parser, Debug)]
#[command(
    name = "ccs-delegate",
    version,
    about = "Run the CLI agent non-interactively and collect its stream-json result"
)]
struct Args {
    /// Prompt to send to the agent.
    prompt: String,

    /// Override the config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Working directory for the agent.
    #[arg(long, value_name = "DIR")]
    cwd: Option<PathBuf>,

    /// Timeout in seconds (defaults to the configured value).
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Permission mode passed to the agent.
    #[arg(long)]
    permission_mode: Option<String>,

    /// Resume an existing session.
    #[arg(long, value_name = "SESSION_ID")]
    resume: Option<String>,

    /// Profile label recorded in the result.
    #[arg(long, default_value = "default")]
    profile: String,

    /// Output the full result record as JSON.
    #[arg(long)]
    json: bool,

    /// Show tool calls as they happen and enable debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Extra arguments passed through to the agent.
    #[arg(last = true)]
    extra_args: Vec<String>,
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

    let config = DelegationConfig::load(args.config.as_deref())?;
    debug!("delegation config: {:#?}", config);

    let executor = HeadlessExecutor::new(config);
    let options = ExecutionOptions {
        prompt: args.prompt,
        cwd: args.cwd,
        timeout: args.timeout.map(Duration::from_secs),
        permission_mode: args.permission_mode,
        resume_session: args.resume,
        profile: args.profile,
        extra_args: args.extra_args,
    };

    let show_progress = args.verbose;
    let result = executor
        .execute(options, |event| {
            if show_progress {
                for line in verbose::verbose_lines(event) {
                    eprintln!("{line}");
                }
            }
        })
        .await
        .context("running agent")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("serializing result to JSON")?
        );
    } else {
        println!("{}", result.content);
        if let Some(session) = extract_session_info(&result) {
            debug!(
                "session {} (cost ${:.4}) in {}",
                session.session_id,
                session.total_cost.unwrap_or(0.0),
                session.cwd
            );
        }
    }

    if result.timed_out {
        anyhow::bail!("agent timed out after {}ms", result.duration);
    }
    if !result.success {
        anyhow::bail!("agent exited with code {}", result.exit_code);
    }
    Ok(())
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
            "ccs_delegation={},ccs_delegate={}",
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

    // Fallback for when another logger is already installed.
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    builder.filter_level(level);
    builder.try_init().ok();
}
