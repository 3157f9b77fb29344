use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use pomerge::{load_config, PipelineOrchestrator};

#[derive(Parser, Debug)]
#[command(
    name = "pomerge",
    version,
    about = "Ingests scanned purchase order paperwork, reconciles bundles and merges them into single PDFs"
)]
struct Cli {
    /// Path to the JSON configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "POMERGE_CONFIG")]
    config: Option<PathBuf>,

    /// Keep running, re-processing the input directory on an interval.
    #[arg(short, long)]
    watch: bool,

    /// Seconds between passes in watch mode, overriding the config value.
    #[arg(long)]
    interval: Option<u64>,

    /// Verbose diagnostic logging.
    #[arg(long)]
    debug: bool,
}

fn init_tracing(debug: bool) -> anyhow::Result<()> {
    tracing_log::LogTracer::init().context("failed to initialize log bridge")?;

    let default_filter = if debug {
        "pomerge=debug,pomerge_cli=debug,info"
    } else {
        "pomerge=info,pomerge_cli=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug)?;

    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    let interval = Duration::from_secs(cli.interval.unwrap_or(config.loop_interval_secs));

    let pipeline =
        PipelineOrchestrator::from_config(&config).context("failed to assemble pipeline")?;

    if !cli.watch {
        let summary = pipeline.run().context("pass failed")?;
        if summary.failed > 0 {
            log::warn!("{} file(s) failed this pass; see the log above", summary.failed);
        }
        return Ok(());
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        log::info!("Shutdown requested; finishing the current pass");
        flag.store(false, Ordering::SeqCst);
    })
    .context("failed to install shutdown handler")?;

    log::info!(
        "Watching {} (pass every {}s)",
        config.input_directory.display(),
        interval.as_secs()
    );

    while running.load(Ordering::SeqCst) {
        if let Err(e) = pipeline.run() {
            log::error!("Pass failed: {}", e);
        }

        // Sleep in short slices so Ctrl-C is honored promptly.
        let mut slept = Duration::ZERO;
        while running.load(Ordering::SeqCst) && slept < interval {
            let step = Duration::from_millis(500).min(interval - slept);
            std::thread::sleep(step);
            slept += step;
        }
    }

    log::info!("Stopped");
    Ok(())
}
