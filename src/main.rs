//! CLI entry point for download-gate.

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use download_gate::attribution::AttributionLog;
use download_gate::clock::SystemClock;
use download_gate::config::GateConfig;
use download_gate::download::info::{load_checksums, load_download_info};
use download_gate::download::{
    AttemptOutcome, DownloadGatekeeper, DownloadState, HttpClient, HttpTransport, Interaction,
};
use download_gate::gate::rate_limiter::{DEFAULT_MAX_PER_WINDOW, DEFAULT_WINDOW_MS};
use download_gate::gate::{EnvironmentSnapshot, RateLimiter};
use download_gate::session::SessionContext;
use download_gate::storage::{FileStore, KeyValueStore};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};
use url::Url;

mod app_config;
mod cli;

use app_config::{FileConfig, load_file_config, resolve_default_state_dir};
use cli::{Args, ClickArgs, Command, SiteArgs};

/// Venture used when neither flag nor config names one.
const DEFAULT_VENTURE: &str = "default";

/// User agent of the simulated visitor.
const DEFAULT_VISITOR_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = load_file_config(args.config.as_deref())?.unwrap_or_default();
    let state_dir = args
        .state_dir
        .clone()
        .or_else(|| file_config.state_dir.clone())
        .unwrap_or_else(resolve_default_state_dir);
    debug!(state_dir = %state_dir.display(), "resolved state directory");

    match &args.command {
        Command::Click(click) => run_click(&args, click, &file_config, &state_dir).await,
        Command::Info => run_info(&args.site, &file_config).await,
        Command::Status => run_status(&file_config, &state_dir),
        Command::Reset => run_reset(&state_dir),
    }
}

fn required_url(flag: Option<&Url>, file: Option<&Url>, name: &str) -> Result<Url> {
    match flag.or(file) {
        Some(url) => Ok(url.clone()),
        None => bail!(
            "No {name} configured. Pass --{} or set `{name}` in the config file",
            name.replace('_', "-")
        ),
    }
}

fn gate_config(
    site: &SiteArgs,
    file: &FileConfig,
    output_dir: Option<PathBuf>,
) -> Result<GateConfig> {
    let site_url = required_url(site.site_url.as_ref(), file.site_url.as_ref(), "site_url")?;
    let download_url = required_url(
        site.download_url.as_ref(),
        file.download_url.as_ref(),
        "download_url",
    )?;
    let venture = site
        .venture
        .clone()
        .or_else(|| file.venture.clone())
        .unwrap_or_else(|| DEFAULT_VENTURE.to_string());

    let mut config = GateConfig::new(venture, site_url, download_url);
    if let Some(path) = &file.analytics_path {
        config.analytics_path.clone_from(path);
    }
    config.mirror_urls.clone_from(&file.mirror_urls);
    if let Some(release) = site.release.clone().or_else(|| file.version.clone()) {
        config.version = release;
    }
    config.output_dir = output_dir.or_else(|| file.output_dir.clone());
    if let Some(max) = file.max_per_window {
        config.max_per_window = max;
    }
    if let Some(window_ms) = file.window_ms {
        config.window_ms = window_ms;
    }
    if let Some(timeout_ms) = file.verify_timeout_ms {
        config.verify_timeout = Duration::from_millis(timeout_ms);
    }
    Ok(config)
}

fn open_store(state_dir: &Path) -> Result<Arc<dyn KeyValueStore>> {
    let store = FileStore::open(state_dir)
        .with_context(|| format!("Failed to open state directory '{}'", state_dir.display()))?;
    Ok(Arc::new(store))
}

fn spinner(enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

async fn run_click(
    args: &Args,
    click: &ClickArgs,
    file: &FileConfig,
    state_dir: &Path,
) -> Result<()> {
    let config = gate_config(&args.site, file, click.output_dir.clone())?;
    let store = open_store(state_dir)?;
    let session = SessionContext::start(config.venture.clone(), &SystemClock);
    let environment = EnvironmentSnapshot::interactive(
        click
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_VISITOR_USER_AGENT.to_string()),
    );

    let client = HttpClient::new();
    let expected_sha256 = load_checksums(&client, &config.site_url)
        .await
        .and_then(|checksums| {
            let file_name = config.download_url.path_segments()?.next_back()?.to_string();
            checksums.sha256_for(&file_name).map(str::to_string)
        });
    let transport = HttpTransport::new(client.clone(), config.output_dir.clone())
        .with_expected_sha256(expected_sha256);

    let gatekeeper = match DownloadGatekeeper::builder(config, session, environment)
        .store(store)
        .transport(Arc::new(transport.clone()))
        .build()
    {
        Ok(gatekeeper) => gatekeeper,
        Err(error) => {
            println!("{}", error.advisory());
            return Err(error.into());
        }
    };
    info!(
        session_id = gatekeeper.session().session_id(),
        bot_score = gatekeeper.bot_score().value(),
        "session started"
    );
    gatekeeper.page_view();

    let mut interaction = if click.keyboard {
        Interaction::keyboard(click.control.clone())
    } else {
        Interaction::click(click.control.clone())
    };
    if let Some(value) = &click.honeypot {
        interaction = interaction.with_honeypot(value.clone());
    }

    let show_spinner = !args.quiet && io::stderr().is_terminal();
    for attempt in 1..=click.count {
        let progress = spinner(show_spinner);
        progress.set_message(DownloadState::Preparing.label());
        let result = gatekeeper.activate(&interaction).await;
        progress.finish_and_clear();

        match result {
            Ok(AttemptOutcome::Completed(report)) => {
                println!("[{attempt}] {}: {}", report.state, report.state.label());
                if let Some(error) = &report.error {
                    println!("    {error}");
                }
            }
            Ok(AttemptOutcome::Ignored(reason)) => println!("[{attempt}] ignored: {reason:?}"),
            Err(gate) => println!("[{attempt}] {}", gate.advisory()),
        }
    }

    transport.wait_for_transfers().await;
    gatekeeper.telemetry().flush().await;
    let stats = gatekeeper.telemetry().stats();
    info!(
        emitted = stats.emitted(),
        delivered = stats.delivered(),
        undelivered = stats.undelivered(),
        "telemetry flushed"
    );
    Ok(())
}

async fn run_info(site: &SiteArgs, file: &FileConfig) -> Result<()> {
    let site_url = required_url(site.site_url.as_ref(), file.site_url.as_ref(), "site_url")?;
    let client = HttpClient::new();

    match load_download_info(&client, &site_url).await {
        Some(info) => {
            println!("version:      {}", info.version.as_deref().unwrap_or("-"));
            println!("size:         {}", info.size.as_deref().unwrap_or("-"));
            println!("last updated: {}", info.last_updated.as_deref().unwrap_or("-"));
            if let Some(count) = info.download_count {
                println!("downloads:    {count}");
            }
            if let Some(sha256) = &info.checksums.sha256 {
                println!("sha256:       {sha256}");
            }
            if !info.compatibility.is_empty() {
                println!("compatible:   {}", info.compatibility.join(", "));
            }
        }
        None => println!("No download info published."),
    }
    match load_checksums(&client, &site_url).await {
        Some(checksums) => println!("checksums:    {} entries", checksums.len()),
        None => println!("No checksums published."),
    }
    Ok(())
}

fn run_status(file: &FileConfig, state_dir: &Path) -> Result<()> {
    let store = open_store(state_dir)?;
    let limiter = RateLimiter::with_policy(
        Arc::clone(&store),
        Arc::new(SystemClock),
        file.max_per_window.unwrap_or(DEFAULT_MAX_PER_WINDOW),
        file.window_ms.unwrap_or(DEFAULT_WINDOW_MS),
    );

    match limiter.snapshot() {
        Some(window) => {
            println!(
                "rate limit:   {}/{} attempts, window started at {}",
                window.count,
                limiter.max_per_window(),
                window.window_start
            );
            println!("resets in:    {} ms", limiter.retry_after_ms());
        }
        None => println!("rate limit:   no attempts recorded"),
    }

    let records = AttributionLog::new(store)
        .records()
        .context("Failed to read conversion log")?;
    println!("conversions:  {}", records.len());
    if let Some(last) = records.last() {
        println!(
            "last:         {} at {} (session {})",
            last.venture, last.timestamp, last.session_id
        );
    }
    Ok(())
}

fn run_reset(state_dir: &Path) -> Result<()> {
    let store = open_store(state_dir)?;
    RateLimiter::new(Arc::clone(&store), Arc::new(SystemClock)).reset();
    AttributionLog::new(store)
        .clear()
        .context("Failed to clear conversion log")?;
    println!("Gate state cleared.");
    Ok(())
}
