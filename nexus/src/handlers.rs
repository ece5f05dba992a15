use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use nexus_core::report::{ReportFormat, generate_report, save_report};
use nexus_core::{Database, GraphStore, KeyValueStore, PersistedState, ScanCounts};
use nexus_scanner::{Command, ControlClient, Engine, EngineConfig, HttpBrowser};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;
use url::Url;

pub const DB_FILE: &str = "nexus.db";

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Install the log subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Open an existing database; a missing file means `init` never ran.
pub fn open_database(path: &Path) -> Result<Arc<Database>> {
    if !Database::exists(path) {
        bail!(
            "No database at {} (run `nexus init` first)",
            path.display()
        );
    }
    let db = Database::new(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(Arc::new(db))
}

fn persisted_state(db: Arc<Database>) -> PersistedState {
    let store: Arc<dyn KeyValueStore> = db;
    PersistedState::new(store)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Created,
    Replaced,
    Kept,
}

/// Create `dir` and the database inside it. An existing database is only
/// replaced when `overwrite` is set.
pub fn initialize_database(dir: &Path, overwrite: bool) -> Result<(PathBuf, InitOutcome)> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create config directory {}", dir.display()))?;

    let db_path = dir.join(DB_FILE);
    let mut outcome = InitOutcome::Created;
    if Database::exists(&db_path) {
        if !overwrite {
            return Ok((db_path, InitOutcome::Kept));
        }
        Database::drop(&db_path)
            .with_context(|| format!("Failed to remove {}", db_path.display()))?;
        outcome = InitOutcome::Replaced;
    }

    Database::new(&db_path)
        .with_context(|| format!("Failed to create database {}", db_path.display()))?;
    Ok((db_path, outcome))
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

pub fn handle_init(args: &ArgMatches) -> Result<()> {
    print_divider();
    println!("{}", "  NEXUS INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let dir = expand_path(
        args.get_one::<String>("PATH")
            .map(String::as_str)
            .unwrap_or("~/.config/nexus/"),
    );
    let force = args.get_flag("force");
    println!(
        "{} Target: {}",
        "→".blue(),
        dir.display().to_string().bright_white()
    );
    println!();

    let mut overwrite = force;
    let existing = dir.join(DB_FILE);
    if Database::exists(&existing) && !force {
        println!("{}", "⚠ WARNING".yellow().bold());
        println!("Database already exists at:");
        println!(
            "  {} {}",
            "•".yellow(),
            existing.display().to_string().bright_white()
        );
        println!();
        let response = print_prompt("Would you like to overwrite it? [y/N]:")?;
        println!();
        overwrite = response == "y" || response == "yes";
    }

    let (db_path, outcome) = initialize_database(&dir, overwrite)?;
    match outcome {
        InitOutcome::Created => println!("{} Database created", "✓".green().bold()),
        InitOutcome::Replaced => println!("{} Existing database replaced", "✓".green().bold()),
        InitOutcome::Kept => println!("{} Keeping existing database", "→".blue()),
    }

    println!();
    print_divider();
    println!("{}", "  INITIALIZATION COMPLETE".green().bold());
    print_divider();
    println!(
        "{} Database: {}",
        "✓".green().bold(),
        db_path.display().to_string().bright_white()
    );
    println!();
    Ok(())
}

/// Engine settings from the crawl flags.
pub fn engine_config(args: &ArgMatches) -> EngineConfig {
    let mut config = EngineConfig::default();
    if let Some(marker) = args.get_one::<String>("domain-marker") {
        config = config.with_domain_marker(marker.as_str());
    }
    if let Some(depth) = args.get_one::<usize>("max-depth") {
        config = config.with_max_depth(*depth);
    }
    config
}

pub fn format_counts(counts: &ScanCounts) -> String {
    format!("{} pages, {} links", counts.pages, counts.links)
}

pub async fn handle_crawl(args: &ArgMatches) -> Result<()> {
    let url = args
        .get_one::<Url>("url")
        .context("--url is required")?;
    let auto_browse = args.get_flag("auto-browse");
    let duration = args.get_one::<u64>("duration").map(|s| Duration::from_secs(*s));
    let db_path = expand_path(args.get_one::<String>("db").map(String::as_str).unwrap_or_default());

    let db = open_database(&db_path)?;
    let state = persisted_state(db.clone());
    let store: Arc<dyn KeyValueStore> = db;
    let config = engine_config(args);

    println!("\n🕸️  Recording {}", url.as_str().bright_white());
    println!("Domain marker: {}", config.domain_marker);
    if auto_browse {
        println!("Auto-browse: max depth {}", config.browse.max_depth);
    }
    println!();

    let browser = Arc::new(
        HttpBrowser::open(url.as_str())
            .await
            .with_context(|| format!("Failed to open {}", url))?,
    );

    let (handle, _task) = Engine::new(browser.clone(), store.clone(), config.clone()).spawn();
    let mut client = ControlClient::new(handle, move || {
        Engine::new(browser.clone(), store.clone(), config.clone()).spawn().0
    });

    let ack = client.send(Command::StartScan).await?;
    if !ack.success {
        bail!("Scan failed to start: {}", ack.error.unwrap_or_default());
    }
    if auto_browse {
        let ack = client.send(Command::StartAutoBrowse).await?;
        if !ack.success {
            bail!("Auto-browse failed to start: {}", ack.error.unwrap_or_default());
        }
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));

    let started = Instant::now();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        let counts = state.scan_data().await?.counts();
        let mut message = format_counts(&counts);
        if let Some(progress) = state.progress().await? {
            message.push_str(&format!(" | browsing {}/{}", progress.current, progress.total));
        }
        spinner.set_message(message);

        if auto_browse && !state.auto_browsing().await? {
            break;
        }
        if duration.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }

        tokio::select! {
            _ = &mut ctrl_c => {
                spinner.println("Interrupted, stopping scan");
                break;
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }

    let ack = client.send(Command::StopScan).await?;
    if !ack.success {
        tracing::warn!("Stop failed: {}", ack.error.unwrap_or_default());
    }
    spinner.finish_and_clear();

    let counts = state.scan_data().await?.counts();
    println!("{} Crawl complete: {}", "✓".green().bold(), format_counts(&counts));
    println!(
        "{} Database: {}",
        "→".blue(),
        db_path.display().to_string().bright_white()
    );
    Ok(())
}

pub async fn handle_graph(args: &ArgMatches) -> Result<()> {
    let db_path = expand_path(args.get_one::<String>("db").map(String::as_str).unwrap_or_default());
    let format_name = args
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");
    let format = ReportFormat::from_str(format_name)
        .with_context(|| format!("Unknown report format: {}", format_name))?;

    let state = persisted_state(open_database(&db_path)?);
    let data = state.scan_data().await?;
    if data.pages.is_empty() {
        bail!("No scan data available");
    }

    let report = generate_report(&data, format)?;
    match args.get_one::<PathBuf>("output") {
        Some(path) => {
            save_report(&report, path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!(
                "{} Report saved to {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
        None => print!("{}", report),
    }
    Ok(())
}

/// Human-readable summary of the persisted engine state.
pub async fn status_report(state: &PersistedState) -> Result<String> {
    let flag = |on: bool| if on { "on" } else { "off" };
    let counts = state.scan_data().await?.counts();
    let mut lines = vec![
        format!("Scanning:    {}", flag(state.scanning().await?)),
        format!("Auto-browse: {}", flag(state.auto_browsing().await?)),
    ];
    if let Some(progress) = state.progress().await? {
        lines.push(format!("Progress:    {}/{}", progress.current, progress.total));
    }
    lines.push(format!("Graph:       {}", format_counts(&counts)));
    Ok(lines.join("\n"))
}

pub async fn handle_status(args: &ArgMatches) -> Result<()> {
    let db_path = expand_path(args.get_one::<String>("db").map(String::as_str).unwrap_or_default());
    let state = persisted_state(open_database(&db_path)?);
    println!("{}", status_report(&state).await?);
    Ok(())
}

/// Empty the graph and reset every flag.
pub async fn clear_state(state: &PersistedState) -> Result<()> {
    GraphStore::new(state.clone()).clear().await?;
    state.set_scanning(false).await?;
    state.set_auto_browsing(false).await?;
    state.set_progress(None).await?;
    Ok(())
}

pub async fn handle_clear(args: &ArgMatches) -> Result<()> {
    let db_path = expand_path(args.get_one::<String>("db").map(String::as_str).unwrap_or_default());
    let state = persisted_state(open_database(&db_path)?);
    clear_state(&state).await?;
    println!("{} Scan data cleared", "✓".green().bold());
    Ok(())
}
