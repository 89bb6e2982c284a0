//! lodestar - main entry point
//!
//! Thin binary layer: logging and signal-handler setup, CLI dispatch, and
//! the wiring between the catalog, the execution worker and the progress
//! observer. Everything else lives in the library.

use anyhow::{Context, anyhow, bail};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use lodestar::catalog::{Catalog, default_catalog};
use lodestar::cli::{Cli, Commands};
use lodestar::executor::{Engine, ToolConfig, spawn_run};
use lodestar::payload::{App, AppSummary};
use lodestar::planner::build_plan;
use lodestar::process_guard;
use lodestar::progress::{POLL_INTERVAL, ProgressObserver, ProgressTracker};

/// Initialize the tracing subscriber. RUST_LOG overrides the info default.
fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    info!("lodestar starting up");

    // Children must not outlive us mid-batch
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("failed to install signal handlers: {}", e);
    }

    let cli = Cli::parse_args();
    match cli.command {
        Some(Commands::List { json }) => cmd_list(json),
        Some(Commands::Apply { select, enable_option, dry_run, chroot }) => {
            cmd_apply(&select, &enable_option, dry_run, chroot)
        }
        None => cmd_list(false),
    }
}

#[derive(Serialize)]
struct ListedApp<'a> {
    id: &'a str,
    #[serde(flatten)]
    app: AppSummary<'a>,
}

fn cmd_list(json: bool) -> anyhow::Result<()> {
    let catalog = default_catalog();
    if json {
        let listing: Vec<ListedApp<'_>> = catalog
            .iter()
            .map(|(id, app)| ListedApp { id: id.as_str(), app: app.summary() })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    for (id, app) in &catalog {
        let category = app.category.as_deref().unwrap_or("-");
        println!("{:<10} {:<14} {:<24} {}", id, category, app.name, app.description);
        if let Some(option) = &app.option {
            println!("{:<10} {:<14} {:<24} option: {}", "", "", "", option.description());
        }
    }
    Ok(())
}

fn cmd_apply(
    select: &[String],
    enable_option: &[String],
    dry_run: bool,
    chroot: Option<PathBuf>,
) -> anyhow::Result<()> {
    let catalog = default_catalog();
    let apps = resolve_selection(&catalog, select, enable_option)?;

    if dry_run {
        let plan = build_plan(&apps);
        println!("{}", plan);
        return Ok(());
    }

    let tracker = ProgressTracker::new();
    let mut engine = Engine::new(ToolConfig::default(), tracker.clone());
    if let Some(dir) = chroot {
        engine = engine.with_chroot(dir);
    }

    // Status line on stderr, refreshed whenever it changes; tool output
    // itself goes to stdout through the process runner
    let observer = ProgressObserver::spawn(tracker, POLL_INTERVAL, {
        let mut last = String::new();
        move |state| {
            let line = state.to_string();
            if line != last {
                eprintln!("{}", line);
                last = line;
            }
        }
    });

    let worker = spawn_run(engine, apps);
    let result = worker.join().map_err(|_| anyhow!("install worker panicked"));
    observer.stop();
    let summary = result??;

    if let Some(code) = summary.last_exit {
        info!("last tool exit code: {}", code);
    }
    println!("Done.");
    Ok(())
}

/// Look up the selected ids and arm the requested options.
fn resolve_selection(
    catalog: &Catalog,
    select: &[String],
    enable_option: &[String],
) -> anyhow::Result<Vec<App>> {
    for id in enable_option {
        if !select.contains(id) {
            bail!("--enable-option {} requires selecting that component", id);
        }
    }

    let mut apps = Vec::with_capacity(select.len());
    for id in select {
        let app = catalog
            .get(id)
            .with_context(|| format!("unknown component: {}", id))?;
        if enable_option.contains(id) {
            match &app.option {
                Some(option) => option.set(true),
                None => bail!("component {} has no option to enable", id),
            }
        }
        apps.push(app.clone());
    }
    Ok(apps)
}
