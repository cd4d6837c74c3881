use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;

use gc_dashboard::config::Config;
use gc_dashboard::http_client::HttpSource;
use gc_dashboard::ingest::{self, IngestTarget};
use gc_dashboard::store::{self, TableKind};

#[derive(Parser, Debug)]
#[command(name = "gc_ingest", about = "Fetch GamersClub stats into the local table store")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON config file (defaults to $GC_CONFIG or ./gc_dashboard.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Where tables.sqlite and tables.xlsx live
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Skip writing the xlsx workbook
    #[arg(long, global = true)]
    no_export: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Rebuild the per-match player table
    Matches,
    /// Rebuild the monthly player history table
    History,
    /// Rebuild both tables
    All,
    /// Show the last run of each table
    Status,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let registry = tracing_subscriber::Registry::default()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::filter::filter_fn(|meta| {
            meta.target().starts_with("gc_")
        }));
    tracing::subscriber::set_global_default(registry).context("install tracing subscriber")?;

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }
    let db_path = config
        .store_path()
        .context("unable to resolve data directory (set GC_DATA_DIR or --data-dir)")?;

    let target = match cli.command {
        Command::Matches => IngestTarget::Matches,
        Command::History => IngestTarget::History,
        Command::All => IngestTarget::All,
        Command::Status => return print_status(&db_path),
    };

    let source = HttpSource::from_config(&config)?;
    let mut conn = store::open_db(&db_path)?;
    let export_path = if cli.no_export {
        None
    } else {
        config.export_path()
    };

    tracing::info!(db = %db_path.display(), ?target, "starting ingest");
    let summary = ingest::run_ingest(&source, &config, &mut conn, target, export_path.as_deref())?;

    println!("Ingest complete");
    println!("DB: {}", db_path.display());
    for table in &summary.tables {
        println!(
            "{}: {}/{} fetched, {} rows written",
            table.kind.label(),
            table.items_succeeded,
            table.items_total,
            table.rows_written
        );
        if !table.errors.is_empty() {
            println!("Errors: {}", table.errors.len());
            for err in table.errors.iter().take(8) {
                println!(" - {err}");
            }
        }
    }
    if let Some(path) = summary.export_path {
        println!("Workbook: {}", path.display());
    }

    Ok(())
}

fn print_status(db_path: &std::path::Path) -> Result<()> {
    if !db_path.exists() {
        println!("No table store at {}", db_path.display());
        return Ok(());
    }
    let conn = store::open_db(db_path)?;
    println!("DB: {}", db_path.display());
    for kind in [TableKind::Matches, TableKind::History] {
        match store::last_run(&conn, kind)? {
            Some(run) => {
                println!(
                    "{}: run {} finished {} | {}/{} fetched, {} rows, {} errors",
                    kind.label(),
                    run.run_id,
                    run.finished_at,
                    run.items_succeeded,
                    run.items_total,
                    run.rows_written,
                    run.errors.len()
                );
            }
            None => println!("{}: never ingested", kind.label()),
        }
    }
    Ok(())
}
