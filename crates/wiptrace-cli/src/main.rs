//! wiptrace CLI
//!
//! Operator workflow for collecting repair-station failure diagnostics
//! from the WIP portal:
//!
//!   wiptrace ingest WipOutputReport.csv        # report -> serial_batch_N.json
//!   wiptrace login                             # manual login, save cookies
//!   wiptrace scrape output_batch1.csv --batch serial_batch_1.json --cookies cookies.json
//!   wiptrace merge                             # output_batch*.csv -> combined
//!   wiptrace clean wip_error_scraper_combined.csv

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tracing::info;

use wiptrace::batch::{build_records, chunk_records, load_batch, read_wip_report, write_batches};
use wiptrace::driver::{load_cookies, save_cookies, PortalDriver};
use wiptrace::ledger::{clean_ledger, find_batch_outputs, merge_ledgers, Ledger};
use wiptrace::orchestrator::{Orchestrator, PortalConfig};
use wiptrace::CdpDriver;

#[derive(Parser)]
#[command(name = "wiptrace")]
#[command(about = "Repair-station failure diagnostics scraper for the wareconn WIP portal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an exported WIP report into serial batch files
    Ingest(IngestArgs),
    /// Log in manually and save session cookies for later runs
    Login(LoginArgs),
    /// Look up one batch of serials and append results to a ledger
    Scrape(ScrapeArgs),
    /// Combine batch ledgers into one CSV
    Merge(MergeArgs),
    /// Filter a combined ledger down to its header and well-formed rows
    Clean(CleanArgs),
}

#[derive(Parser)]
struct IngestArgs {
    /// Exported WIP report (CSV with Workstation Name / SN / PN /
    /// History station start time columns)
    report: PathBuf,

    /// Serials per batch file
    #[clap(long, default_value_t = 500)]
    batch_size: usize,

    /// Directory for the serial_batch_<N>.json files
    #[clap(long, default_value = ".")]
    out_dir: PathBuf,
}

#[derive(Parser)]
struct LoginArgs {
    /// Where to save the captured session cookies
    #[clap(long, default_value = "cookies.json")]
    cookies: PathBuf,
}

#[derive(Parser)]
struct ScrapeArgs {
    /// Output ledger path; also the resume point for re-runs
    #[clap(default_value = "output_batch1.csv")]
    ledger: PathBuf,

    /// Batch file produced by `ingest`
    #[clap(long, default_value = "serial_batch_1.json")]
    batch: PathBuf,

    /// Inherit login state from a cookie file saved by `login` (the file
    /// must exist)
    #[clap(long)]
    cookies: Option<PathBuf>,

    /// Log in manually before processing starts; cookies are saved to
    /// --save-cookies afterwards
    #[clap(long)]
    interactive: bool,

    /// Where `--interactive` saves the captured cookies
    #[clap(long, default_value = "cookies.json")]
    save_cookies: PathBuf,

    /// Run the browser headless (only useful with --cookies)
    #[clap(long)]
    headless: bool,
}

#[derive(Parser)]
struct MergeArgs {
    /// Directory to scan for output_batch<N>.csv when no files are given
    #[clap(long, default_value = ".")]
    dir: PathBuf,

    /// Combined output file
    #[clap(short, long, default_value = "wip_error_scraper_combined.csv")]
    output: PathBuf,

    /// Explicit ledger files to merge, in order
    files: Vec<PathBuf>,
}

#[derive(Parser)]
struct CleanArgs {
    /// Combined ledger to clean
    input: PathBuf,

    /// Cleaned output file (default: <input stem>_clean.csv)
    #[clap(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest(args) => ingest(args),
        Commands::Login(args) => login(args).await,
        Commands::Scrape(args) => scrape(args).await,
        Commands::Merge(args) => merge(args),
        Commands::Clean(args) => clean(args),
    }
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn ingest(args: IngestArgs) -> Result<()> {
    anyhow::ensure!(args.batch_size > 0, "--batch-size must be at least 1");
    let rows = read_wip_report(&args.report)?;
    let records = build_records(rows);
    let batches = chunk_records(records, args.batch_size);
    let paths = write_batches(&args.out_dir, &batches)?;

    println!("Created {} batch files:", paths.len());
    for (path, batch) in paths.iter().zip(&batches) {
        println!("{}: {} serials", path.display(), batch.len());
        for (i, record) in batch.iter().take(3).enumerate() {
            println!(
                "  {}. {} - {}",
                i + 1,
                record.serial_number,
                record.workstation_name
            );
        }
    }
    println!(
        "Total serials processed: {}",
        batches.iter().map(Vec::len).sum::<usize>()
    );
    Ok(())
}

async fn login(args: LoginArgs) -> Result<()> {
    let config = PortalConfig::default();
    let driver = CdpDriver::launch(false).await?;
    driver.navigate(&config.login_url).await?;

    println!("Please log in manually in the browser window.");
    println!("After you are logged in, press Enter here to continue...");
    wait_for_enter().await?;

    let cookies = driver.cookies().await?;
    save_cookies(&args.cookies, &cookies)?;
    println!("Cookies saved to {}.", args.cookies.display());
    driver.close().await;
    Ok(())
}

async fn scrape(args: ScrapeArgs) -> Result<()> {
    let batch = load_batch(&args.batch)
        .with_context(|| format!("loading batch file {}", args.batch.display()))?;
    info!(serials = batch.len(), batch = %args.batch.display(), "Loaded batch file");

    // Resolve the cookie blob before touching a browser: a missing cookie
    // file must fail the run before any serial is attempted.
    let inherited = match &args.cookies {
        Some(path) => Some(load_cookies(path)?),
        None => None,
    };

    let mut ledger = Ledger::open(&args.ledger)?;
    let config = PortalConfig::default();

    let driver = CdpDriver::launch(args.headless).await?;
    if let Some(blob) = inherited {
        driver.set_cookies(blob).await?;
        info!("Injected inherited session cookies");
    }
    driver.navigate(&config.summary_url).await?;

    if args.interactive {
        println!("Please log in and stage the area in the browser window.");
        println!("When ready, press Enter here to start processing serials...");
        wait_for_enter().await?;
        let cookies = driver.cookies().await?;
        save_cookies(&args.save_cookies, &cookies)?;
        println!("Cookies saved to {}.", args.save_cookies.display());
    }

    let orchestrator = Orchestrator::new(&driver, config);
    let summary = orchestrator.run_batch(&batch, &mut ledger).await?;
    driver.close().await;

    println!("=== PROCESSING COMPLETE ===");
    println!("Successfully processed: {}", summary.succeeded);
    println!("Failed to process: {}", summary.failed);
    println!("Skipped (already recorded): {}", summary.skipped);
    println!("Total attempted: {}", summary.attempted);
    Ok(())
}

fn merge(args: MergeArgs) -> Result<()> {
    let inputs = if args.files.is_empty() {
        find_batch_outputs(&args.dir)?
    } else {
        args.files
    };
    let stats = merge_ledgers(&inputs, &args.output)
        .context("merging batch ledgers")?;
    println!(
        "Combined {} batch CSVs into {} ({} data rows)",
        stats.files,
        args.output.display(),
        stats.rows
    );
    Ok(())
}

fn clean(args: CleanArgs) -> Result<()> {
    let output = args
        .output
        .unwrap_or_else(|| default_clean_path(&args.input));
    let stats = clean_ledger(&args.input, &output)?;
    println!("Cleaned CSV written to {}", output.display());
    println!(
        "Original lines: {}, Cleaned lines: {}",
        stats.input_lines, stats.kept_lines
    );
    Ok(())
}

fn default_clean_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("combined");
    input.with_file_name(format!("{stem}_clean.csv"))
}

async fn wait_for_enter() -> Result<()> {
    let mut line = String::new();
    BufReader::new(stdin())
        .read_line(&mut line)
        .await
        .context("reading stdin")?;
    Ok(())
}
