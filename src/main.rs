use anyhow::{bail, Context};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use staywatch_core::{
    create_record_table, read_records, summarize_records, DailyTrigger, NdjsonSink, Region,
    RunPlan,
};
use staywatch_scrapers::field::to_date;
use staywatch_scrapers::{
    ExtractionSession, FetcherConfig, HttpFetcher, RunScheduler, SessionConfig, DEFAULT_BASE_URL,
};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Write logs to scraper_YYYYMMDD.log in this directory instead of stderr
    #[arg(long, global = true, env = "STAYWATCH_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract hotel listings once for the given regions and stay windows
    #[command(long_about = "Fetch the search results for each region and stay window, enrich every card from its detail page and write one NDJSON file per run.")]
    Scrape(ScrapeCommand),

    /// Run the extraction every day at a fixed local time
    #[command(long_about = "Wait for the daily trigger, then run every region and stay window starting from that day. Runs until interrupted.")]
    Schedule(ScheduleCommand),

    /// Show the records of an NDJSON run file
    Inspect(InspectCommand),

    /// List the known region ids
    Regions,
}

#[derive(Args)]
struct PlanArgs {
    /// Region ids or known names (-r, --region). Can be repeated or comma separated.
    #[arg(short = 'r', long = "region", required = true, num_args = 1.., value_delimiter = ',', env = "STAYWATCH_REGIONS")]
    regions: Vec<Region>,

    /// Consecutive check-in days to cover (-d, --days)
    #[arg(short = 'd', long, default_value_t = 1, env = "STAYWATCH_DAYS")]
    days: u32,

    /// Nights per stay (-n, --nights)
    #[arg(short = 'n', long, default_value_t = 1, env = "STAYWATCH_NIGHTS")]
    nights: u32,

    /// Directory receiving the NDJSON files (-o, --output-dir)
    #[arg(short = 'o', long, default_value = "output", env = "STAYWATCH_OUTPUT_DIR")]
    output_dir: PathBuf,
}

#[derive(Args)]
struct SessionArgs {
    /// Site root used to build search URLs and resolve card links
    #[arg(long, default_value = DEFAULT_BASE_URL, env = "STAYWATCH_BASE_URL")]
    base_url: Url,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30, env = "STAYWATCH_TIMEOUT_SECS")]
    timeout_secs: u64,

    /// Detail pages fetched concurrently (-c, --concurrency)
    #[arg(short = 'c', long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..=16), env = "STAYWATCH_CONCURRENCY")]
    concurrency: u16,

    /// Lower bound of the pause before each request, in milliseconds
    #[arg(long, default_value_t = 2000, env = "STAYWATCH_MIN_DELAY_MS")]
    min_delay_ms: u64,

    /// Upper bound of the pause before each request, in milliseconds
    #[arg(long, default_value_t = 5000, env = "STAYWATCH_MAX_DELAY_MS")]
    max_delay_ms: u64,

    /// Detailed addresses are cut after this token
    #[arg(long, default_value = "España", env = "STAYWATCH_COUNTRY_TOKEN")]
    country_token: String,
}

#[derive(Args)]
struct ScrapeCommand {
    /// First check-in date, YYYY-MM-DD or DD/MM/YYYY (-i, --check-in). Defaults to today.
    #[arg(short = 'i', long, value_parser = parse_date)]
    check_in: Option<NaiveDate>,

    #[command(flatten)]
    plan: PlanArgs,

    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Args)]
struct ScheduleCommand {
    /// Local time of the daily run, HH:MM (-a, --at)
    #[arg(short = 'a', long, default_value = "06:00", env = "STAYWATCH_AT")]
    at: DailyTrigger,

    #[command(flatten)]
    plan: PlanArgs,

    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Args)]
struct InspectCommand {
    /// NDJSON file written by a previous run
    file: PathBuf,

    /// Maximum number of rows to display (-l, --limit)
    #[arg(short = 'l', long)]
    limit: Option<usize>,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    to_date(raw)
        .value()
        .ok_or_else(|| format!("Invalid date: {}. Expected YYYY-MM-DD", raw))
}

fn init_logging(log_dir: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let path = dir.join(format!("scraper_{}.log", Local::now().format("%Y%m%d")));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn build_session(args: &SessionArgs, cancel: CancellationToken) -> anyhow::Result<ExtractionSession> {
    let timeout = Duration::from_secs(args.timeout_secs);
    let fetcher = HttpFetcher::new(FetcherConfig {
        timeout,
        ..FetcherConfig::default()
    })
    .context("building HTTP client")?;

    let config = SessionConfig {
        base_url: args.base_url.clone(),
        fetch_timeout: timeout,
        concurrency: usize::from(args.concurrency),
        min_delay: Duration::from_millis(args.min_delay_ms),
        max_delay: Duration::from_millis(args.max_delay_ms),
        country_token: args.country_token.clone(),
    };

    let session = ExtractionSession::new(Arc::new(fetcher), config)
        .context("invalid session settings")?
        .with_cancellation(cancel);
    Ok(session)
}

fn build_plan(plan: &PlanArgs) -> anyhow::Result<(RunPlan, NdjsonSink)> {
    let run_plan = RunPlan::new(plan.regions.clone(), plan.days, plan.nights)?;
    let sink = NdjsonSink::new(&plan.output_dir);
    info!("Writing run files to {}", sink.dir().display());
    Ok((run_plan, sink))
}

/// Cancels `token` on the first Ctrl-C. Records assembled so far are still written.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, finishing with the records assembled so far");
                token.cancel();
            }
            Err(e) => error!("Unable to listen for Ctrl-C: {}", e),
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Scrape(cmd) => {
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());

            let (plan, sink) = build_plan(&cmd.plan)?;
            let session = build_session(&cmd.session, cancel.clone())?;
            let start = cmd.check_in.unwrap_or_else(|| Local::now().date_naive());

            let runs = plan.runs_for(start);
            let total = runs.len();
            let mut failed = 0;
            for params in runs {
                if cancel.is_cancelled() {
                    warn!("Cancelled, skipping remaining runs from {}", params);
                    break;
                }
                match session.run_and_write(&params, &sink).await {
                    Ok(outcome) => match &outcome.path {
                        Some(path) => println!(
                            "{}: {} of {} cards emitted -> {}",
                            params,
                            outcome.report.emitted(),
                            outcome.report.cards,
                            path.display()
                        ),
                        None => println!("{}: cancelled before any record was assembled", params),
                    },
                    Err(e) => {
                        failed += 1;
                        println!("{}: failed ({})", params, e);
                    }
                }
            }

            if failed > 0 {
                bail!("{} of {} runs failed", failed, total);
            }
        }
        Commands::Schedule(cmd) => {
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());

            let (plan, sink) = build_plan(&cmd.plan)?;
            let mut scheduler = RunScheduler::new(
                build_session(&cmd.session, cancel)?,
                Arc::new(sink),
                plan,
                cmd.at,
            );
            info!(
                "Scheduling {} regions daily at {}",
                scheduler.plan().regions.len(),
                cmd.at.at().format("%H:%M")
            );
            scheduler.run_forever().await;
        }
        Commands::Inspect(cmd) => {
            let records = read_records(&cmd.file)
                .with_context(|| format!("reading {}", cmd.file.display()))?;
            let shown = cmd.limit.unwrap_or(records.len()).min(records.len());

            println!("{}", create_record_table(&records[..shown]));
            println!("{}", summarize_records(&records));
        }
        Commands::Regions => {
            for region in Region::known() {
                println!("{:>6}  {}", region.id, region.name);
            }
        }
    }

    Ok(())
}
