use anyhow::{Context, Error, Result};
use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;

use ip_harvest::{HarvesterBuilder, SortOrder, DEFAULT_CHUNK_SIZE};
use ipsweep::{logging, shutdown, FileOrStdin, JsonConnector, RetryPolicy, SweepConfig, Sweeper};

/// Check if the error chain contains a broken pipe error.
#[inline(always)]
fn is_broken_pipe(err: &Error) -> bool {
    for cause in err.chain() {
        // library I/O errors are transparent and hide the io::Error from the chain
        let io_err = match cause.downcast_ref::<ipsweep::Error>() {
            Some(ipsweep::Error::Io(io_err)) => Some(io_err),
            _ => cause.downcast_ref::<io::Error>(),
        };
        if io_err.is_some_and(|e| e.kind() == io::ErrorKind::BrokenPipe) {
            return true;
        }
    }
    false
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Log file to sweep. Use "-" to read from stdin
    #[clap(
        value_name = "FILE",
        value_hint = clap::ValueHint::FilePath,
        default_value = "data/access.log"
    )]
    input: Utf8PathBuf,

    /// Directory holding the store's database files
    #[clap(
        long,
        value_name = "DIR",
        value_hint = clap::ValueHint::DirPath,
        env = "IPSWEEP_STORE",
        default_value = "data"
    )]
    store: Utf8PathBuf,

    /// Database name; addresses are kept in <DIR>/<NAME>.json
    #[clap(
        long,
        value_name = "NAME",
        env = "IPSWEEP_DATABASE",
        default_value = "ip_extraction"
    )]
    database: String,

    /// Seconds to wait between sweeps
    #[clap(long, value_name = "SECS", default_value_t = 10)]
    interval: u64,

    /// Sweep once and exit
    #[clap(long, conflicts_with = "runs")]
    once: bool,

    /// Stop after this many sweeps
    #[clap(long, value_name = "N")]
    runs: Option<u64>,

    /// Bytes read per chunk (at least 15)
    #[clap(long, value_name = "BYTES", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Worker threads; 0 uses one per CPU
    #[clap(short, long, value_name = "N", default_value_t = 0)]
    workers: usize,

    /// Order of the extracted address lists
    #[clap(long, value_enum, default_value_t = ArgsSortOrder::Lexicographic)]
    sort: ArgsSortOrder,

    /// Print each run report as a JSON line
    #[clap(long)]
    json: bool,

    /// Store connection attempts per sweep
    #[clap(long, value_name = "N", default_value_t = 5)]
    connect_retries: u32,

    /// Seconds before the first connection retry; doubles on every retry
    #[clap(long, value_name = "SECS", default_value_t = 5)]
    retry_delay: u64,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
enum ArgsSortOrder {
    Lexicographic,
    Numeric,
}

impl From<ArgsSortOrder> for SortOrder {
    fn from(order: ArgsSortOrder) -> Self {
        match order {
            ArgsSortOrder::Lexicographic => SortOrder::Lexicographic,
            ArgsSortOrder::Numeric => SortOrder::Numeric,
        }
    }
}

fn main() -> ExitCode {
    let err = match run_main() {
        Ok(code) => return code,
        Err(err) => err,
    };

    if is_broken_pipe(&err) {
        return ExitCode::SUCCESS;
    }

    // Print detailed error information based on environment variables
    if std::env::var("RUST_BACKTRACE").is_ok_and(|v| v == "1")
        && std::env::var("RUST_LIB_BACKTRACE").map_or(true, |v| v == "1")
    {
        let _ = writeln!(&mut io::stderr(), "{:?}", err);
    } else {
        let _ = writeln!(&mut io::stderr(), "{:#}", err);
    }

    ExitCode::FAILURE
}

fn run_main() -> Result<ExitCode> {
    let args = Args::parse();
    logging::init(args.verbose)?;

    let harvester = HarvesterBuilder::new()
        .chunk_size(args.chunk_size)
        .workers(args.workers)
        .sort_order(args.sort.into())
        .build()
        .context("failed to set up extraction")?;

    let connector = JsonConnector::new(args.store.clone(), args.database.clone())?;

    let config = SweepConfig {
        interval: Duration::from_secs(args.interval),
        max_runs: if args.once { Some(1) } else { args.runs },
        retry: RetryPolicy {
            max_attempts: args.connect_retries,
            initial_delay: Duration::from_secs(args.retry_delay),
            ..RetryPolicy::default()
        },
    };

    let (handle, shutdown) = shutdown::channel();
    let mut handle = Some(handle);
    ctrlc::set_handler(move || {
        if let Some(handle) = handle.take() {
            info!("Shutdown requested, finishing current sweep");
            handle.trigger();
        }
    })
    .context("failed to install Ctrl-C handler")?;

    info!(
        "Sweeping {} into {} every {}s",
        args.input,
        connector.path(),
        args.interval
    );
    let sweeper = Sweeper::new(FileOrStdin::from_path(args.input), harvester, connector, config);

    let json = args.json;
    let stdout = io::stdout();
    sweeper.run(&shutdown, |report| {
        let mut out = stdout.lock();
        if json {
            report.write_json(&mut out)
        } else {
            report.write_text(&mut out)
        }
    })?;

    Ok(ExitCode::SUCCESS)
}
