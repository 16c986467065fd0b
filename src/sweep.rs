//! The periodic sweep: connect, extract, persist, report, sleep, repeat.

use std::time::{Duration, Instant};

use ip_harvest::{AddressClass, Harvest, Harvester};
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::input::FileOrStdin;
use crate::report::{RunReport, RunStatus, Totals};
use crate::retry::RetryPolicy;
use crate::shutdown::Shutdown;
use crate::store::{collection_name, now_epoch_secs, AddressStore, Connect};

/// Scheduling and connection settings of a [`Sweeper`].
#[derive(Clone, Debug)]
pub struct SweepConfig {
    /// Pause between the end of one run and the start of the next.
    pub interval: Duration,
    /// Stop after this many runs. `None` runs until shutdown.
    pub max_runs: Option<u64>,
    /// Backoff for opening the store.
    pub retry: RetryPolicy,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            interval: Duration::from_secs(10),
            max_runs: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Runs sweeps of one log source into one store.
#[derive(Debug)]
pub struct Sweeper<C> {
    input: FileOrStdin,
    harvester: Harvester,
    connector: C,
    config: SweepConfig,
}

impl<C: Connect> Sweeper<C> {
    pub fn new(input: FileOrStdin, harvester: Harvester, connector: C, config: SweepConfig) -> Self {
        Sweeper {
            input,
            harvester,
            connector,
            config,
        }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Perform one sweep. Failures end up in the report, never in a panic
    /// or an error.
    pub fn run_once(&self, shutdown: &Shutdown) -> RunReport {
        let mut store = match self
            .config
            .retry
            .run("store", shutdown, || self.connector.connect())
        {
            Ok(store) => store,
            Err(Error::Cancelled) => return RunReport::new(RunStatus::Cancelled),
            Err(err) => {
                error!("Storage connection failed, skipping run: {err:#}");
                return RunReport::new(RunStatus::StorageUnavailable).with_error(err);
            }
        };

        let (harvest, mut report) = self.extract();
        report.private = harvest.private().len();
        report.public = harvest.public().len();

        match persist(&mut store, &harvest, now_epoch_secs(), &mut report) {
            Ok(totals) => report.totals = Some(totals),
            Err(err) => {
                error!("Storage write failed: {err:#}");
                report.status = RunStatus::StorageFailed;
                report.error = Some(format!("{err:#}"));
            }
        }
        report
    }

    fn extract(&self) -> (Harvest, RunReport) {
        let start = Instant::now();
        match self.input.harvest(&self.harvester) {
            Ok(harvest) => {
                info!(
                    "Extracted {} private and {} public IPs from {} in {:.3}s",
                    harvest.private().len(),
                    harvest.public().len(),
                    self.input,
                    start.elapsed().as_secs_f64()
                );
                (harvest, RunReport::new(RunStatus::Completed))
            }
            Err(err) => (Harvest::default(), failed_extraction(&self.input, err)),
        }
    }

    /// Sweep repeatedly until `max_runs` is reached or shutdown is requested,
    /// handing each report to `on_report`.
    ///
    /// Returns the number of completed runs.
    ///
    /// # Errors
    ///
    /// Only errors returned by `on_report` end the loop early.
    pub fn run<F>(&self, shutdown: &Shutdown, mut on_report: F) -> Result<u64>
    where
        F: FnMut(&RunReport) -> Result<()>,
    {
        let mut runs = 0u64;
        loop {
            if shutdown.is_requested() {
                break;
            }
            runs += 1;
            info!("Starting sweep {runs} of {}", self.input);
            let report = self.run_once(shutdown);
            if report.status == RunStatus::Cancelled {
                warn!("Sweep {runs} cancelled");
                break;
            }
            on_report(&report)?;

            if self.config.max_runs.is_some_and(|max| runs >= max) {
                break;
            }
            if shutdown.wait(self.config.interval) {
                break;
            }
        }
        info!("Sweeper stopped after {runs} run(s)");
        Ok(runs)
    }
}

fn failed_extraction(input: &FileOrStdin, err: ip_harvest::Error) -> RunReport {
    match err {
        // a drained pipe is expected on every sweep after the first
        ip_harvest::Error::EmptyInput => {
            warn!("No input from {input}: {err}");
            RunReport::new(RunStatus::InputUnavailable).with_error(err)
        }
        ip_harvest::Error::InputUnavailable { .. } => {
            error!("Invalid input {input}: {err}");
            RunReport::new(RunStatus::InputUnavailable).with_error(err)
        }
        _ => {
            error!("Processing error: {err}");
            RunReport::new(RunStatus::ExtractionFailed).with_error(err)
        }
    }
}

fn persist<S: AddressStore>(
    store: &mut S,
    harvest: &Harvest,
    seen_at: f64,
    report: &mut RunReport,
) -> Result<Totals> {
    for class in AddressClass::ALL {
        let addresses = harvest.addresses(class);
        if addresses.is_empty() {
            continue;
        }
        let outcome = store.upsert(class, addresses, seen_at)?;
        info!(
            "Processed {} {} IPs into {} - Inserted: {}, Updated: {}",
            addresses.len(),
            class,
            collection_name(class),
            outcome.inserted,
            outcome.updated
        );
        report.set_upsert(class, outcome);
    }
    Ok(Totals {
        private: store.count(AddressClass::Private)?,
        public: store.count(AddressClass::Public)?,
    })
}
