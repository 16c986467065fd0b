//! Periodic sweeps of log files for IPv4 addresses.
//!
//! A sweep reads a log source, extracts every private and public IPv4 address
//! with [`ip_harvest`], upserts them into a document store with first-seen and
//! last-seen timestamps, and reports the counts. The [`Sweeper`] repeats this
//! on a fixed interval until shutdown.
//!
//! # Examples
//!
//! One sweep into an in-memory store:
//!
//! ```rust,no_run
//! use ipsweep::{shutdown, FileOrStdin, MemoryStore, SweepConfig, Sweeper};
//! use ip_harvest::HarvesterBuilder;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let harvester = HarvesterBuilder::new().build()?;
//! let sweeper = Sweeper::new(
//!     FileOrStdin::from_path("data/access.log".into()),
//!     harvester,
//!     MemoryStore::new(),
//!     SweepConfig::default(),
//! );
//!
//! let (_handle, shutdown) = shutdown::channel();
//! let report = sweeper.run_once(&shutdown);
//! report.write_text(&mut std::io::stdout())?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod input;
pub mod logging;
pub mod report;
pub mod retry;
pub mod shutdown;
pub mod store;
pub mod sweep;

pub use crate::error::{Error, Result};
pub use crate::input::FileOrStdin;
pub use crate::report::{RunReport, RunStatus, Totals};
pub use crate::retry::RetryPolicy;
pub use crate::store::{AddressStore, Connect, Document, JsonConnector, JsonStore, MemoryStore, UpsertOutcome};
pub use crate::sweep::{SweepConfig, Sweeper};
