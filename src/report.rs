use std::io::Write;

use ip_harvest::AddressClass;
use serde::Serialize;

use crate::error::Result;
use crate::store::UpsertOutcome;

/// How a sweep ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Extraction and persistence both finished.
    Completed,
    /// The input was missing or empty; an empty result was persisted.
    InputUnavailable,
    /// Reading or processing failed part way; nothing was extracted.
    ExtractionFailed,
    /// No store connection within the retry budget; the run was skipped.
    StorageUnavailable,
    /// The store rejected a write or a count.
    StorageFailed,
    /// Shutdown interrupted the run.
    Cancelled,
}

impl RunStatus {
    /// Whether the counts of this run mean anything.
    pub fn has_counts(self) -> bool {
        !matches!(self, RunStatus::StorageUnavailable | RunStatus::Cancelled)
    }
}

/// Document totals per collection after persisting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub private: usize,
    pub public: usize,
}

/// Outcome of one sweep.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    /// Unique private addresses extracted this run.
    pub private: usize,
    /// Unique public addresses extracted this run.
    pub public: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_upsert: Option<UpsertOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_upsert: Option<UpsertOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<Totals>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    pub fn new(status: RunStatus) -> Self {
        RunReport {
            status,
            private: 0,
            public: 0,
            private_upsert: None,
            public_upsert: None,
            totals: None,
            error: None,
        }
    }

    pub(crate) fn with_error(mut self, err: impl std::fmt::Display) -> Self {
        self.error = Some(format!("{err:#}"));
        self
    }

    pub fn upsert(&self, class: AddressClass) -> Option<UpsertOutcome> {
        match class {
            AddressClass::Private => self.private_upsert,
            AddressClass::Public => self.public_upsert,
        }
    }

    pub(crate) fn set_upsert(&mut self, class: AddressClass, outcome: UpsertOutcome) {
        match class {
            AddressClass::Private => self.private_upsert = Some(outcome),
            AddressClass::Public => self.public_upsert = Some(outcome),
        }
    }

    /// Write the human summary. Runs without counts write nothing.
    pub fn write_text<W: Write>(&self, out: &mut W) -> Result<()> {
        if !self.status.has_counts() {
            return Ok(());
        }
        writeln!(out, "Private IPs: {}", self.private)?;
        writeln!(out, "Public IPs: {}", self.public)?;
        if let Some(totals) = self.totals {
            writeln!(out, "Store - Total Private IPs stored: {}", totals.private)?;
            writeln!(out, "Store - Total Public IPs stored: {}", totals.public)?;
        }
        out.flush()?;
        Ok(())
    }

    /// Write the report as a single JSON line.
    pub fn write_json<W: Write>(&self, out: &mut W) -> Result<()> {
        serde_json::to_writer(&mut *out, self)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}
