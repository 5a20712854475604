//! Measurement journal: memoized outcomes keyed by configuration and the
//! bus transfers counted in the timing.

use crate::oracle::{BusTransfer, Measurement, MeasurementOracle, OracleError};
use anyhow::Result;
use gemvtune_kernels::config::Configuration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

type JournalKey = (Configuration, BusTransfer);

/// One line of the journal file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub config: Configuration,
    #[serde(default)]
    pub transfer: BusTransfer,
    pub measurement: Measurement,
}

#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: BTreeMap<JournalKey, Measurement>,
}

impl Journal {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, config: &Configuration, transfer: BusTransfer) -> Option<&Measurement> {
        self.entries.get(&(*config, transfer))
    }

    /// Newer measurements replace older ones for the same key.
    pub fn record(&mut self, config: Configuration, transfer: BusTransfer, measurement: Measurement) {
        self.entries.insert((config, transfer), measurement);
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries
            .iter()
            .map(|(&(config, transfer), measurement)| JournalEntry {
                config,
                transfer,
                measurement: measurement.clone(),
            })
            .collect()
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = fs::read(path)?;
        let entries: Vec<JournalEntry> = serde_json::from_slice(&data)?;
        let mut journal = Self::new();
        for entry in entries {
            journal.record(entry.config, entry.transfer, entry.measurement);
        }
        debug!(path = %path.display(), entries = journal.len(), "loaded journal");
        Ok(journal)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let blob = serde_json::to_vec_pretty(&self.entries())?;
        fs::write(path, blob)?;
        Ok(())
    }
}

/// Answers from the journal as it stood when the current pass began and
/// records every fresh measurement into the live journal.
///
/// Results measured during a pass are only replayed by later passes, so the
/// warm-up and every measured round of a pass reach the device.
pub struct JournaledOracle<'j, O> {
    journal: &'j mut Journal,
    memo: Journal,
    inner: O,
    hits: usize,
}

impl<'j, O: MeasurementOracle> JournaledOracle<'j, O> {
    pub fn new(journal: &'j mut Journal, inner: O) -> Self {
        let memo = journal.clone();
        Self {
            journal,
            memo,
            inner,
            hits: 0,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn into_inner(self) -> O {
        self.inner
    }
}

impl<O: MeasurementOracle> MeasurementOracle for JournaledOracle<'_, O> {
    fn measure(
        &mut self,
        config: &Configuration,
        transfer: BusTransfer,
    ) -> Result<Measurement, OracleError> {
        if let Some(measurement) = self.memo.lookup(config, transfer) {
            self.hits += 1;
            return Ok(measurement.clone());
        }
        let measurement = self.inner.measure(config, transfer)?;
        self.journal.record(*config, transfer, measurement.clone());
        Ok(measurement)
    }

    fn begin_pass(&mut self, replay: bool) {
        self.memo = if replay {
            self.journal.clone()
        } else {
            Journal::new()
        };
        self.inner.begin_pass(replay);
    }
}
