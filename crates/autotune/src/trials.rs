//! Benchmark loop and per-candidate trial aggregation.

use crate::oracle::{BusTransfer, Measurement, MeasurementOracle};
use crate::prune::{prune, rank};
use crate::space::CandidatePool;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Running statistics of one candidate within one pool.
///
/// Once `ok` is cleared the record is frozen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub ok: bool,
    pub mean_ms: f64,
    /// Sum of squared deviations (Welford).
    m2: f64,
    pub count: usize,
    pub gflops: f64,
    pub detail: Vec<usize>,
}

impl Default for TrialRecord {
    fn default() -> Self {
        Self {
            ok: true,
            mean_ms: 0.0,
            m2: 0.0,
            count: 0,
            gflops: 0.0,
            detail: Vec::new(),
        }
    }
}

impl TrialRecord {
    /// Sample variance of the observed times; zero below two samples.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn observe(&mut self, measurement: &Measurement) {
        self.count += 1;
        let delta = measurement.elapsed_ms - self.mean_ms;
        self.mean_ms += delta / self.count as f64;
        self.m2 += delta * (measurement.elapsed_ms - self.mean_ms);
        self.gflops = measurement.gflops;
        self.detail.clone_from(&measurement.detail);
    }
}

/// Final statistics of a benchmark run, indexed like its pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialReport {
    /// Measured rounds, not counting the warm-up.
    pub rounds: usize,
    pub records: Vec<TrialRecord>,
}

impl TrialReport {
    pub fn good_count(&self) -> usize {
        self.records.iter().filter(|record| record.ok).count()
    }

    pub fn ok_flags(&self) -> Vec<bool> {
        self.records.iter().map(|record| record.ok).collect()
    }

    pub fn mean_times(&self) -> Vec<f64> {
        self.records.iter().map(|record| record.mean_ms).collect()
    }

    /// Index of the fastest surviving candidate.
    pub fn best(&self) -> Option<usize> {
        rank(&self.records)
    }

    fn apply_ok_flags(&mut self, ok: &[bool]) {
        for (record, &flag) in self.records.iter_mut().zip(ok) {
            record.ok = flag;
        }
    }
}

/// Drives an oracle over a candidate pool for a number of rounds.
pub struct BenchmarkLoop<'o> {
    oracle: &'o mut dyn MeasurementOracle,
    transfer: BusTransfer,
    replay: bool,
}

impl<'o> BenchmarkLoop<'o> {
    pub fn new(oracle: &'o mut dyn MeasurementOracle, transfer: BusTransfer) -> Self {
        Self {
            oracle,
            transfer,
            replay: true,
        }
    }

    /// Measure every round on the device, even configurations an earlier
    /// pass already measured.
    pub fn fresh(mut self) -> Self {
        self.replay = false;
        self
    }

    /// Runs one warm-up round followed by `rounds` measured rounds (at least
    /// one). With `retention`, the pool is pruned to the top `retention`
    /// mean times after every measured round.
    pub fn run_trials(
        &mut self,
        pool: &CandidatePool,
        rounds: usize,
        retention: Option<usize>,
    ) -> TrialReport {
        let rounds = rounds.max(1);
        self.oracle.begin_pass(self.replay);
        let mut report = TrialReport {
            rounds,
            records: vec![TrialRecord::default(); pool.len()],
        };

        for round in 0..=rounds {
            let warm_up = round == 0;
            for (index, config) in pool.iter().enumerate() {
                let record = &mut report.records[index];
                if !record.ok {
                    continue;
                }
                match self.oracle.measure(config, self.transfer) {
                    Ok(measurement) if measurement.valid => {
                        if !warm_up {
                            record.observe(&measurement);
                        }
                    }
                    Ok(_) => {
                        debug!(index, shape = ?config.shape, round, "output check failed");
                        record.ok = false;
                    }
                    Err(err) => {
                        debug!(index, shape = ?config.shape, round, error = %err, "measurement failed");
                        record.ok = false;
                    }
                }
            }

            if warm_up {
                continue;
            }
            if let Some(retention) = retention {
                let mut ok = report.ok_flags();
                let pruned = prune(retention, &mut ok, &report.mean_times());
                if pruned > 0 {
                    debug!(round, retention, pruned, "pruned candidates");
                    report.apply_ok_flags(&ok);
                }
            }
        }

        for (index, (config, record)) in pool.iter().zip(&report.records).enumerate() {
            debug!(
                index,
                group_size = config.group_size(),
                block_height = config.block_height(),
                extra_param = config.extra_param(),
                ok = record.ok,
                mean_ms = record.mean_ms,
                variance = record.variance(),
                gflops = record.gflops,
                "trial record"
            );
        }
        info!(
            candidates = pool.len(),
            good = report.good_count(),
            rounds,
            best = ?report.best(),
            "benchmark loop finished"
        );
        report
    }
}
