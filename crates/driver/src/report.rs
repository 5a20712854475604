//! Plain-text rendering of a tuning outcome.

use gemvtune_autotune::trials::TrialReport;
use gemvtune_autotune::tuner::TuningOutcome;
use std::fmt::Write;

pub fn render_report(outcome: &TuningOutcome) -> String {
    let mut out = String::new();
    let report = &outcome.report;
    let _ = writeln!(
        out,
        "mode={:?} candidates={} good={} rounds={} iterations={}",
        outcome.mode,
        outcome.pool.len(),
        report.good_count(),
        report.rounds,
        outcome.iterations
    );

    for (index, (config, record)) in outcome.pool.iter().zip(&report.records).enumerate() {
        let _ = writeln!(
            out,
            "[{index}] g={} bh={} xp={} ok={} mean_ms={:.6} variance={:.3e} count={} gflops={:.3} detail={:?}",
            config.group_size(),
            config.block_height(),
            config.extra_param(),
            record.ok,
            record.mean_ms,
            record.variance(),
            record.count,
            record.gflops,
            record.detail
        );
    }

    match (outcome.best, outcome.best_config()) {
        (Some(best), Some(config)) => {
            let _ = writeln!(
                out,
                "best [{}] g={} bh={} xp={} m={} n={} transpose={}",
                best.index,
                config.group_size(),
                config.block_height(),
                config.extra_param(),
                config.problem.m,
                config.problem.n,
                config.problem.transpose
            );
        }
        _ => {
            let _ = writeln!(out, "no good kernels found");
        }
    }

    if let Some(confirmation) = &outcome.confirmation {
        render_confirmation(&mut out, confirmation);
    }
    out
}

fn render_confirmation(out: &mut String, confirmation: &TrialReport) {
    match confirmation.records.first() {
        Some(record) if record.ok => {
            let _ = writeln!(
                out,
                "confirmed over {} trials: mean_ms={:.6} std_dev_ms={:.6} gflops={:.3}",
                record.count,
                record.mean_ms,
                record.std_dev(),
                record.gflops
            );
        }
        _ => {
            let _ = writeln!(out, "confirmation trials failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemvtune_autotune::oracle::Measurement;
    use gemvtune_autotune::search::BestRecord;
    use gemvtune_autotune::space::CandidatePool;
    use gemvtune_autotune::trials::TrialRecord;
    use gemvtune_autotune::tuner::SearchMode;
    use gemvtune_kernels::config::{Configuration, MatvecProblem, Shape};

    fn record(elapsed_ms: f64) -> TrialRecord {
        let mut record = TrialRecord::default();
        record.observe(&Measurement {
            elapsed_ms,
            gflops: 2.0,
            valid: true,
            detail: vec![4, 16, 16, 1],
        });
        record
    }

    #[test]
    fn renders_every_candidate_and_winner() {
        let problem = MatvecProblem::new(64, 64);
        let pool: CandidatePool = [Shape::new(4, 4, 0), Shape::new(4, 4, 1)]
            .into_iter()
            .map(|shape| Configuration { problem, shape })
            .collect();
        let mut slow = record(3.0);
        slow.ok = false;
        let outcome = TuningOutcome {
            mode: SearchMode::Exhaustive,
            best: Some(BestRecord {
                shape: Shape::new(4, 4, 1),
                index: 1,
            }),
            pool,
            report: TrialReport {
                rounds: 1,
                records: vec![slow, record(1.0)],
            },
            iterations: 0,
            confirmation: None,
        };

        let text = render_report(&outcome);
        assert!(text.contains("candidates=2 good=1"));
        assert!(text.contains("[0] g=4 bh=4 xp=0 ok=false"));
        assert!(text.contains("best [1] g=4 bh=4 xp=1"));
    }

    #[test]
    fn reports_missing_winner() {
        let outcome = TuningOutcome {
            mode: SearchMode::Exhaustive,
            best: None,
            pool: CandidatePool::default(),
            report: TrialReport::default(),
            iterations: 0,
            confirmation: None,
        };
        assert!(render_report(&outcome).contains("no good kernels found"));
    }
}
