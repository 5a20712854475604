//! Top-N pruning and ranking over trial records.

use crate::trials::TrialRecord;

/// Keeps the candidates whose time is within the `retention` smallest
/// distinct times among those still ok; the rest are marked not ok.
///
/// Candidates sharing the boundary time are all kept, so more than
/// `retention` may survive. Returns how many were demoted. A retention of
/// zero prunes nothing.
pub fn prune(retention: usize, ok: &mut [bool], times: &[f64]) -> usize {
    if retention == 0 {
        return 0;
    }

    let mut distinct: Vec<f64> = ok
        .iter()
        .zip(times)
        .filter(|(ok, _)| **ok)
        .map(|(_, &time)| time)
        .collect();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();

    let Some(&boundary) = distinct.get(retention - 1) else {
        return 0;
    };

    let mut demoted = 0;
    for (flag, &time) in ok.iter_mut().zip(times) {
        if *flag && time > boundary {
            *flag = false;
            demoted += 1;
        }
    }
    demoted
}

/// Index of the smallest mean time among ok candidates with at least one
/// measured observation. Ties go to the earliest index.
pub fn rank(records: &[TrialRecord]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, record) in records.iter().enumerate() {
        if !record.ok || record.count == 0 {
            continue;
        }
        match best {
            Some((_, best_time)) if record.mean_ms >= best_time => {}
            _ => best = Some((index, record.mean_ms)),
        }
    }
    best.map(|(index, _)| index)
}
