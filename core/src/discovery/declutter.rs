//! Geographic de-clustering of ranked candidates by distance bins.

use crate::records::CandidateStation;
use std::collections::HashSet;

/// Pools larger than this shrink the working subset from 5× to 3× the target.
pub const LARGE_POOL: usize = 1000;

/// Selects up to `2 × target` stations spread across the distance range.
///
/// `ranked` must be in priority order. The best `5 × target` (or `3 × target`
/// for large pools) unique stations are split into `2 × target` equal-width
/// distance bins; each bin contributes its best-tier station nearest the bin
/// centre, and leftovers backfill by ascending distance. The result is sorted
/// by distance.
pub fn decluster(ranked: Vec<CandidateStation>, target: usize) -> Vec<CandidateStation> {
    if target == 0 || ranked.is_empty() {
        return Vec::new();
    }
    let multiplier = if ranked.len() > LARGE_POOL { 3 } else { 5 };
    let working_size = target.saturating_mul(multiplier);
    let bin_count = target.saturating_mul(2);

    let mut seen = HashSet::new();
    let mut working: Vec<CandidateStation> = ranked
        .into_iter()
        .filter(|c| seen.insert(c.id()))
        .take(working_size)
        .collect();
    working.sort_by(|a, b| a.distance_km().total_cmp(&b.distance_km()));

    if working.len() <= bin_count {
        return working;
    }

    let min_d = working[0].distance_km();
    let max_d = working[working.len() - 1].distance_km();
    let width = (max_d - min_d) / bin_count as f64;

    let mut chosen = vec![false; working.len()];
    if width > 0.0 {
        for bin in 0..bin_count {
            let lo = min_d + bin as f64 * width;
            let hi = lo + width;
            let centre = lo + width / 2.0;
            let last = bin + 1 == bin_count;
            let best = working
                .iter()
                .enumerate()
                .filter(|(_, c)| {
                    let d = c.distance_km();
                    d >= lo && (d < hi || (last && d <= max_d))
                })
                .min_by(|(_, a), (_, b)| {
                    a.priority()
                        .network_tier
                        .cmp(&b.priority().network_tier)
                        .then(a.channel_tier().cmp(&b.channel_tier()))
                        .then(
                            (a.distance_km() - centre)
                                .abs()
                                .total_cmp(&(b.distance_km() - centre).abs()),
                        )
                })
                .map(|(index, _)| index);
            if let Some(index) = best {
                chosen[index] = true;
            }
        }
    }

    // backfill, nearest first
    let mut remaining = bin_count - chosen.iter().filter(|c| **c).count();
    for flag in chosen.iter_mut() {
        if remaining == 0 {
            break;
        }
        if !*flag {
            *flag = true;
            remaining -= 1;
        }
    }

    working
        .into_iter()
        .zip(chosen)
        .filter_map(|(candidate, keep)| keep.then_some(candidate))
        .collect()
}

/// `count` indices spread evenly over `0..len`, first and last included.
pub fn spread_indices(len: usize, count: usize) -> Vec<usize> {
    if count >= len {
        return (0..len).collect();
    }
    match count {
        0 => Vec::new(),
        1 => vec![0],
        _ => (0..count)
            .map(|i| {
                let position = i as f64 * (len - 1) as f64 / (count - 1) as f64;
                position.round() as usize
            })
            .collect(),
    }
}
