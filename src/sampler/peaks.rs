use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    interval::{ChromSizes, PeakRecord},
    Result,
};

use super::Position;

/// Derives summit positions from one or more peak sets
///
/// # Arguments
///
/// * `peak_sets` - Peaks of every task, in task order
/// * `sizes` - The selected chromosomes; peaks on other chromosomes are skipped
/// * `flank` - Bases required on either side of a summit
/// * `drop_duplicates` - Whether to drop exact (chrom, pos) duplicates across tasks
///
/// # Returns
///
/// Positions of each peak set sorted by (chromosome, position), concatenated in
/// task order. A summit is kept if `[pos - flank, pos + flank]` lies within
/// `[0, chrom_len]`. The narrowPeak signal value is carried along as the sampling
/// weight.
pub fn peak_positions(
    peak_sets: &[Vec<PeakRecord>],
    sizes: &ChromSizes,
    flank: u64,
    drop_duplicates: bool,
) -> Result<Vec<Position>> {
    let mut positions = Vec::new();
    let mut n_unselected = 0;
    let mut n_out_of_bounds = 0;

    for peaks in peak_sets {
        let mut task_positions = Vec::with_capacity(peaks.len());
        for peak in peaks {
            let Some(chrom) = sizes.name(&peak.interval.chrom) else {
                n_unselected += 1;
                continue;
            };
            let chrom_len = sizes.require(&chrom)?;
            let pos = peak.summit_pos();
            if pos < flank || pos + flank > chrom_len {
                n_out_of_bounds += 1;
                continue;
            }
            task_positions.push(Position {
                chrom,
                pos,
                weight: peak.signal,
            });
        }
        task_positions.sort_by(|a, b| a.chrom.cmp(&b.chrom).then(a.pos.cmp(&b.pos)));
        positions.extend(task_positions);
    }

    if n_unselected > 0 {
        log::debug!("Skipped {n_unselected} peaks on unselected chromosomes");
    }
    if n_out_of_bounds > 0 {
        log::warn!(
            "Dropped {n_out_of_bounds} peaks closer than {flank} bp to a chromosome end"
        );
    }

    if drop_duplicates {
        let before = positions.len();
        let mut seen: HashSet<(Arc<str>, u64)> = HashSet::with_capacity(before);
        positions.retain(|p| seen.insert((p.chrom.clone(), p.pos)));
        if positions.len() < before {
            log::debug!("Dropped {} duplicate peak positions", before - positions.len());
        }
    }
    Ok(positions)
}
