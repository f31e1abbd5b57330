use rand::Rng;

use crate::{interval::ChromSizes, Result};

use super::Position;

/// Tiles every chromosome with positions `step` bases apart
///
/// Positions run from `flank` up to `chrom_len - flank` (inclusive). With
/// `num_positions` only the first positions of each chromosome are kept.
/// Chromosomes shorter than `2 * flank` contribute nothing.
pub fn sequential_positions(
    sizes: &ChromSizes,
    flank: u64,
    step: u64,
    num_positions: Option<usize>,
) -> Result<Vec<Position>> {
    if step == 0 {
        return Err(crate::error::ConfigError::ZeroStep.into());
    }
    let mut positions = Vec::new();
    for (chrom, len) in sizes.iter() {
        if len < 2 * flank {
            log::debug!("Chromosome {chrom} ({len} bp) is too short to be tiled");
            continue;
        }
        let limit = num_positions.unwrap_or(usize::MAX);
        positions.extend(
            (flank..=len - flank)
                .step_by(step as usize)
                .take(limit)
                .map(|pos| Position {
                    chrom: chrom.clone(),
                    pos,
                    weight: 1.0,
                }),
        );
    }
    Ok(positions)
}

/// Draws `num_positions` uniform positions per chromosome
///
/// Positions are drawn from `[flank, chrom_len - flank]` and sorted within each
/// chromosome. Chromosomes shorter than `2 * flank` contribute nothing.
pub fn random_positions<R: Rng>(
    sizes: &ChromSizes,
    flank: u64,
    num_positions: usize,
    rng: &mut R,
) -> Vec<Position> {
    let mut positions = Vec::with_capacity(num_positions * sizes.len());
    for (chrom, len) in sizes.iter() {
        if len < 2 * flank {
            log::debug!("Chromosome {chrom} ({len} bp) is too short to be sampled");
            continue;
        }
        let mut drawn: Vec<u64> = (0..num_positions)
            .map(|_| rng.random_range(flank..=len - flank))
            .collect();
        drawn.sort_unstable();
        positions.extend(drawn.into_iter().map(|pos| Position {
            chrom: chrom.clone(),
            pos,
            weight: 1.0,
        }));
    }
    positions
}

#[cfg(test)]
mod testing {
    use super::*;
    use anyhow::Result;
    use rand::{rngs::SmallRng, SeedableRng};

    fn sizes() -> ChromSizes {
        let mut sizes = ChromSizes::new();
        sizes.insert("chr1", 100);
        sizes.insert("chr2", 30);
        sizes.insert("chrM", 10);
        sizes
    }

    #[test]
    fn test_sequential() -> Result<()> {
        let positions = sequential_positions(&sizes(), 10, 20, None)?;
        let got: Vec<_> = positions
            .iter()
            .map(|p| (p.chrom.to_string(), p.pos))
            .collect();
        assert_eq!(
            got,
            vec![
                ("chr1".to_string(), 10),
                ("chr1".to_string(), 30),
                ("chr1".to_string(), 50),
                ("chr1".to_string(), 70),
                ("chr1".to_string(), 90),
                ("chr2".to_string(), 10),
            ]
        );
        let limited = sequential_positions(&sizes(), 10, 20, Some(2))?;
        assert_eq!(limited.len(), 3);
        assert!(sequential_positions(&sizes(), 10, 0, None).is_err());
        Ok(())
    }

    #[test]
    fn test_random_within_flank() {
        let mut rng = SmallRng::seed_from_u64(3);
        let positions = random_positions(&sizes(), 10, 50, &mut rng);
        // chrM is too short
        assert_eq!(positions.len(), 100);
        for p in &positions {
            let len = sizes().get(&p.chrom).unwrap_or(0);
            assert!(p.pos >= 10 && p.pos <= len - 10);
        }
    }
}
