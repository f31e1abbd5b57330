//! Sequence and profile encoding
//!
//! This module converts nucleotide windows into numeric arrays:
//! 1. One-hot encoding over the `A, C, G, T` alphabet (columns in that order)
//! 2. Reverse complement of sequences
//! 3. Reverse complement of signal profiles, swapping strand channel pairs when the
//!    profiles are stranded
//!
//! Both reverse complement transforms are involutions: applying them twice returns
//! the original input.

use ndarray::{s, Array3, ArrayView3, ArrayViewMut1, ArrayViewMut2, Axis, Zip};
use rand::Rng;

use crate::{error::EncodeError, Policy, Result};

/// Size of the nucleotide alphabet
pub const ALPHABET_SIZE: usize = 4;

/// Pads a sequence with `N` or truncates it to exactly `length` bases
#[must_use]
pub fn fix_sequence_length(sequence: &[u8], length: usize) -> Vec<u8> {
    let mut fixed = Vec::with_capacity(length);
    fixed.extend_from_slice(&sequence[..sequence.len().min(length)]);
    fixed.resize(length, b'N');
    fixed
}

/// One-hot encodes a single sequence into a `(len, 4)` view
///
/// The view is zeroed first. Positions beyond the sequence stay zero, extra bases
/// are ignored.
pub fn one_hot_into<R: Rng>(
    sequence: &[u8],
    mut out: ArrayViewMut2<f32>,
    policy: Policy,
    rng: &mut R,
) -> Result<()> {
    out.fill(0.0);
    for (pos, (&symbol, mut row)) in sequence.iter().zip(out.outer_iter_mut()).enumerate() {
        if let Some(col) = policy.column(symbol, pos, rng)? {
            row[col] = 1.0;
        }
    }
    Ok(())
}

/// One-hot encodes a list of DNA sequences
///
/// Sequences are padded with `N` or truncated to `seq_len` first, see
/// [`fix_sequence_length`]. Padding is encoded under `policy` like any other `N`.
///
/// # Returns
///
/// An array of shape `(sequences.len(), seq_len, 4)`
///
/// # Errors
///
/// Fails with [`EncodeError::EmptyInput`] on an empty list and with
/// [`EncodeError::InvalidNucleotide`] for invalid symbols under [`Policy::Strict`].
pub fn one_hot_encode<S, R>(
    sequences: &[S],
    seq_len: usize,
    policy: Policy,
    rng: &mut R,
) -> Result<Array3<f32>>
where
    S: AsRef<[u8]>,
    R: Rng,
{
    if sequences.is_empty() {
        return Err(EncodeError::EmptyInput.into());
    }
    let mut encoded = Array3::zeros((sequences.len(), seq_len, ALPHABET_SIZE));
    for (sequence, view) in sequences.iter().zip(encoded.outer_iter_mut()) {
        one_hot_into(
            &fix_sequence_length(sequence.as_ref(), seq_len),
            view,
            policy,
            rng,
        )?;
    }
    Ok(encoded)
}

/// Watson-Crick complement of a symbol, other symbols are returned unchanged
#[must_use]
pub fn complement(symbol: u8) -> u8 {
    match symbol {
        b'A' => b'T',
        b'T' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        b'a' => b't',
        b't' => b'a',
        b'c' => b'g',
        b'g' => b'c',
        other => other,
    }
}

/// Reverse complement of a single sequence, in place
pub fn reverse_complement_inplace(sequence: &mut [u8]) {
    sequence.reverse();
    sequence.iter_mut().for_each(|b| *b = complement(*b));
}

/// Reverse complement of a single sequence
#[must_use]
pub fn reverse_complement(sequence: &[u8]) -> Vec<u8> {
    sequence.iter().rev().map(|&b| complement(b)).collect()
}

/// Reverse complement of a list of DNA sequences of arbitrary lengths
#[must_use]
pub fn reverse_complement_of_sequences<S: AsRef<[u8]>>(sequences: &[S]) -> Vec<Vec<u8>> {
    if sequences.is_empty() {
        log::warn!("reverse complement requested for an empty set of sequences");
    }
    sequences
        .iter()
        .map(|s| reverse_complement(s.as_ref()))
        .collect()
}

fn swap_lanes(mut a: ArrayViewMut1<f32>, mut b: ArrayViewMut1<f32>) {
    Zip::from(&mut a)
        .and(&mut b)
        .for_each(|x, y| std::mem::swap(x, y));
}

/// Reverse complement of a single `(seq_len, channels)` profile, in place
///
/// The positions are mirrored and, if `stranded`, each `(+, -)` channel pair
/// (`0 & 1`, `2 & 3`, ...) is swapped.
pub fn reverse_complement_profile_inplace(
    mut profile: ArrayViewMut2<f32>,
    stranded: bool,
) -> Result<()> {
    let (len, channels) = profile.dim();
    if stranded && channels % 2 != 0 {
        return Err(EncodeError::OddStrandedChannels(channels).into());
    }
    for i in 0..len / 2 {
        let (head, tail) = profile.multi_slice_mut((s![i, ..], s![len - 1 - i, ..]));
        swap_lanes(head, tail);
    }
    if stranded {
        for c in (0..channels).step_by(2) {
            let (plus, minus) = profile.multi_slice_mut((s![.., c], s![.., c + 1]));
            swap_lanes(plus, minus);
        }
    }
    Ok(())
}

/// Swaps each `(+, -)` channel pair of a `channels`-long lane, in place
///
/// This is the reverse complement of per-channel scalars such as log-counts.
pub fn swap_strand_pairs(mut values: ArrayViewMut1<f32>) -> Result<()> {
    let channels = values.len();
    if channels % 2 != 0 {
        return Err(EncodeError::OddStrandedChannels(channels).into());
    }
    for c in (0..channels).step_by(2) {
        values.swap(c, c + 1);
    }
    Ok(())
}

/// Reverse complement of a batch of genomics assay signal profiles
///
/// # Arguments
///
/// * `profiles` - Array of shape `(examples, seq_len, assays)` when unstranded, or
///   `(examples, seq_len, assays * 2)` when stranded. Stranded channels occur in
///   `(+, -)` pairs on the last axis.
/// * `stranded` - Whether channel pairs should be swapped
///
/// # Errors
///
/// Fails with [`EncodeError::OddStrandedChannels`] if `stranded` is set and the
/// channel count is odd.
pub fn reverse_complement_of_profiles(
    profiles: ArrayView3<f32>,
    stranded: bool,
) -> Result<Array3<f32>> {
    let mut out = profiles.to_owned();
    for example in out.axis_iter_mut(Axis(0)) {
        reverse_complement_profile_inplace(example, stranded)?;
    }
    Ok(out)
}

#[cfg(test)]
mod testing {
    use super::*;
    use ndarray::{array, Array2};
    use rand::{rngs::SmallRng, SeedableRng};

    fn random_sequence(rng: &mut SmallRng, len: usize) -> Vec<u8> {
        (0..len).map(|_| b"ACGTNacgt"[rng.random_range(0..9)]).collect()
    }

    #[test]
    fn test_one_hot_encode() -> anyhow::Result<()> {
        let mut rng = SmallRng::seed_from_u64(0);
        let encoded = one_hot_encode(&["ACGTN", "TT"], 5, Policy::Lenient, &mut rng)?;
        assert_eq!(encoded.dim(), (2, 5, 4));
        assert_eq!(
            encoded.index_axis(Axis(0), 0),
            array![
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
                [0.0, 0.0, 0.0, 0.0],
            ]
        );
        // padded with N
        assert_eq!(encoded.slice(s![1, 2.., ..]).sum(), 0.0);
        assert_eq!(encoded.slice(s![1, ..2, 3]).sum(), 2.0);
        Ok(())
    }

    #[test]
    fn test_one_hot_truncates() -> anyhow::Result<()> {
        let mut rng = SmallRng::seed_from_u64(0);
        let encoded = one_hot_encode(&["ACGTACGT"], 3, Policy::Lenient, &mut rng)?;
        assert_eq!(encoded.dim(), (1, 3, 4));
        assert_eq!(encoded.sum(), 3.0);
        Ok(())
    }

    #[test]
    fn test_one_hot_strict() {
        let mut rng = SmallRng::seed_from_u64(0);
        let empty: [&str; 0] = [];
        assert!(one_hot_encode(&["AC-T"], 4, Policy::Strict, &mut rng).is_err());
        assert!(one_hot_encode(&["ACNT"], 4, Policy::Strict, &mut rng).is_ok());
        assert!(one_hot_encode(&empty, 4, Policy::Lenient, &mut rng).is_err());
    }

    #[test]
    fn test_padding_follows_policy() -> anyhow::Result<()> {
        let mut rng = SmallRng::seed_from_u64(0);
        let lenient = one_hot_encode(&["AC"], 5, Policy::Lenient, &mut rng)?;
        assert_eq!(lenient.sum(), 2.0);
        assert_eq!(lenient.slice(s![0, 2.., ..]).sum(), 0.0);

        let set_to_a = one_hot_encode(&["AC"], 5, Policy::SetToA, &mut rng)?;
        assert_eq!(set_to_a.slice(s![0, 2.., 0]).to_vec(), vec![1.0; 3]);

        let random = one_hot_encode(&["AC"], 5, Policy::RandomDraw, &mut rng)?;
        for row in random.index_axis(Axis(0), 0).outer_iter() {
            assert_eq!(row.sum(), 1.0);
        }

        // padding is an ambiguity code, not an invalid symbol
        assert!(one_hot_encode(&["AC"], 5, Policy::Strict, &mut rng).is_ok());
        Ok(())
    }

    #[test]
    fn test_fix_sequence_length() {
        assert_eq!(fix_sequence_length(b"ACG", 5), b"ACGNN");
        assert_eq!(fix_sequence_length(b"ACGTA", 2), b"AC");
        assert_eq!(fix_sequence_length(b"AC", 2), b"AC");
    }

    #[test]
    fn test_reverse_complement() {
        let rc = reverse_complement_of_sequences(&["AACGTN", "acgT"]);
        assert_eq!(rc, vec![b"NACGTT".to_vec(), b"Acgt".to_vec()]);

        let mut seq = b"GATTACA".to_vec();
        reverse_complement_inplace(&mut seq);
        assert_eq!(seq, b"TGTAATC");
    }

    #[test]
    fn test_reverse_complement_is_involution() {
        let mut rng = SmallRng::seed_from_u64(42);
        let sequences: Vec<Vec<u8>> = (0..50)
            .map(|i| random_sequence(&mut rng, i * 3 + 1))
            .collect();
        let twice = reverse_complement_of_sequences(&reverse_complement_of_sequences(&sequences));
        assert_eq!(twice, sequences);
    }

    #[test]
    fn test_reverse_complement_of_stranded_profiles() -> anyhow::Result<()> {
        // one example, 3 positions, one stranded assay (+, -)
        let profiles = array![[[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]]];
        let rc = reverse_complement_of_profiles(profiles.view(), true)?;
        assert_eq!(rc, array![[[30.0, 3.0], [20.0, 2.0], [10.0, 1.0]]]);

        let rc = reverse_complement_of_profiles(profiles.view(), false)?;
        assert_eq!(rc, array![[[3.0, 30.0], [2.0, 20.0], [1.0, 10.0]]]);
        Ok(())
    }

    #[test]
    fn test_profiles_involution() -> anyhow::Result<()> {
        let mut rng = SmallRng::seed_from_u64(7);
        let profiles = Array3::from_shape_fn((4, 11, 6), |_| rng.random::<f32>());
        for stranded in [true, false] {
            let once = reverse_complement_of_profiles(profiles.view(), stranded)?;
            assert_ne!(once, profiles);
            let twice = reverse_complement_of_profiles(once.view(), stranded)?;
            assert_eq!(twice, profiles);
        }
        Ok(())
    }

    #[test]
    fn test_odd_stranded_channels() {
        let profiles = Array3::<f32>::zeros((1, 4, 3));
        assert!(reverse_complement_of_profiles(profiles.view(), true).is_err());
        assert!(reverse_complement_of_profiles(profiles.view(), false).is_ok());
    }

    #[test]
    fn test_one_hot_rev_comp_commutes() -> anyhow::Result<()> {
        // reverse complementing the sequence equals flipping both axes of its one-hot
        let mut rng = SmallRng::seed_from_u64(1);
        let seq = b"AACGTTGCA";
        let forward = one_hot_encode(&[seq], 9, Policy::Lenient, &mut rng)?;
        let reverse = one_hot_encode(&[reverse_complement(seq)], 9, Policy::Lenient, &mut rng)?;
        let flipped: Array2<f32> = forward.slice(s![0, ..;-1, ..;-1]).to_owned();
        assert_eq!(flipped, reverse.index_axis(Axis(0), 0));

        let mut lanes = array![1.0_f32, 2.0, 3.0, 4.0];
        swap_strand_pairs(lanes.view_mut())?;
        assert_eq!(lanes, array![2.0, 1.0, 4.0, 3.0]);
        Ok(())
    }
}
