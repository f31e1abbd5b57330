use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{error::EncodeError, Result};

/// Default seed for the random number generators
pub const RNG_SEED: u64 = 42;

/// Policy for handling non-ACGT symbols during one-hot encoding
///
/// IUPAC ambiguity codes (`N`, `R`, `Y`, ...) are valid nucleotides that carry no
/// single base. Under `Lenient` and `Strict` they encode as an all-zero row; the
/// other policies substitute a concrete base for every non-ACGT symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Any unrecognized symbol encodes as an all-zero row
    #[default]
    Lenient,
    /// Symbols outside of the IUPAC nucleotide alphabet are an error
    Strict,
    /// Non-ACGT symbols are replaced by a uniformly drawn base
    RandomDraw,
    SetToA,
    SetToC,
    SetToG,
    SetToT,
}
impl Policy {
    /// Resolves the one-hot column of a symbol at `pos`
    ///
    /// Returns `Ok(None)` for symbols that encode as an all-zero row.
    ///
    /// # Arguments
    /// * `symbol` - The nucleotide symbol
    /// * `pos` - Position of the symbol in its sequence (for error reporting)
    /// * `rng` - The random number generator used by [`Policy::RandomDraw`]
    pub fn column<R: Rng>(&self, symbol: u8, pos: usize, rng: &mut R) -> Result<Option<usize>> {
        if let Some(col) = base_column(symbol) {
            return Ok(Some(col));
        }
        match self {
            Self::Lenient => Ok(None),
            Self::Strict => {
                if is_ambiguity_code(symbol) {
                    Ok(None)
                } else {
                    Err(EncodeError::InvalidNucleotide {
                        symbol: symbol as char,
                        pos,
                    }
                    .into())
                }
            }
            Self::RandomDraw => Ok(Some(rng.random_range(0..4))),
            Self::SetToA => Ok(Some(0)),
            Self::SetToC => Ok(Some(1)),
            Self::SetToG => Ok(Some(2)),
            Self::SetToT => Ok(Some(3)),
        }
    }
}

/// One-hot column of a base in the `A, C, G, T` alphabet
#[must_use]
pub fn base_column(symbol: u8) -> Option<usize> {
    match symbol {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

fn is_ambiguity_code(symbol: u8) -> bool {
    matches!(
        symbol.to_ascii_uppercase(),
        b'N' | b'R' | b'Y' | b'S' | b'W' | b'K' | b'M' | b'B' | b'D' | b'H' | b'V'
    )
}
