//! # fasta
//!
//! Random access to a reference genome.
//!
//! The reference is memory-mapped and bases are located through a samtools-compatible
//! `.fai` index, read or built with `noodles-fasta`. Only plain-text (uncompressed)
//! FASTA can be mapped.
//!
//! ## `.fai` format
//!
//! | Column | Name       | Description                                  |
//! | ------ | ---------- | -------------------------------------------- |
//! | 1      | name       | Record name                                  |
//! | 2      | length     | Number of bases                              |
//! | 3      | offset     | Byte offset of the first base                |
//! | 4      | line_bases | Bases per line                               |
//! | 5      | line_width | Bytes per line (including the terminator)    |

mod index;
mod reader;

pub use index::{FaiEntry, FastaIndex};
pub use reader::{fai_path, ReferenceGenome};
