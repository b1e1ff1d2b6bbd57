use lazy_static::lazy_static;

use crate::frequencies;
use crate::substitution_models::FreqVector;

pub static NUCLEOTIDES: &[u8] = b"TCAG";
pub static AMB_NUCLEOTIDES: &[u8] = b"RYSWKMBDHVNX?";
pub static GAP: u8 = b'-';
pub static POSSIBLE_GAPS: &[u8] = b"-.";

/// DNA alphabet in T, C, A, G order. Ambiguity codes map to the uniform set of the
/// nucleotides they stand for, gaps and unknown characters count as missing data.
#[derive(Debug, PartialEq)]
pub struct Alphabet {
    symbols: &'static [u8],
    ambiguous: &'static [u8],
    char_sets: &'static [FreqVector],
    index: &'static [usize; 256],
}

impl Alphabet {
    pub fn is_word(&self, word: &[u8]) -> bool {
        word.iter().all(|c| {
            let c = c.to_ascii_uppercase();
            self.symbols.contains(&c) || self.ambiguous.contains(&c) || POSSIBLE_GAPS.contains(&c)
        })
    }

    pub fn symbols(&self) -> &[u8] {
        self.symbols
    }

    pub fn ambiguous(&self) -> &[u8] {
        self.ambiguous
    }

    pub fn size(&self) -> usize {
        self.symbols.len()
    }

    /// Indicator vector of the states allowed by `char`.
    pub fn char_encoding(&self, char: u8) -> &FreqVector {
        &self.char_sets[char as usize]
    }

    pub fn index(&self, char: &u8) -> usize {
        self.index[*char as usize]
    }
}

pub fn dna_alphabet() -> Alphabet {
    Alphabet {
        symbols: NUCLEOTIDES,
        ambiguous: AMB_NUCLEOTIDES,
        char_sets: &DNA_SETS,
        index: &NUCLEOTIDE_INDEX,
    }
}

lazy_static! {
    pub static ref NUCLEOTIDE_INDEX: [usize; 256] = {
        let mut index = [0; 256];
        for (i, char) in NUCLEOTIDES.iter().enumerate() {
            index[*char as usize] = i;
            index[char.to_ascii_lowercase() as usize] = i;
        }
        index
    };
    pub static ref DNA_SETS: Vec<FreqVector> = (0..=255u8).map(dna_set).collect();
}

fn dna_set(char: u8) -> FreqVector {
    match char.to_ascii_uppercase() {
        b'T' | b'U' => frequencies!(&[1.0, 0.0, 0.0, 0.0]),
        b'C' => frequencies!(&[0.0, 1.0, 0.0, 0.0]),
        b'A' => frequencies!(&[0.0, 0.0, 1.0, 0.0]),
        b'G' => frequencies!(&[0.0, 0.0, 0.0, 1.0]),
        b'M' => frequencies!(&[0.0, 1.0, 1.0, 0.0]),
        b'R' => frequencies!(&[0.0, 0.0, 1.0, 1.0]),
        b'W' => frequencies!(&[1.0, 0.0, 1.0, 0.0]),
        b'S' => frequencies!(&[0.0, 1.0, 0.0, 1.0]),
        b'Y' => frequencies!(&[1.0, 1.0, 0.0, 0.0]),
        b'K' => frequencies!(&[1.0, 0.0, 0.0, 1.0]),
        b'V' => frequencies!(&[0.0, 1.0, 1.0, 1.0]),
        b'D' => frequencies!(&[1.0, 0.0, 1.0, 1.0]),
        b'B' => frequencies!(&[1.0, 1.0, 0.0, 1.0]),
        b'H' => frequencies!(&[1.0, 1.0, 1.0, 0.0]),
        _ => frequencies!(&[1.0; 4]),
    }
}
