use std::fmt;

use anyhow::bail;
use bio::io::fasta::Record;
use hashbrown::{HashMap, HashSet};
use nalgebra::DMatrix;

use crate::alphabets::{dna_alphabet, Alphabet};
use crate::io::DataError;
use crate::substitution_models::FreqVector;
use crate::tree::Tree;
use crate::Result;

/// A DNA multiple sequence alignment. All sequences have the same length.
#[derive(Debug, Clone)]
pub struct Alignment {
    seqs: Vec<Record>,
    index: HashMap<String, usize>,
    len: usize,
}

impl Alignment {
    /// Validates the records: at least one sequence, unique ids, equal lengths and
    /// only DNA characters.
    pub fn new(seqs: Vec<Record>) -> Result<Self> {
        if seqs.is_empty() {
            bail!(DataError {
                message: String::from("No sequences provided")
            });
        }
        let alphabet = dna_alphabet();
        let len = seqs[0].seq().len();
        let mut index = HashMap::with_capacity(seqs.len());
        for (i, rec) in seqs.iter().enumerate() {
            if index.insert(rec.id().to_string(), i).is_some() {
                bail!(DataError {
                    message: format!("Duplicate sequence id {}", rec.id())
                });
            }
            if rec.seq().len() != len {
                bail!(DataError {
                    message: format!(
                        "Sequences are not aligned, {} has length {} instead of {}",
                        rec.id(),
                        rec.seq().len(),
                        len
                    )
                });
            }
            if !alphabet.is_word(rec.seq()) {
                bail!(DataError {
                    message: format!("Invalid DNA sequence encountered for {}", rec.id())
                });
            }
        }
        if len == 0 {
            bail!(DataError {
                message: String::from("Sequences are empty")
            });
        }
        Ok(Self { seqs, index, len })
    }

    /// Number of alignment columns.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn seq_count(&self) -> usize {
        self.seqs.len()
    }

    pub fn seqs(&self) -> &[Record] {
        &self.seqs
    }

    pub fn record(&self, id: &str) -> Option<&Record> {
        self.index.get(id).map(|&i| &self.seqs[i])
    }

    pub fn ids(&self) -> HashSet<String> {
        self.index.keys().cloned().collect()
    }

    /// State indicator matrices (4 x columns) for every leaf of `tree`, indexed by leaf position.
    pub fn leaf_encodings(&self, tree: &Tree) -> Result<Vec<DMatrix<f64>>> {
        let alphabet = dna_alphabet();
        tree.leaves()
            .iter()
            .map(|leaf| match self.record(&leaf.id) {
                Some(rec) => Ok(encode(&alphabet, rec.seq())),
                None => bail!(DataError {
                    message: format!("No sequence found for leaf {}", leaf.id)
                }),
            })
            .collect()
    }

    /// Empirical nucleotide frequencies, ambiguous characters contribute fractionally and
    /// missing data is ignored. Unobserved nucleotides get a pseudocount of one.
    pub fn freqs(&self) -> FreqVector {
        let alphabet = dna_alphabet();
        let mut freqs = FreqVector::zeros(alphabet.size());
        for c in self.seqs.iter().flat_map(|rec| rec.seq().iter()) {
            let set = alphabet.char_encoding(*c);
            let allowed = set.sum();
            if allowed < alphabet.size() as f64 {
                freqs += set.scale(1.0 / allowed);
            }
        }
        for f in freqs.iter_mut() {
            if *f == 0.0 {
                *f = 1.0;
            }
        }
        freqs.scale_mut(1.0 / freqs.sum());
        freqs
    }
}

fn encode(alphabet: &Alphabet, seq: &[u8]) -> DMatrix<f64> {
    let mut encoding = DMatrix::zeros(alphabet.size(), seq.len());
    for (col, c) in seq.iter().enumerate() {
        encoding.set_column(col, alphabet.char_encoding(*c));
    }
    encoding
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Alignment of {} sequences with {} columns",
            self.seqs.len(),
            self.len
        )
    }
}
