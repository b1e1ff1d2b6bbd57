use std::ops::Range;

use anyhow::{bail, Context};

use crate::tree::{TopologyError, Tree};
use crate::Result;

/// Branch length values of one branch, one per partition slot.
pub type BranchLengths = Vec<f64>;

/// Column layout of a partitioned alignment.
///
/// Partitions are contiguous, non-overlapping and together cover every alignment column.
/// With `per_partition_blens` every partition owns its own branch length on every branch,
/// otherwise all partitions share a single value.
#[derive(Debug, Clone, PartialEq)]
pub struct Partitions {
    ranges: Vec<Range<usize>>,
    per_partition_blens: bool,
}

impl Partitions {
    /// One partition spanning the whole alignment.
    pub fn single(alignment_len: usize) -> Self {
        Self {
            ranges: vec![0..alignment_len],
            per_partition_blens: false,
        }
    }

    pub fn from_ranges(
        ranges: Vec<Range<usize>>,
        alignment_len: usize,
        per_partition_blens: bool,
    ) -> Result<Self> {
        if ranges.is_empty() {
            bail!("At least one partition is required");
        }
        let mut expected_start = 0;
        for (k, range) in ranges.iter().enumerate() {
            if range.is_empty() {
                bail!("Partition {} is empty", k + 1);
            }
            if range.start != expected_start {
                bail!(
                    "Partition {} starts at column {}, expected {}",
                    k + 1,
                    range.start + 1,
                    expected_start + 1
                );
            }
            expected_start = range.end;
        }
        if expected_start != alignment_len {
            bail!(
                "Partitions cover {} columns but the alignment has {}",
                expected_start,
                alignment_len
            );
        }
        Ok(Self {
            ranges,
            per_partition_blens,
        })
    }

    pub fn count(&self) -> usize {
        self.ranges.len()
    }

    pub fn per_partition_blens(&self) -> bool {
        self.per_partition_blens
    }

    /// Length of every branch length vector on a tree using these partitions.
    pub fn num_branches(&self) -> usize {
        if self.per_partition_blens {
            self.ranges.len()
        } else {
            1
        }
    }

    /// Slot of the branch length vector used by partition `k`.
    pub fn blen_index(&self, k: usize) -> usize {
        if self.per_partition_blens {
            k
        } else {
            0
        }
    }

    pub fn range(&self, k: usize) -> &Range<usize> {
        &self.ranges[k]
    }

    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn alignment_len(&self) -> usize {
        self.ranges.last().map_or(0, |r| r.end)
    }

    /// Fails if the branch length vectors of `tree` do not match the partitioning.
    pub fn check_tree(&self, tree: &Tree) -> Result<()> {
        if tree.num_branches() != self.num_branches() {
            bail!(TopologyError::PartitionMismatch {
                expected: self.num_branches(),
                found: tree.num_branches(),
            });
        }
        Ok(())
    }
}

/// Parses a 1-based inclusive column range such as `1-300` into a 0-based half-open range.
pub fn parse_range(range: &str) -> Result<Range<usize>> {
    let Some((start, end)) = range.split_once('-') else {
        bail!("Malformed partition range '{}', expected start-end", range);
    };
    let start: usize = start
        .trim()
        .parse()
        .with_context(|| format!("Malformed partition start in '{}'", range))?;
    let end: usize = end
        .trim()
        .parse()
        .with_context(|| format!("Malformed partition end in '{}'", range))?;
    if start == 0 || end < start {
        bail!("Invalid partition range '{}'", range);
    }
    Ok(start - 1..end)
}

#[cfg(test)]
mod partitions_tests;
