use assert_matches::assert_matches;
use rstest::rstest;

use crate::partitions::{parse_range, Partitions};
use crate::tree::TopologyError;
use crate::tree;

#[test]
fn single_partition_shares_lengths() {
    let partitions = Partitions::single(120);
    assert_eq!(partitions.count(), 1);
    assert_eq!(partitions.num_branches(), 1);
    assert_eq!(partitions.blen_index(0), 0);
    assert_eq!(partitions.range(0), &(0..120));
    assert_eq!(partitions.alignment_len(), 120);
    assert!(!partitions.per_partition_blens());
}

#[rstest]
#[case::shared(false, 1, [0, 0, 0])]
#[case::per_partition(true, 3, [0, 1, 2])]
fn branch_slots(#[case] per_partition: bool, #[case] slots: usize, #[case] idx: [usize; 3]) {
    let partitions = Partitions::from_ranges(vec![0..10, 10..25, 25..30], 30, per_partition).unwrap();
    assert_eq!(partitions.count(), 3);
    assert_eq!(partitions.num_branches(), slots);
    for (k, expected) in idx.iter().enumerate() {
        assert_eq!(partitions.blen_index(k), *expected);
    }
}

#[rstest]
#[case::gap(vec![0..10, 12..30])]
#[case::overlap(vec![0..10, 8..30])]
#[case::short(vec![0..10, 10..20])]
#[case::empty_partition(vec![0..10, 10..10, 10..30])]
#[case::nothing(vec![])]
fn invalid_ranges(#[case] ranges: Vec<std::ops::Range<usize>>) {
    assert!(Partitions::from_ranges(ranges, 30, false).is_err());
}

#[rstest]
#[case("1-100", 0..100)]
#[case("101-250", 100..250)]
#[case(" 5 - 5 ", 4..5)]
fn parse_valid_range(#[case] input: &str, #[case] expected: std::ops::Range<usize>) {
    assert_eq!(parse_range(input).unwrap(), expected);
}

#[rstest]
#[case("100")]
#[case("0-10")]
#[case("10-5")]
#[case("a-b")]
fn parse_invalid_range(#[case] input: &str) {
    assert!(parse_range(input).is_err());
}

#[test]
fn tree_partition_mismatch() {
    let mut tree = tree!("((A,B),C,(D,E));");
    let partitions = Partitions::from_ranges(vec![0..5, 5..9], 9, true).unwrap();
    let err = partitions.check_tree(&tree).unwrap_err();
    assert_matches!(
        err.downcast_ref::<TopologyError>(),
        Some(TopologyError::PartitionMismatch {
            expected: 2,
            found: 1
        })
    );
    tree.resize_branch_lengths(partitions.num_branches()).unwrap();
    assert!(partitions.check_tree(&tree).is_ok());
}
