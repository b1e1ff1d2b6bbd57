use approx::assert_relative_eq;
use assert_matches::assert_matches;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rstest::rstest;

use crate::tree::tree_parser::{from_newick, ParsingError};
use crate::tree::{
    HalfEdge,
    NodeIdx::{Internal as I, Leaf as L},
    TopologyError, Tree, DEFAULT_BLEN, MIN_BLEN,
};

fn parse(newick: &str) -> Tree {
    from_newick(newick).unwrap().pop().unwrap()
}

#[test]
fn newick_unrooted_layout() {
    let tree = parse("((A:1.0,B:2.0)X:0.5,C:3.0,(D:4.0,E:5.0)Y:0.7)R;");
    assert_eq!(tree.leaf_count(), 5);
    assert_eq!(tree.len(), 8);
    assert_eq!(tree.leaf_ids(), ["A", "B", "C", "D", "E"]);
    assert_eq!(tree.idx("X").ok(), None);
    assert_eq!(tree.idx("D").unwrap(), L(3));
    assert_eq!(tree.node(&I(5)).id, "R");
    assert_eq!(tree.node(&I(6)).id, "X");
    assert_eq!(tree.node(&I(7)).id, "Y");
    assert_eq!(tree.neighbour(HalfEdge::new(L(0), 0)), I(6));
    assert_eq!(tree.blens(HalfEdge::new(L(4), 0)), &vec![5.0]);
    assert_eq!(tree.edges().len(), 7);
    assert_eq!(tree.num_branches(), 1);
}

#[test]
fn newick_rooted_tree_is_unrooted() {
    let tree = parse("((A:1.0,B:1.0):0.5,(C:1.0,D:1.0):0.25);");
    assert_eq!(tree.leaf_count(), 4);
    assert_eq!(tree.len(), 6);
    let cherry_ab = tree.neighbour(HalfEdge::new(L(0), 0));
    let cherry_cd = tree.neighbour(HalfEdge::new(L(2), 0));
    let joining = tree.half_edge(&cherry_ab, &cherry_cd).unwrap();
    assert_relative_eq!(tree.blens(joining)[0], 0.75);
    assert_relative_eq!(tree.total_length(), 4.75);
}

#[test]
fn newick_missing_and_nonpositive_lengths() {
    let tree = parse("(A,B:0.0,C:-1.5);");
    assert_eq!(tree.blens(HalfEdge::new(L(0), 0))[0], DEFAULT_BLEN);
    assert_eq!(tree.blens(HalfEdge::new(L(1), 0))[0], MIN_BLEN);
    assert_eq!(tree.blens(HalfEdge::new(L(2), 0))[0], MIN_BLEN);
}

#[test]
fn newick_multiple_trees() {
    let trees = from_newick(
        "((A:1.0,B:1.0):1.0,C:1.0,D:1.0);\n(A:1.0,(B:1.0,C:1.0):2.0,(D:1,E:1):1);",
    )
    .unwrap();
    assert_eq!(trees.len(), 2);
    assert_eq!(trees[0].leaf_count(), 4);
    assert_eq!(trees[1].leaf_count(), 5);
}

#[rstest]
#[case::garbage("((A:1.0,B:1.0);")]
#[case::lonely_semicolon(";")]
#[case::unnamed_leaves("(:1.0,:2.0,:1.0);")]
fn newick_garbage(#[case] newick: &str) {
    let err = from_newick(newick).unwrap_err();
    assert!(err.downcast_ref::<ParsingError>().is_some());
    assert!(err.to_string().contains("Malformed newick string"));
}

#[rstest]
#[case::multifurcation("((A,B,C),D,E);")]
#[case::trifurcating_root_with_unary("((A),B,C);")]
#[case::four_way_root("(A,B,C,D);")]
fn newick_non_binary(#[case] newick: &str) {
    let err = from_newick(newick).unwrap_err();
    assert_matches!(
        err.downcast_ref::<TopologyError>(),
        Some(TopologyError::NonBinary { .. })
    );
}

#[test]
fn newick_duplicate_leaf() {
    let err = from_newick("(A,B,(A,C));").unwrap_err();
    assert_matches!(
        err.downcast_ref::<TopologyError>(),
        Some(TopologyError::DuplicateLeaf(id)) if id == "A"
    );
}

#[rstest]
#[case("(A,B);")]
#[case("A;")]
fn newick_too_few_taxa(#[case] newick: &str) {
    let err = from_newick(newick).unwrap_err();
    assert_matches!(
        err.downcast_ref::<TopologyError>(),
        Some(TopologyError::TooFewTaxa(_))
    );
}

#[test]
fn next_cycles_through_slots() {
    let tree = parse("((A,B),C,(D,E));");
    for node in tree.internals() {
        let h = HalfEdge::new(node.idx, 0);
        let third = tree.next(tree.next(h));
        assert_ne!(third, h);
        assert_eq!(tree.next(third), h);
    }
    let leaf = HalfEdge::new(L(2), 0);
    assert_eq!(tree.next(leaf), leaf);
    for h in tree.edges() {
        assert_eq!(tree.back(tree.back(h)), h);
        assert!(tree.check_link(h));
    }
}

#[rstest]
#[case::quartet("((A,B),C,D);", 1)]
#[case::five("((A,B),C,(D,E));", 2)]
#[case::caterpillar("(A,B,(C,(D,(E,(F,G)))));", 4)]
#[case::balanced("(((A,B),(C,D)),(E,F),(G,H));", 5)]
fn internal_edges_count_and_order(#[case] newick: &str, #[case] expected: usize) {
    let tree = parse(newick);
    let edges = tree.internal_edges();
    assert_eq!(edges.len(), expected);
    assert_eq!(edges.len(), tree.leaf_count() - 3);
    for h in &edges {
        assert!(tree.is_internal_edge(*h));
    }
    let mut branches: Vec<_> = edges
        .iter()
        .map(|h| (*h).min(tree.back(*h)))
        .collect();
    branches.sort();
    branches.dedup();
    assert_eq!(branches.len(), expected);
    assert_eq!(tree.internal_edges(), edges);
}

#[test]
fn internal_edges_point_towards_start() {
    let tree = parse("(A,B,(C,(D,(E,(F,G)))));");
    let start_side = tree.back(tree.start_edge()).node;
    let edges = tree.internal_edges();
    assert_eq!(tree.neighbour(edges[0]), start_side);
    for pair in edges.windows(2) {
        assert_eq!(tree.neighbour(pair[1]), pair[0].node);
    }
}

#[test]
fn swap_subtrees_twice_is_identity() {
    let mut tree = parse("((A:1,B:2):3,C:4,(D:5,E:6):7);");
    let before = tree.snapshot();
    let p = tree.internal_edges()[0];
    let q = tree.back(p);
    let a = tree.next(p);
    let c = tree.next(q);
    let moved = tree.back(a).node;

    tree.swap_subtrees(a, c);
    assert_ne!(tree.snapshot(), before);
    assert_eq!(tree.neighbour(c), moved);
    tree.validate().unwrap();

    tree.swap_subtrees(a, c);
    assert_eq!(tree.snapshot(), before);
}

#[test]
fn swap_subtrees_keeps_lengths_with_subtrees() {
    let mut tree = parse("((A:1,B:2):3,C:4,(D:5,E:6):7);");
    let p = tree.internal_edges()[0];
    let q = tree.back(p);
    let a = tree.next(p);
    let c = tree.next(q);
    let a_blen = tree.blens(a)[0];
    let c_blen = tree.blens(c)[0];
    let a_node = tree.neighbour(a);
    let c_node = tree.neighbour(c);

    tree.swap_subtrees(a, c);
    assert_eq!(tree.neighbour(a), c_node);
    assert_eq!(tree.neighbour(c), a_node);
    assert_eq!(tree.blens(a)[0], c_blen);
    assert_eq!(tree.blens(c)[0], a_blen);
    assert_relative_eq!(tree.total_length(), 28.0);
}

#[test]
fn snapshot_restore_round_trip() {
    let mut tree = parse("((A:1,B:2):3,C:4,(D:5,E:6):7);");
    let snapshot = tree.snapshot();
    let revision = tree.revision();
    let h = tree.internal_edges()[1];
    tree.set_blens(h, &[0.123]);
    assert_eq!(tree.blens(tree.back(h)), &vec![0.123]);
    assert!(tree.revision() > revision);

    tree.restore(&snapshot).unwrap();
    assert_eq!(tree.snapshot(), snapshot);
    assert_eq!(tree.blens(h)[0], 7.0);
}

#[test]
fn restore_rejects_foreign_snapshot() {
    let mut tree = parse("((A,B),C,(D,E));");
    let other = parse("((A,B),C,D);");
    let err = tree.restore(&other.snapshot()).unwrap_err();
    assert_matches!(
        err.downcast_ref::<TopologyError>(),
        Some(TopologyError::SnapshotMismatch { .. })
    );
}

#[test]
fn splits_are_normalised() {
    let tree = parse("((A,B),C,(D,E));");
    let ab = tree.internal_edges()[0];
    let split = tree.split(ab);
    // {A, B} on one side, normalised to the side without A
    assert_eq!(split.ones().collect::<Vec<_>>(), vec![2, 3, 4]);
    let other_side = tree.split(tree.back(ab));
    assert_eq!(split, other_side);
    assert_eq!(tree.splits().len(), 2);
}

#[rstest]
#[case("((A,B),C,(D,E));", "((B,A),(E,D),C);", 0)]
#[case("((A,B),C,(D,E));", "((A,C),B,(D,E));", 2)]
#[case("((A,B),C,(D,E));", "((A,D),C,(B,E));", 4)]
fn robinson_foulds_distance(#[case] first: &str, #[case] second: &str, #[case] expected: usize) {
    let first = parse(first);
    let second = parse(second);
    assert_eq!(first.robinson_foulds(&second).unwrap(), expected);
    assert_eq!(second.robinson_foulds(&first).unwrap(), expected);
}

#[test]
fn robinson_foulds_different_leaves() {
    let first = parse("((A,B),C,(D,E));");
    let second = parse("((A,B),C,(D,F));");
    assert!(first.robinson_foulds(&second).is_err());
}

#[test]
fn newick_output_round_trip() {
    let tree = parse("(((A:0.1,B:0.2):0.3,C:0.4):0.5,D:0.6,(E:0.7,F:0.8):0.9);");
    let reparsed = parse(&tree.to_newick());
    assert_eq!(tree.robinson_foulds(&reparsed).unwrap(), 0);
    assert_relative_eq!(tree.total_length(), reparsed.total_length());
    assert_eq!(tree.to_string(), tree.to_newick());
    assert!(tree.to_newick().ends_with(';'));
}

#[rstest]
#[case(3)]
#[case(4)]
#[case(10)]
#[case(25)]
fn random_tree_is_valid(#[case] n: usize) {
    let ids: Vec<String> = (0..n).map(|i| format!("T{i}")).collect();
    let mut rng = StdRng::seed_from_u64(7);
    let tree = Tree::random(&ids, &mut rng).unwrap();
    tree.validate().unwrap();
    assert_eq!(tree.leaf_count(), n);
    assert_eq!(tree.len(), 2 * n - 2);
    assert_eq!(tree.internal_edges().len(), n - 3);
    assert_eq!(tree.leaf_ids(), ids);

    let again = Tree::random(&ids, &mut StdRng::seed_from_u64(7)).unwrap();
    assert_eq!(tree.robinson_foulds(&again).unwrap(), 0);
}

#[test]
fn random_tree_too_small() {
    let ids = vec!["A".to_string(), "B".to_string()];
    assert!(Tree::random(&ids, &mut StdRng::seed_from_u64(0)).is_err());
}

#[test]
fn resize_branch_lengths_broadcasts() {
    let mut tree = parse("((A:1,B:2):3,C:4,(D:5,E:6):7);");
    tree.resize_branch_lengths(3).unwrap();
    assert_eq!(tree.num_branches(), 3);
    assert_eq!(tree.blens(HalfEdge::new(L(1), 0)), &vec![2.0, 2.0, 2.0]);
    tree.validate().unwrap();

    let err = tree.resize_branch_lengths(2).unwrap_err();
    assert_matches!(
        err.downcast_ref::<TopologyError>(),
        Some(TopologyError::PartitionMismatch {
            expected: 2,
            found: 3
        })
    );
}
