use std::error::Error;
use std::fmt;

use anyhow::bail;
use log::{info, warn};
use pest::{error::Error as PestError, iterators::Pair, Parser};
use pest_derive::Parser;

use crate::tree::{
    HalfEdge, Link, Node,
    NodeIdx::{self, Internal as Int, Leaf},
    TopologyError, Tree, DEFAULT_BLEN, MIN_BLEN,
};
use crate::Result;

#[derive(Parser)]
#[grammar = "./tree/newick.pest"]
pub struct NewickParser;

#[derive(Debug)]
pub struct ParsingError(pub(crate) Box<PestError<Rule>>);

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Malformed newick string")?;
        write!(f, "{}", self.0)
    }
}

impl Error for ParsingError {}

/// Parses every tree in `newick_string`.
///
/// Rooted binary trees are unrooted by joining the two branches below the root,
/// trees with a trifurcating root are taken as they are.
pub fn from_newick(newick_string: &str) -> Result<Vec<Tree>> {
    info!("Parsing newick trees.");
    let mut pairs = match NewickParser::parse(Rule::newick, newick_string) {
        Ok(pairs) => pairs,
        Err(e) => bail!(ParsingError(Box::new(e))),
    };
    let mut trees = Vec::new();
    if let Some(newick_rule) = pairs.next() {
        for tree_rule in newick_rule
            .into_inner()
            .filter(|rule| rule.as_rule() == Rule::tree)
        {
            if let Some(subtree_rule) = tree_rule.into_inner().next() {
                let root = NewickNode::from_rule(subtree_rule)?;
                trees.push(build_tree(root)?);
            }
        }
    }
    info!("Finished parsing {} newick tree(s) successfully.", trees.len());
    Ok(trees)
}

#[derive(Debug, Default)]
struct NewickNode {
    id: String,
    blen: Option<f64>,
    children: Vec<NewickNode>,
}

impl NewickNode {
    fn from_rule(rule: Pair<Rule>) -> Result<Self> {
        let mut node = NewickNode::default();
        for inner in rule.into_inner() {
            match inner.as_rule() {
                Rule::label => node.id = inner.as_str().to_string(),
                Rule::branch_length => node.blen = Some(parse_branch_length(inner)?),
                Rule::internal | Rule::leaf => node.children.push(NewickNode::from_rule(inner)?),
                _ => unreachable!(),
            }
        }
        Ok(node)
    }

    fn leaf_count(&self) -> usize {
        if self.children.is_empty() {
            1
        } else {
            self.children.iter().map(NewickNode::leaf_count).sum()
        }
    }

    fn unroot(mut self) -> Self {
        if self.children.len() != 2 {
            return self;
        }
        let right = self.children.pop().unwrap_or_default();
        let left = self.children.pop().unwrap_or_default();
        let (mut inner, mut other) = if left.children.is_empty() {
            (right, left)
        } else {
            (left, right)
        };
        if inner.children.is_empty() {
            self.children = vec![inner, other];
            return self;
        }
        warn!("Found rooted tree, merging the two root branches.");
        other.blen = match (inner.blen, other.blen) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(DEFAULT_BLEN) + b.unwrap_or(DEFAULT_BLEN)),
        };
        inner.blen = None;
        inner.children.push(other);
        inner
    }
}

fn parse_branch_length(rule: Pair<Rule>) -> Result<f64> {
    Ok(rule
        .as_str()
        .trim_start_matches(':')
        .trim()
        .parse::<f64>()?)
}

fn branch_length(blen: Option<f64>, id: &str) -> f64 {
    match blen {
        None => DEFAULT_BLEN,
        Some(value) if value < MIN_BLEN => {
            warn!(
                "Branch length {} above '{}' is too small, using {} instead.",
                value, id, MIN_BLEN
            );
            MIN_BLEN
        }
        Some(value) => value,
    }
}

struct ArenaBuilder {
    n: usize,
    leaves: Vec<Node>,
    internals: Vec<Node>,
}

impl ArenaBuilder {
    fn node_mut(&mut self, idx: NodeIdx) -> &mut Node {
        match idx {
            Leaf(i) => &mut self.leaves[i],
            Int(i) => &mut self.internals[i - self.n],
        }
    }

    fn attach(&mut self, subtree: NewickNode, parent: NodeIdx) -> Result<()> {
        let NewickNode { id, blen, children } = subtree;
        let blens = vec![branch_length(blen, &id)];
        let idx = if children.is_empty() {
            let i = self.leaves.len();
            self.leaves.push(Node::new_leaf(i, id));
            Leaf(i)
        } else {
            if children.len() != 2 {
                bail!(TopologyError::NonBinary {
                    node: id,
                    children: children.len(),
                });
            }
            let i = self.n + self.internals.len();
            self.internals.push(Node::new_internal(i, id));
            Int(i)
        };
        let parent_slot = self.node_mut(parent).degree();
        self.node_mut(parent).links.push(Link {
            to: HalfEdge::new(idx, 0),
            blens: blens.clone(),
        });
        self.node_mut(idx).links.push(Link {
            to: HalfEdge::new(parent, parent_slot),
            blens,
        });
        for child in children {
            self.attach(child, idx)?;
        }
        Ok(())
    }
}

fn build_tree(root: NewickNode) -> Result<Tree> {
    let root = root.unroot();
    let n = root.leaf_count();
    if n < 3 {
        bail!(TopologyError::TooFewTaxa(n));
    }
    if root.children.len() != 3 {
        bail!(TopologyError::NonBinary {
            node: root.id,
            children: root.children.len(),
        });
    }
    let mut builder = ArenaBuilder {
        n,
        leaves: Vec::with_capacity(n),
        internals: Vec::with_capacity(n - 2),
    };
    builder.internals.push(Node::new_internal(n, root.id));
    for child in root.children {
        builder.attach(child, Int(n))?;
    }
    let mut nodes = builder.leaves;
    nodes.extend(builder.internals);
    Tree::from_nodes(nodes, n)
}
