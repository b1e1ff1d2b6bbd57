use argmin::core::{CostFunction, Executor, IterState, State};
use argmin::solver::brent::BrentOpt;
use log::debug;
use nalgebra::{DMatrix, DVector};

use anyhow::bail;

use crate::partitions::{BranchLengths, Partitions};
use crate::phylo_info::PhyloInfo;
use crate::substitution_models::{SubstMatrix, SubstModel};
use crate::tree::{HalfEdge, NodeIdx::Leaf, Tree, MAX_BLEN, MIN_BLEN};
use crate::Result;

/// Convergence threshold on the branch length step of Newton-Raphson refinement.
pub const BLEN_TOLERANCE: f64 = 1e-5;

pub trait LikelihoodEngine {
    /// Makes sure the partial likelihood of the subtree behind `half_edge` reflects the
    /// current topology and branch lengths of `tree`.
    fn update_partials(&mut self, tree: &Tree, half_edge: HalfEdge);

    /// Log-likelihood of the whole tree computed across `edge`.
    fn evaluate(&mut self, tree: &Tree, edge: HalfEdge) -> f64;
}

pub trait BranchRefiner {
    /// Refines the length vector of `edge` and writes it to both sides of the branch.
    /// Stops after `max_iterations` steps and keeps the best length seen.
    fn refine(
        &mut self,
        tree: &mut Tree,
        edge: HalfEdge,
        max_iterations: usize,
    ) -> Result<BranchLengths>;
}

#[derive(Debug, Clone)]
struct Partial {
    values: DMatrix<f64>,
    log_scale: DVector<f64>,
}

/// Felsenstein pruning likelihood of an alignment under a reversible substitution model.
///
/// Partial likelihoods are kept per directed half-edge and rescaled per site. The cache is
/// dropped whenever the tree revision changes behind the engine's back, refinements done by
/// the engine itself only invalidate the partials that depend on the refined branch.
#[derive(Debug, Clone)]
pub struct SubstitutionLikelihood {
    model: SubstModel,
    partitions: Partitions,
    leaves: Vec<DMatrix<f64>>,
    partials: Vec<Option<Partial>>,
    revision: Option<u64>,
}

impl SubstitutionLikelihood {
    pub fn new(model: SubstModel, partitions: Partitions, info: &PhyloInfo) -> Result<Self> {
        if partitions.alignment_len() != info.msa_length() {
            bail!(
                "Partitions cover {} columns, the alignment has {}",
                partitions.alignment_len(),
                info.msa_length()
            );
        }
        partitions.check_tree(&info.tree)?;
        Ok(Self {
            model,
            partitions,
            leaves: info.leaf_encodings()?,
            partials: Vec::new(),
            revision: None,
        })
    }

    pub fn model(&self) -> &SubstModel {
        &self.model
    }

    pub fn partitions(&self) -> &Partitions {
        &self.partitions
    }

    /// Log-likelihood of the whole tree.
    pub fn logl(&mut self, tree: &Tree) -> f64 {
        self.evaluate(tree, tree.start_edge())
    }

    fn key(half_edge: HalfEdge) -> usize {
        usize::from(half_edge.node) * 3 + half_edge.slot
    }

    fn sync(&mut self, tree: &Tree) {
        if self.revision != Some(tree.revision()) || self.partials.len() != tree.len() * 3 {
            self.partials.clear();
            self.partials.resize(tree.len() * 3, None);
            self.revision = Some(tree.revision());
        }
    }

    fn ensure_partial(&mut self, tree: &Tree, half_edge: HalfEdge) {
        let mut stack = vec![(half_edge, false)];
        while let Some((h, children_ready)) = stack.pop() {
            let key = Self::key(h);
            if self.partials[key].is_some() {
                continue;
            }
            if let Leaf(i) = h.node {
                let sites = self.leaves[i].ncols();
                self.partials[key] = Some(Partial {
                    values: self.leaves[i].clone(),
                    log_scale: DVector::zeros(sites),
                });
                continue;
            }
            let first = tree.next(h);
            let second = tree.next(first);
            if !children_ready {
                stack.push((h, true));
                stack.extend(
                    [first, second]
                        .map(|o| tree.back(o))
                        .into_iter()
                        .filter(|b| self.partials[Self::key(*b)].is_none())
                        .map(|b| (b, false)),
                );
                continue;
            }
            let left = self.partials[Self::key(tree.back(first))].as_ref();
            let right = self.partials[Self::key(tree.back(second))].as_ref();
            debug_assert!(left.is_some() && right.is_some());
            if let (Some(left), Some(right)) = (left, right) {
                let partial = self.combine([(left, tree.blens(first)), (right, tree.blens(second))]);
                self.partials[key] = Some(partial);
            }
        }
    }

    fn combine(&self, children: [(&Partial, &BranchLengths); 2]) -> Partial {
        let sites = children[0].0.values.ncols();
        let mut values = DMatrix::from_element(self.model.freqs().len(), sites, 1.0);
        let mut log_scale = &children[0].0.log_scale + &children[1].0.log_scale;
        for (child, blens) in children {
            let matrices = self.transition_matrices(blens);
            for (k, range) in self.partitions.ranges().iter().enumerate() {
                let p = &matrices[self.partitions.blen_index(k)];
                let propagated = p * child.values.columns(range.start, range.len());
                values
                    .columns_mut(range.start, range.len())
                    .component_mul_assign(&propagated);
            }
        }
        for (mut column, scale) in values.column_iter_mut().zip(log_scale.iter_mut()) {
            let max = column.max();
            if max > 0.0 {
                column /= max;
                *scale += max.ln();
            }
        }
        Partial { values, log_scale }
    }

    fn transition_matrices(&self, blens: &BranchLengths) -> Vec<SubstMatrix> {
        blens.iter().map(|t| self.model.p(*t)).collect()
    }

    /// Log-likelihood restricted to the partitions using branch length slot `slot`, as a
    /// function of that slot's length `t`, with its first and second derivatives.
    fn slot_derivatives(&self, a: &Partial, b: &Partial, slot: usize, t: f64) -> (f64, f64, f64) {
        let q = self.model.q();
        let p = self.model.p(t);
        let qp = q * &p;
        let q2p = q * &qp;
        let pi = self.model.freqs();
        let (mut logl, mut d1, mut d2) = (0.0, 0.0, 0.0);
        for (k, range) in self.partitions.ranges().iter().enumerate() {
            if self.partitions.blen_index(k) != slot {
                continue;
            }
            let b_cols = b.values.columns(range.start, range.len());
            let pb = &p * &b_cols;
            let qpb = &qp * &b_cols;
            let q2pb = &q2p * &b_cols;
            for s in 0..range.len() {
                let site = range.start + s;
                let weighted = a.values.column(site).component_mul(pi);
                let l = weighted.dot(&pb.column(s));
                let l1 = weighted.dot(&qpb.column(s));
                let l2 = weighted.dot(&q2pb.column(s));
                logl += l.ln() + a.log_scale[site] + b.log_scale[site];
                d1 += l1 / l;
                d2 += l2 / l - (l1 / l) * (l1 / l);
            }
        }
        (logl, d1, d2)
    }

    fn optimise_slot(
        &self,
        a: &Partial,
        b: &Partial,
        slot: usize,
        start: f64,
        max_iterations: usize,
    ) -> Result<f64> {
        let mut t = start.clamp(MIN_BLEN, MAX_BLEN);
        let (mut best_t, mut best_logl) = (t, f64::NEG_INFINITY);
        for _ in 0..max_iterations {
            let (logl, d1, d2) = self.slot_derivatives(a, b, slot, t);
            if logl > best_logl {
                (best_t, best_logl) = (t, logl);
            }
            if !(d2 < 0.0) {
                let (brent_t, brent_logl) = self.brent_slot(a, b, slot, t)?;
                if brent_logl > best_logl {
                    (best_t, best_logl) = (brent_t, brent_logl);
                }
                break;
            }
            let next = (t - d1 / d2).clamp(MIN_BLEN, MAX_BLEN);
            let step = (next - t).abs();
            t = next;
            if step < BLEN_TOLERANCE {
                break;
            }
        }
        let (logl, _, _) = self.slot_derivatives(a, b, slot, t);
        if logl > best_logl {
            (best_t, best_logl) = (t, logl);
        }
        debug!(
            "Refined branch length slot {} from {:.6} to {:.6}, logl {:.6}",
            slot, start, best_t, best_logl
        );
        Ok(best_t)
    }

    fn brent_slot(&self, a: &Partial, b: &Partial, slot: usize, start: f64) -> Result<(f64, f64)> {
        let upper = (start * 10.0).clamp(1.0, MAX_BLEN);
        let cost = SlotCost {
            engine: self,
            a,
            b,
            slot,
        };
        let res = Executor::new(cost, BrentOpt::new(MIN_BLEN, upper))
            .configure(|_| IterState::new().param(start).max_iters(100))
            .run()?;
        let state = res.state();
        let t = state.get_best_param().copied().unwrap_or(start);
        Ok((t, -state.get_best_cost()))
    }

    /// Drops the partials whose subtree contains the branch at `edge`.
    fn invalidate_through(&mut self, tree: &Tree, edge: HalfEdge) {
        let mut stack = vec![edge, tree.back(edge)];
        while let Some(h) = stack.pop() {
            for o in tree.half_edges(&h.node).filter(|o| *o != h) {
                self.partials[Self::key(o)] = None;
                stack.push(tree.back(o));
            }
        }
    }
}

struct SlotCost<'a> {
    engine: &'a SubstitutionLikelihood,
    a: &'a Partial,
    b: &'a Partial,
    slot: usize,
}

impl CostFunction for SlotCost<'_> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, value: &f64) -> Result<f64> {
        Ok(-self.engine.slot_derivatives(self.a, self.b, self.slot, *value).0)
    }
}

impl LikelihoodEngine for SubstitutionLikelihood {
    fn update_partials(&mut self, tree: &Tree, half_edge: HalfEdge) {
        self.sync(tree);
        self.ensure_partial(tree, half_edge);
    }

    fn evaluate(&mut self, tree: &Tree, edge: HalfEdge) -> f64 {
        self.sync(tree);
        let back = tree.back(edge);
        self.ensure_partial(tree, edge);
        self.ensure_partial(tree, back);
        let (Some(a), Some(b)) = (
            self.partials[Self::key(edge)].as_ref(),
            self.partials[Self::key(back)].as_ref(),
        ) else {
            return f64::NEG_INFINITY;
        };
        let pi = self.model.freqs();
        let matrices = self.transition_matrices(tree.blens(edge));
        let mut logl = 0.0;
        for (k, range) in self.partitions.ranges().iter().enumerate() {
            let p = &matrices[self.partitions.blen_index(k)];
            let pb = p * b.values.columns(range.start, range.len());
            for s in 0..range.len() {
                let site = range.start + s;
                let l = a.values.column(site).component_mul(pi).dot(&pb.column(s));
                logl += l.ln() + a.log_scale[site] + b.log_scale[site];
            }
        }
        logl
    }
}

impl BranchRefiner for SubstitutionLikelihood {
    fn refine(
        &mut self,
        tree: &mut Tree,
        edge: HalfEdge,
        max_iterations: usize,
    ) -> Result<BranchLengths> {
        self.sync(tree);
        let back = tree.back(edge);
        self.ensure_partial(tree, edge);
        self.ensure_partial(tree, back);
        let blens = tree.blens(edge).clone();
        let refined = match (
            self.partials[Self::key(edge)].as_ref(),
            self.partials[Self::key(back)].as_ref(),
        ) {
            (Some(a), Some(b)) => blens
                .iter()
                .enumerate()
                .map(|(slot, t)| self.optimise_slot(a, b, slot, *t, max_iterations))
                .collect::<Result<BranchLengths>>()?,
            _ => blens,
        };
        tree.set_blens(edge, &refined);
        self.revision = Some(tree.revision());
        self.invalidate_through(tree, edge);
        Ok(refined)
    }
}
