use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::Path;

use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::oracle::{OracleError, Refinement, StateMerger};
use crate::output::{ensemble_output_path, write_model_collection, ModelWriteError};
use crate::tree::{IndexPath, MergeTree, NodeId};

/// Abstracts the types of errors that can occur while a driver explores the
/// refinement space. None of them is recovered within the core; every hard
/// failure surfaces to the driver's caller.
#[derive(Debug, Error)]
pub enum EnsembleError {
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("nodes {a} and {b} of the merge tree share no common ancestor")]
    NoCommonAncestor { a: NodeId, b: NodeId },
    #[error(transparent)]
    Output(#[from] ModelWriteError),
}

/// Builds a generator for the drivers that draw or shuffle, from an explicit
/// seed when reproducibility is wanted and from entropy otherwise.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Repeatedly applies the evaluator's best refinement until none is
/// admissible. On return the merger is in the final, fully merged state and
/// the returned sequence replays that state from the initial one.
pub fn greedy<M: StateMerger>(merger: &mut M) -> Result<Vec<M::Refinement>, EnsembleError> {
    info!("starting greedy merging");
    merger.initialize_after_adding_traces();

    let mut applied = Vec::new();
    while let Some(refinement) = merger.best_refinement()? {
        trace!("applying refinement {refinement}");
        refinement.apply(merger)?;
        applied.push(refinement);
    }
    debug!("no more possible merges after {} refinements", applied.len());
    Ok(applied)
}

/// Runs [`greedy`] `estimators` times, rolling the merger back to its
/// initial state after each run. Meant for a stochastic evaluator; against a
/// deterministic one all runs are identical.
pub fn bagging<M: StateMerger>(merger: &mut M, estimators: usize) -> Result<(), EnsembleError> {
    info!("starting bagging with {estimators} estimators");
    for estimator in 0..estimators {
        let applied = greedy(merger)?;
        debug!("estimator {estimator} applied {} refinements", applied.len());
        for refinement in applied.iter().rev() {
            refinement.undo(merger)?;
        }
    }
    info!("ended bagging");
    Ok(())
}

/// Drives `estimators` independent clones of the merger to a terminal state
/// by uniform-random refinement selection and returns them. The original
/// merger is never mutated.
pub fn random_dfa<M: StateMerger>(
    merger: &M,
    estimators: usize,
    rng: &mut impl Rng,
) -> Result<Vec<M>, EnsembleError> {
    info!("starting random DFA generation with {estimators} estimators");

    let mut mergers = Vec::with_capacity(estimators);
    for estimator in 0..estimators {
        debug!("building random estimator {estimator}");
        let mut clone = merger.try_clone()?;

        let mut refinements = clone.possible_refinements()?;
        while !refinements.is_empty() {
            let selected = refinements.swap_remove(rng.gen_range(0..refinements.len()));
            trace!("applying refinement {selected}");
            selected.apply(&mut clone)?;
            refinements = clone.possible_refinements()?;
        }

        debug!("no more possible merges");
        mergers.push(clone);
    }
    Ok(mergers)
}

/// Produces up to `estimators` models, each corresponding to a distinct
/// root-to-leaf path of the refinement tree, mutating the shared merger in
/// place and navigating between leaves through their lowest common ancestor.
/// The emitted artifacts are written to `<output_base>.random.json` and the
/// emitted index paths are returned; fewer paths than requested means the
/// tree had fewer distinct leaves.
///
/// A first top-down pass reserves the budget along every branch it descends,
/// parking branches that received no reservation in a pool of skipped nodes.
/// A second pass drains that pool shallowest-first with uniform-random
/// descents until the budget is met or the pool runs dry.
pub fn tree_random_ensemble<M: StateMerger>(
    merger: &mut M,
    estimators: usize,
    output_base: &Path,
    rng: &mut impl Rng,
) -> Result<Vec<IndexPath>, EnsembleError> {
    let mut tree: MergeTree<M> = MergeTree::new(estimators);
    let mut next = vec![tree.root()];
    let mut skipped: BinaryHeap<Reverse<(usize, NodeId)>> = BinaryHeap::new();
    let mut paths: Vec<IndexPath> = Vec::new();
    let mut artifacts: Vec<String> = Vec::new();
    let mut prev: Option<NodeId> = None;
    let mut reset = false;

    info!("entering phase I");
    while paths.len() < estimators {
        let Some(node) = next.pop() else {
            break;
        };

        // Restore the merger to the popped node's state. Directly after an
        // emission the merger sits at some other leaf, so the walk goes
        // through the common ancestor; otherwise the node is a child of the
        // previously processed one and a single merge suffices.
        match prev {
            Some(previous) if reset => {
                let (undo_steps, redo_steps) = tree
                    .find_common_ancestor(previous, node)
                    .ok_or(EnsembleError::NoCommonAncestor { a: previous, b: node })?;
                tree.revert_last_merges(previous, merger, undo_steps)?;
                tree.perform_last_merges(node, merger, redo_steps)?;
            }
            _ => tree.apply_merge(node, merger)?,
        }

        let refinements = merger.possible_refinements()?;
        if refinements.is_empty() {
            paths.push(tree.index_path(node).to_vec());
            artifacts.push(merger.emit());
            debug!("automaton {} found at depth {}", paths.len(), tree.level(node));
            reset = true;
        } else {
            tree.initialize_children(node, refinements);
            let (skipped_children, selected_children) = tree.allocate_live(node, rng);
            for child in skipped_children {
                skipped.push(Reverse((tree.level(child), child)));
            }
            next.extend(selected_children);
            reset = false;
        }
        prev = Some(node);
    }
    if let Some(previous) = prev {
        tree.revert_merges(previous, merger)?;
    }

    let mut remaining = estimators - paths.len();
    info!("entering phase II with {remaining} models missing");
    while remaining > 0 {
        let Some(Reverse((_, start))) = skipped.pop() else {
            break;
        };

        let mut current = start;
        tree.perform_merges(current, merger)?;
        loop {
            let refinements = merger.possible_refinements()?;
            if refinements.is_empty() {
                break;
            }
            tree.initialize_children(current, refinements);
            let children = tree.children(current).to_vec();
            let allocation = rng.gen_range(0..children.len());
            for (index, &child) in children.iter().enumerate() {
                if index == allocation || skipped.len() >= remaining {
                    continue;
                }
                skipped.push(Reverse((tree.level(child), child)));
            }
            current = children[allocation];
            tree.apply_merge(current, merger)?;
        }

        paths.push(tree.index_path(current).to_vec());
        artifacts.push(merger.emit());
        debug!("automaton {} found at depth {}", paths.len(), tree.level(current));
        tree.revert_merges(current, merger)?;
        remaining -= 1;
    }

    write_model_collection(&ensemble_output_path(output_base), &artifacts)?;
    info!("tree random ensemble produced {} models", paths.len());
    Ok(paths)
}
