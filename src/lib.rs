//! Ensemble search core for state-merging automaton inference.
//!
//! A state-merging learner starts from a maximally expanded prefix-tree
//! accepter and repeatedly applies reversible refinements, merges of two
//! states or red/sink markings, until none is admissible; a single run
//! produces one model. The drivers in this crate produce many models by
//! exploring different refinement sequences over the reversible oracle
//! interface of [`oracle`]: [`greedy`] is the sequential baseline,
//! [`bagging`] repeats it against a stochastic evaluator, [`random_dfa`]
//! takes uniform-random refinement walks on independent clones, and
//! [`tree_random_ensemble`] spreads a fixed model budget over distinct
//! root-to-leaf paths of a lazily materialized [`tree::MergeTree`], mutating
//! one shared merger in place and restoring its state by navigating through
//! lowest common ancestors.

/// The reversible-refinement interface that the drivers consume.
pub mod oracle;

/// Lazily materialized tree of refinement decisions, with path replay and
/// rollback, common-ancestor navigation and live-selection allocation.
pub mod tree;

/// The ensemble drivers.
pub mod ensemble;

/// Serialization of emitted model collections.
pub mod output;

#[cfg(test)]
pub(crate) mod mock;

pub use ensemble::{
    bagging, greedy, random_dfa, rng_from_seed, tree_random_ensemble, EnsembleError,
};
pub use oracle::{OracleError, Refinement, StateMerger};
