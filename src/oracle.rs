use std::fmt;

use thiserror::Error;

/// Abstracts the types of errors that the external refinement oracle can
/// produce. Any failure of this kind is fatal for the driver invocation that
/// encounters it; the core propagates it verbatim and never recovers.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum OracleError {
    #[error("refinement `{refinement}` used against a merger in the wrong state")]
    StateMismatch { refinement: String },
    #[error("oracle operation failed: {0}")]
    Failed(String),
}

/// A reversible operation on a [`StateMerger`], typically a merge of two
/// states or a red/sink marking of a single state.
///
/// Refinements obey a strict LIFO discipline against a given merger: a
/// refinement may only be applied while the merger is in the exact state it
/// was generated for, and may only be undone while its application is the
/// most recent one that has not itself been undone. Using a refinement
/// against a merger in any other state is a programming error; conforming
/// implementations are encouraged to detect it and report
/// [`OracleError::StateMismatch`].
///
/// The [`fmt::Display`] bound provides the short rendering used in logging.
/// Refinements are plain owned values, any resources they hold are given up
/// when they are dropped after their final `undo`.
pub trait Refinement<M>: fmt::Display {
    /// Mutates `merger` toward one specific successor state. Deterministic
    /// given the merger state.
    fn apply(&self, merger: &mut M) -> Result<(), OracleError>;

    /// Inverse of [`Refinement::apply`]. After `apply` followed by `undo`,
    /// the merger is observationally equal to its prior state.
    fn undo(&self, merger: &mut M) -> Result<(), OracleError>;
}

/// Handle to the mutable APTA and evaluator context that the ensemble
/// drivers operate on. The concrete automaton representation, the scoring
/// plug-in and the refinement objects all live behind this trait; the core
/// consumes only the reversible-refinement interface.
pub trait StateMerger: Sized {
    /// The refinement type this merger hands out.
    type Refinement: Refinement<Self>;

    /// Deep, independent clone. Future mutations of the clone do not affect
    /// `self`.
    fn try_clone(&self) -> Result<Self, OracleError>;

    /// The evaluator's pick for the current state, `None` when no refinement
    /// is admissible. Takes `&mut self` so implementations may maintain
    /// scoring caches.
    fn best_refinement(&mut self) -> Result<Option<Self::Refinement>, OracleError>;

    /// The full admissible set for the current state, empty when the merger
    /// is terminal. The order must be stable for a given merger state.
    fn possible_refinements(&mut self) -> Result<Vec<Self::Refinement>, OracleError>;

    /// One-time evaluator setup hook, invoked by [`greedy`](crate::greedy)
    /// after the traces have been loaded.
    fn initialize_after_adding_traces(&mut self) {}

    /// Serializes the current automaton into a model artifact.
    fn emit(&self) -> String;
}
