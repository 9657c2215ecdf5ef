//! Scripted refinement oracle used by the test suites. The merger state is
//! the index path taken from the initial automaton and a shape function
//! determines the branching at each path, so every test tree is spelled out
//! as a two-line function. Refinements remember the state they were
//! generated for and fail with [`OracleError::StateMismatch`] when applied
//! or undone anywhere else, which turns each replay and rollback test into a
//! check of the LIFO state discipline.

use std::fmt;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::oracle::{OracleError, Refinement, StateMerger};

/// Maps an index path to the number of admissible refinements there.
pub(crate) type Shape = fn(&[usize]) -> usize;

#[derive(Clone)]
enum Picker {
    First,
    Seeded(StdRng),
}

#[derive(Clone)]
pub(crate) struct ScriptedMerger {
    shape: Shape,
    path: Vec<usize>,
    picker: Picker,
}

impl ScriptedMerger {
    /// A merger whose `best_refinement` always picks the first admissible
    /// child.
    pub(crate) fn deterministic(shape: Shape) -> Self {
        Self {
            shape,
            path: Vec::new(),
            picker: Picker::First,
        }
    }

    /// A merger whose `best_refinement` draws uniformly among the admissible
    /// children, seeded for reproducibility.
    pub(crate) fn seeded(shape: Shape, seed: u64) -> Self {
        Self {
            shape,
            path: Vec::new(),
            picker: Picker::Seeded(StdRng::seed_from_u64(seed)),
        }
    }

    pub(crate) fn state(&self) -> &[usize] {
        &self.path
    }

    fn branching(&self) -> usize {
        (self.shape)(&self.path)
    }

    fn refinement(&self, child: usize) -> ScriptedRefinement {
        ScriptedRefinement {
            from: self.path.clone(),
            child,
        }
    }
}

pub(crate) struct ScriptedRefinement {
    from: Vec<usize>,
    child: usize,
}

impl fmt::Display for ScriptedRefinement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "merge {} below {:?}", self.child, self.from)
    }
}

impl Refinement<ScriptedMerger> for ScriptedRefinement {
    fn apply(&self, merger: &mut ScriptedMerger) -> Result<(), OracleError> {
        if merger.path != self.from {
            return Err(OracleError::StateMismatch {
                refinement: self.to_string(),
            });
        }
        merger.path.push(self.child);
        Ok(())
    }

    fn undo(&self, merger: &mut ScriptedMerger) -> Result<(), OracleError> {
        if merger.path.last() == Some(&self.child)
            && merger.path[..merger.path.len() - 1] == self.from[..]
        {
            merger.path.pop();
            Ok(())
        } else {
            Err(OracleError::StateMismatch {
                refinement: self.to_string(),
            })
        }
    }
}

impl StateMerger for ScriptedMerger {
    type Refinement = ScriptedRefinement;

    fn try_clone(&self) -> Result<Self, OracleError> {
        Ok(self.clone())
    }

    fn best_refinement(&mut self) -> Result<Option<Self::Refinement>, OracleError> {
        let branching = self.branching();
        if branching == 0 {
            return Ok(None);
        }
        let child = match &mut self.picker {
            Picker::First => 0,
            Picker::Seeded(rng) => rng.gen_range(0..branching),
        };
        Ok(Some(self.refinement(child)))
    }

    fn possible_refinements(&mut self) -> Result<Vec<Self::Refinement>, OracleError> {
        Ok((0..self.branching())
            .map(|child| self.refinement(child))
            .collect())
    }

    fn emit(&self) -> String {
        format!("{{\"path\": {:?}}}", self.path)
    }
}

pub(crate) mod shapes {
    /// Complete binary tree with four leaves at depth two.
    pub(crate) fn binary_depth2(path: &[usize]) -> usize {
        if path.len() < 2 {
            2
        } else {
            0
        }
    }

    /// Three leaves directly below the root.
    pub(crate) fn ternary_depth1(path: &[usize]) -> usize {
        if path.is_empty() {
            3
        } else {
            0
        }
    }

    /// Exactly one admissible refinement for three steps, then terminal.
    pub(crate) fn chain3(path: &[usize]) -> usize {
        if path.len() < 3 {
            1
        } else {
            0
        }
    }

    /// A single refinement leading to a terminal state.
    pub(crate) fn single_leaf(path: &[usize]) -> usize {
        if path.is_empty() {
            1
        } else {
            0
        }
    }

    /// Two leaves directly below the root.
    pub(crate) fn two_leaves(path: &[usize]) -> usize {
        if path.is_empty() {
            2
        } else {
            0
        }
    }

    /// Three leaves total: `[0, 0]`, `[1, 0]` and `[1, 1]`.
    pub(crate) fn lopsided(path: &[usize]) -> usize {
        match path {
            [] => 2,
            [0] => 1,
            [1] => 2,
            _ => 0,
        }
    }
}
