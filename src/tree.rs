use itertools::Itertools;
use rand::{seq::SliceRandom, Rng};
use tracing::trace;

use crate::oracle::{OracleError, Refinement, StateMerger};

/// Identifies a node of a [`MergeTree`]. Ids are assigned from a counter
/// scoped to the tree and double as indices into its node arena.
pub type NodeId = u32;

/// The sequence of child indices taken from the root to a node. Two nodes of
/// the same tree are equal iff their index paths are, so a path identifies
/// one refinement sequence applied to the initial merger.
pub type IndexPath = Vec<usize>;

struct MergeNode<R> {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// The refinement taken from the parent, `None` only at the root.
    merge: Option<R>,
    /// Reservations of model slots whose exploration passes through the
    /// subtree rooted at this node.
    live: Vec<usize>,
    level: usize,
    ancestors: Vec<NodeId>,
    index_path: IndexPath,
}

/// Lazily materialized tree of refinement decisions. The tree owns its nodes
/// in an arena; parent links are plain ids and therefore non-owning, while
/// dropping the tree releases every node together with the refinement it
/// holds.
pub struct MergeTree<M: StateMerger> {
    nodes: Vec<MergeNode<M::Refinement>>,
}

impl<M: StateMerger> MergeTree<M> {
    /// Creates a tree holding only the root, whose live selections are set
    /// to `[0, 1, ..., budget - 1]`.
    pub fn new(budget: usize) -> Self {
        Self {
            nodes: vec![MergeNode {
                parent: None,
                children: Vec::new(),
                merge: None,
                live: (0..budget).collect(),
                level: 0,
                ancestors: Vec::new(),
                index_path: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    /// Number of nodes materialized so far.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn level(&self, id: NodeId) -> usize {
        self.node(id).level
    }

    pub fn live(&self, id: NodeId) -> &[usize] {
        &self.node(id).live
    }

    pub fn index_path(&self, id: NodeId) -> &[usize] {
        &self.node(id).index_path
    }

    fn node(&self, id: NodeId) -> &MergeNode<M::Refinement> {
        &self.nodes[id as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut MergeNode<M::Refinement> {
        &mut self.nodes[id as usize]
    }

    /// The merge chain from the node up to (but excluding) the root, ordered
    /// deepest first. Undoing the chain in this order, or applying it in
    /// reverse, walks between the node's state and the initial one.
    pub fn merge_path(&self, id: NodeId) -> Vec<&M::Refinement> {
        let mut path = Vec::with_capacity(self.node(id).level);
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            path.push(
                self.node(current)
                    .merge
                    .as_ref()
                    .expect("a non-root node holds the refinement taken from its parent"),
            );
            current = parent;
        }
        path
    }

    /// Applies the refinement stored in the node, if any. Valid only while
    /// the merger is in the parent's state.
    pub fn apply_merge(&self, id: NodeId, merger: &mut M) -> Result<(), OracleError> {
        if let Some(merge) = &self.node(id).merge {
            merge.apply(merger)?;
        }
        Ok(())
    }

    /// Brings a merger from the initial state to the node's state.
    pub fn perform_merges(&self, id: NodeId, merger: &mut M) -> Result<(), OracleError> {
        self.perform_last_merges(id, merger, self.node(id).level)
    }

    /// Applies only the `steps` merges closest to the node, assuming the
    /// merger already sits `steps` levels above it.
    pub fn perform_last_merges(
        &self,
        id: NodeId,
        merger: &mut M,
        steps: usize,
    ) -> Result<(), OracleError> {
        let path = self.merge_path(id);
        for merge in path[..steps].iter().rev() {
            merge.apply(merger)?;
        }
        Ok(())
    }

    /// Brings a merger from the node's state back to the initial state.
    pub fn revert_merges(&self, id: NodeId, merger: &mut M) -> Result<(), OracleError> {
        self.revert_last_merges(id, merger, self.node(id).level)
    }

    /// Undoes only the `steps` merges closest to the node, leaving the
    /// merger `steps` levels above it.
    pub fn revert_last_merges(
        &self,
        id: NodeId,
        merger: &mut M,
        steps: usize,
    ) -> Result<(), OracleError> {
        let path = self.merge_path(id);
        for merge in &path[..steps] {
            merge.undo(merger)?;
        }
        Ok(())
    }

    /// Creates one child per admissible refinement, in the order the oracle
    /// returned them. The merger must be in the node's state when the
    /// refinement set is queried; the children are valid only for as long as
    /// replaying their index path reproduces that state.
    pub fn initialize_children(&mut self, id: NodeId, refinements: Vec<M::Refinement>) {
        debug_assert!(
            self.node(id).children.is_empty(),
            "children of node {id} initialized twice"
        );
        let level = self.node(id).level + 1;
        let mut ancestors = self.node(id).ancestors.clone();
        ancestors.push(id);
        let index_path = self.node(id).index_path.clone();

        let mut children = Vec::with_capacity(refinements.len());
        for (index, merge) in refinements.into_iter().enumerate() {
            let child = self.nodes.len() as NodeId;
            trace!("creating node {child} at depth {level} for refinement {merge}");
            let mut child_path = index_path.clone();
            child_path.push(index);
            self.nodes.push(MergeNode {
                parent: Some(id),
                children: Vec::new(),
                merge: Some(merge),
                live: Vec::new(),
                level,
                ancestors: ancestors.clone(),
                index_path: child_path,
            });
            children.push(child);
        }
        self.node_mut(id).children = children;
    }

    /// Partitions the node's live selections among its children and returns
    /// the children that received none alongside those that received at
    /// least one, both in child order.
    pub fn allocate_live(
        &mut self,
        id: NodeId,
        rng: &mut impl Rng,
    ) -> (Vec<NodeId>, Vec<NodeId>) {
        for (selection, child_index) in self.generate_allocation(id, rng) {
            let child = self.node(id).children[child_index];
            self.node_mut(child).live.push(selection);
        }

        let mut skipped = Vec::new();
        let mut selected = Vec::new();
        for &child in &self.node(id).children {
            if self.node(child).live.is_empty() {
                skipped.push(child);
            } else {
                selected.push(child);
            }
        }
        (skipped, selected)
    }

    /// Generates a balanced assignment of the node's live selections to
    /// child indices: both the selections and the child order are shuffled,
    /// then selection `i` goes to the child at position `i mod |children|`.
    /// When there are more selections than children, several selections
    /// share a child and drive the breadth of that subtree's own allocation.
    fn generate_allocation(&self, id: NodeId, rng: &mut impl Rng) -> Vec<(usize, usize)> {
        let node = self.node(id);
        if node.children.is_empty() || node.live.is_empty() {
            return Vec::new();
        }

        let mut selections = node.live.clone();
        selections.shuffle(rng);
        let mut child_order = (0..node.children.len()).collect_vec();
        child_order.shuffle(rng);

        selections
            .into_iter()
            .enumerate()
            .map(|(i, selection)| (selection, child_order[i % child_order.len()]))
            .collect()
    }

    /// Walks the ancestor chains of both nodes, deepest first, to find their
    /// lowest common ancestor. Returns the number of undos from `a` and the
    /// number of redos toward `b` required to navigate between the two
    /// states through that ancestor, or `None` if the nodes share no
    /// ancestor, which cannot happen for two nodes of the same tree and is
    /// treated as a fatal invariant violation by callers.
    pub fn find_common_ancestor(&self, a: NodeId, b: NodeId) -> Option<(usize, usize)> {
        let path_a: Vec<NodeId> = self.node(a).ancestors.iter().copied().chain([a]).collect();
        let path_b: Vec<NodeId> = self.node(b).ancestors.iter().copied().chain([b]).collect();

        let mut i = path_a.len() - 1;
        let mut j = path_b.len() - 1;
        while i > j {
            i -= 1;
        }
        while j > i {
            j -= 1;
        }
        loop {
            if path_a[i] == path_b[j] {
                return Some((path_a.len() - 1 - i, path_b.len() - 1 - j));
            }
            if i == 0 || j == 0 {
                return None;
            }
            i -= 1;
            j -= 1;
        }
    }
}
