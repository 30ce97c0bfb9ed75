//! Node identifiers and the union-find used during topology rebuild.

use serde::{Deserialize, Serialize};

/// Identifier of an electrical equipotential region.
///
/// Id 0 is reserved for ground. Ids are dense after a topology rebuild:
/// non-ground nodes are numbered 1..=N and map to matrix rows 0..N.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    /// The ground node.
    pub const GROUND: NodeId = NodeId(0);

    pub fn new(id: u32) -> Self {
        NodeId(id)
    }

    pub fn is_ground(&self) -> bool {
        self.0 == 0
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// MNA matrix row for this node, or `None` for ground.
    pub fn matrix_index(&self) -> Option<usize> {
        if self.is_ground() {
            None
        } else {
            Some((self.0 - 1) as usize)
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_ground() {
            write!(f, "gnd")
        } else {
            write!(f, "n{}", self.0)
        }
    }
}

/// Disjoint-set forest with path compression and union by size.
///
/// Used as a temporary structure while rebuilding topology: every
/// connection point starts as its own set, wires and coincident terminals
/// merge sets, and grounded sets are pinned so ground always wins a merge.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
    grounded: Vec<bool>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
            grounded: vec![false; n],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Find the representative of `i`'s set, compressing the path.
    pub fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = i;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merge the sets containing `a` and `b`.
    pub fn union(&mut self, a: usize, b: usize) {
        let mut ra = self.find(a);
        let mut rb = self.find(b);
        if ra == rb {
            return;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        self.grounded[ra] = self.grounded[ra] || self.grounded[rb];
    }

    /// Pin `i`'s set to ground. Membership survives later unions.
    pub fn ground(&mut self, i: usize) {
        let root = self.find(i);
        self.grounded[root] = true;
    }

    /// Whether `i`'s set has been pinned to ground.
    pub fn is_grounded(&mut self, i: usize) -> bool {
        let root = self.find(i);
        self.grounded[root]
    }
}
