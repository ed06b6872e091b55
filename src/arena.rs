use std::{
    fmt,
    sync::{Arc, Mutex},
};

use crate::{
    errors::{FormatterError, Result},
    node_type::NodeType,
};

/// Accounting size of one node record: four u32 span/child fields packed
/// alongside a one-byte type tag and the parent id, amortized.
pub const NODE_RECORD_BYTES: usize = 16;

const CHILD_ID_BYTES: usize = 4;

/// Integer handle into a [`NodeArena`]. `NULL` (-1) is the only permitted
/// negative value and never refers to a live node.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIndex(i32);

impl NodeIndex {
    pub const NULL: NodeIndex = NodeIndex(-1);

    pub fn new(value: i32) -> Result<Self> {
        if value < -1 {
            return Err(FormatterError::InvalidNodeIndex(value as i64));
        }
        Ok(Self(value))
    }

    pub fn is_null(self) -> bool {
        self.0 == -1
    }

    pub fn value(self) -> i32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "NodeIndex(NULL)")
        } else {
            write!(f, "NodeIndex({})", self.0)
        }
    }
}

/// One node's record, read out of the parallel arrays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeRecord {
    pub start: u32,
    pub length: u32,
    pub node_type: NodeType,
    pub parent: NodeIndex,
}

impl NodeRecord {
    pub fn end(&self) -> u32 {
        self.start + self.length
    }
}

/// Bulk-allocated AST storage. Nodes live in parallel primitive arrays
/// addressed by [`NodeIndex`]; children of each node occupy one contiguous
/// window of a flat child-id pool. `close()` releases everything at once
/// and invalidates every outstanding index.
pub struct NodeArena {
    starts: Vec<u32>,
    lengths: Vec<u32>,
    types: Vec<NodeType>,
    parents: Vec<NodeIndex>,
    child_starts: Vec<u32>,
    child_counts: Vec<u32>,
    child_ids: Vec<NodeIndex>,
    capacity: usize,
    max_bytes: usize,
    closed: bool,
}

/// Shared hand-off form of an arena: one uncontended lock per file scope,
/// never contended across files.
pub type SharedArena = Arc<Mutex<NodeArena>>;

/// Default node-count estimate for a source of `source_len` bytes.
pub fn estimate_nodes(source_len: usize) -> usize {
    (source_len / 5).max(16)
}

impl NodeArena {
    pub fn create(estimated_nodes: usize, max_bytes: usize) -> Result<Self> {
        let capacity = estimated_nodes.max(16);
        if capacity * NODE_RECORD_BYTES > max_bytes {
            return Err(FormatterError::AllocationLimitExceeded { limit: max_bytes });
        }
        Ok(Self {
            starts: Vec::with_capacity(capacity),
            lengths: Vec::with_capacity(capacity),
            types: Vec::with_capacity(capacity),
            parents: Vec::with_capacity(capacity),
            child_starts: Vec::with_capacity(capacity),
            child_counts: Vec::with_capacity(capacity),
            child_ids: Vec::new(),
            capacity,
            max_bytes,
            closed: false,
        })
    }

    pub fn into_shared(self) -> SharedArena {
        Arc::new(Mutex::new(self))
    }

    /// Appends a node record. The span length is zero until
    /// [`finish_node`](Self::finish_node) patches it; the parent recorded
    /// here may be re-pointed when an enclosing node finishes.
    pub fn allocate_node(
        &mut self,
        start: u32,
        node_type: NodeType,
        parent: NodeIndex,
    ) -> Result<NodeIndex> {
        self.ensure_alive()?;
        if self.starts.len() == self.capacity {
            self.grow()?;
        }
        let id = NodeIndex(self.starts.len() as i32);
        self.starts.push(start);
        self.lengths.push(0);
        self.types.push(node_type);
        self.parents.push(parent);
        self.child_starts.push(0);
        self.child_counts.push(0);
        Ok(id)
    }

    /// Completes a node: patches its span end and flushes its collected
    /// children into one contiguous window of the child pool. Children must
    /// already be ordered by start offset.
    pub fn finish_node(&mut self, id: NodeIndex, end: u32, children: &[NodeIndex]) -> Result<()> {
        self.ensure_alive()?;
        let index = self.check_index(id)?;
        debug_assert!(
            children
                .windows(2)
                .all(|pair| self.starts[pair[0].index()] <= self.starts[pair[1].index()]),
            "children must be ordered by start offset"
        );
        if self.bytes_in_use() + children.len() * CHILD_ID_BYTES > self.max_bytes {
            return Err(FormatterError::AllocationLimitExceeded {
                limit: self.max_bytes,
            });
        }
        self.lengths[index] = end.saturating_sub(self.starts[index]);
        self.child_starts[index] = self.child_ids.len() as u32;
        self.child_counts[index] = children.len() as u32;
        self.child_ids.extend_from_slice(children);
        for &child in children {
            self.parents[child.index()] = id;
        }
        Ok(())
    }

    /// Reassigns a node's type tag before the tree is handed out; the
    /// parser uses this when a construct's kind only becomes clear after
    /// its modifiers are consumed.
    pub(crate) fn set_type(&mut self, id: NodeIndex, node_type: NodeType) {
        if let Ok(index) = self.check_index(id) {
            self.types[index] = node_type;
        }
    }

    pub fn get(&self, id: NodeIndex) -> Result<NodeRecord> {
        self.ensure_alive()?;
        let index = self.check_index(id)?;
        Ok(NodeRecord {
            start: self.starts[index],
            length: self.lengths[index],
            node_type: self.types[index],
            parent: self.parents[index],
        })
    }

    pub fn children(&self, id: NodeIndex) -> Result<&[NodeIndex]> {
        self.ensure_alive()?;
        let index = self.check_index(id)?;
        let start = self.child_starts[index] as usize;
        let count = self.child_counts[index] as usize;
        Ok(&self.child_ids[start..start + count])
    }

    /// The type tags in allocation order. Rule passes iterate this directly
    /// instead of walking parent/child links.
    pub fn types(&self) -> Result<&[NodeType]> {
        self.ensure_alive()?;
        Ok(&self.types)
    }

    pub fn node_count(&self) -> usize {
        self.starts.len()
    }

    pub fn bytes_in_use(&self) -> usize {
        self.starts.len() * NODE_RECORD_BYTES + self.child_ids.len() * CHILD_ID_BYTES
    }

    pub fn is_alive(&self) -> bool {
        !self.closed
    }

    /// Releases all storage. Idempotent; every previously issued
    /// [`NodeIndex`] becomes invalid.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.starts = Vec::new();
        self.lengths = Vec::new();
        self.types = Vec::new();
        self.parents = Vec::new();
        self.child_starts = Vec::new();
        self.child_counts = Vec::new();
        self.child_ids = Vec::new();
    }

    fn grow(&mut self) -> Result<()> {
        let new_capacity = self.capacity * 2;
        if new_capacity * NODE_RECORD_BYTES + self.child_ids.len() * CHILD_ID_BYTES > self.max_bytes
        {
            return Err(FormatterError::AllocationLimitExceeded {
                limit: self.max_bytes,
            });
        }
        let additional = new_capacity - self.starts.len();
        self.starts.reserve_exact(additional);
        self.lengths.reserve_exact(additional);
        self.types.reserve_exact(additional);
        self.parents.reserve_exact(additional);
        self.child_starts.reserve_exact(additional);
        self.child_counts.reserve_exact(additional);
        self.capacity = new_capacity;
        Ok(())
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.closed {
            return Err(FormatterError::ArenaClosed);
        }
        Ok(())
    }

    fn check_index(&self, id: NodeIndex) -> Result<usize> {
        if id.is_null() || id.index() >= self.starts.len() {
            return Err(FormatterError::InvalidNodeIndex(id.0 as i64));
        }
        Ok(id.index())
    }
}

impl Drop for NodeArena {
    fn drop(&mut self) {
        self.close();
    }
}
