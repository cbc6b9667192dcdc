//! Block Instance Identity
//!
//! Every run of a template block inside a parallel construct is a distinct
//! *virtual* instance, named by `(block, parallel, iteration)`. Real and
//! virtual instances share one key type so the execution context can track
//! both in the same sets.

use std::fmt;

/// Identity of one iteration's run of a template block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualBlockId {
    pub block_id: String,
    pub parallel_id: String,
    pub iteration: usize,
}

impl VirtualBlockId {
    pub fn new(block_id: impl Into<String>, parallel_id: impl Into<String>, iteration: usize) -> Self {
        Self {
            block_id: block_id.into(),
            parallel_id: parallel_id.into(),
            iteration,
        }
    }
}

/// Rendered as `{block}_parallel_{parallel}_iteration_{n}` for logs.
impl fmt::Display for VirtualBlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_parallel_{}_iteration_{}",
            self.block_id, self.parallel_id, self.iteration
        )
    }
}

/// Key of anything the executor can run: a block or a virtual instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlockKey {
    Block(String),
    Virtual(VirtualBlockId),
}

impl BlockKey {
    pub fn block(id: impl Into<String>) -> Self {
        BlockKey::Block(id.into())
    }

    pub fn instance(block_id: &str, parallel_id: &str, iteration: usize) -> Self {
        BlockKey::Virtual(VirtualBlockId::new(block_id, parallel_id, iteration))
    }

    /// Id of the underlying (template) block.
    pub fn block_id(&self) -> &str {
        match self {
            BlockKey::Block(id) => id,
            BlockKey::Virtual(v) => &v.block_id,
        }
    }

    pub fn as_virtual(&self) -> Option<&VirtualBlockId> {
        match self {
            BlockKey::Virtual(v) => Some(v),
            BlockKey::Block(_) => None,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, BlockKey::Virtual(_))
    }
}

impl From<VirtualBlockId> for BlockKey {
    fn from(id: VirtualBlockId) -> Self {
        BlockKey::Virtual(id)
    }
}

impl From<&str> for BlockKey {
    fn from(id: &str) -> Self {
        BlockKey::Block(id.to_string())
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockKey::Block(id) => f.write_str(id),
            BlockKey::Virtual(v) => v.fmt(f),
        }
    }
}
