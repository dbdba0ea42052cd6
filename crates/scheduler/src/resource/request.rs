use psys_core::{CellId, CellTypeId};

use super::grant::ResourceClass;

/// How a node asks for its execution cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellRequest {
    /// The manifest hard-codes a cell id.
    Pinned(CellId),
    /// Any free cell of the given type.
    OfType(CellTypeId),
}

/// Resources one graph node needs from the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRequest {
    pub cell: Option<CellRequest>,
    /// Contiguous unit counts per channel class or memory bank.
    pub units: Vec<(ResourceClass, u32)>,
}
