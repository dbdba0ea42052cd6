use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A client-submitted compute job: a graph of processing nodes.
///
/// Everything except the per-node resource fields is opaque to the engine
/// and passed through to the firmware untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessGroup {
    pub nodes: Vec<ProcessNode>,

    /// Graph edges as (producer, consumer) node indices.
    #[serde(default)]
    pub edges: Vec<(usize, usize)>,

    /// Encoded program / terminal data for the firmware.
    #[serde(default)]
    pub payload: Vec<u8>,

    #[serde(default)]
    pub buffers: Vec<BufferRef>,
}

/// One processing node and its declared resource needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessNode {
    #[serde(default)]
    pub name: String,

    /// Hard-coded cell name. Takes precedence over `cell_type`.
    #[serde(default)]
    pub cell: Option<String>,

    /// Any cell of this type.
    #[serde(default)]
    pub cell_type: Option<String>,

    /// Contiguous unit counts per device-channel class name.
    #[serde(default)]
    pub channels: BTreeMap<String, u32>,

    /// Unit counts per memory bank name.
    #[serde(default)]
    pub memory: BTreeMap<String, u32>,
}

/// Reference to a client buffer attached to the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferRef {
    pub id: u64,
    pub len: u64,
}

impl ProcessNode {
    /// Node running on any cell of `cell_type`.
    pub fn on_type(cell_type: impl Into<String>) -> Self {
        Self {
            cell_type: Some(cell_type.into()),
            ..Self::default()
        }
    }

    /// Node pinned to one named cell.
    pub fn on_cell(cell: impl Into<String>) -> Self {
        Self {
            cell: Some(cell.into()),
            ..Self::default()
        }
    }

    pub fn with_channel(mut self, class: impl Into<String>, units: u32) -> Self {
        self.channels.insert(class.into(), units);
        self
    }

    pub fn with_memory(mut self, bank: impl Into<String>, units: u32) -> Self {
        self.memory.insert(bank.into(), units);
        self
    }
}

impl ProcessGroup {
    pub fn new(nodes: Vec<ProcessNode>) -> Self {
        Self {
            nodes,
            ..Self::default()
        }
    }
}
