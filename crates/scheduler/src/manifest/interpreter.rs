use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use psys_core::{BankId, CellId, CellTypeId, ChannelClassId, HardwareDescription};
use serde::Serialize;
use thiserror::Error;

use crate::resource::{CellRequest, NodeRequest, ResourceClass};

use super::types::ProcessGroup;

/// A resource a job can ask for more of than the hardware has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Demand {
    Cell(CellId),
    CellType(CellTypeId),
    Channel(ChannelClassId),
    MemoryBank(BankId),
}

impl fmt::Display for Demand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Demand::Cell(id) => write!(f, "{id}"),
            Demand::CellType(t) => write!(f, "cell type #{}", t.0),
            Demand::Channel(id) => write!(f, "{id}"),
            Demand::MemoryBank(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("process group has no nodes")]
    Empty,

    #[error("node {node}: unknown cell '{name}'")]
    UnknownCell { node: usize, name: String },

    #[error("node {node}: unknown cell type '{name}'")]
    UnknownCellType { node: usize, name: String },

    #[error("node {node}: unknown channel class '{name}'")]
    UnknownChannel { node: usize, name: String },

    #[error("node {node}: unknown memory bank '{name}'")]
    UnknownMemoryBank { node: usize, name: String },

    #[error("node {node}: cell '{cell}' is not of type '{cell_type}'")]
    TypeMismatch {
        node: usize,
        cell: String,
        cell_type: String,
    },

    #[error("edge ({0}, {1}) references a missing node")]
    DanglingEdge(usize, usize),

    #[error("{demand} needs {requested}, total capacity {capacity}")]
    Impossible {
        demand: Demand,
        requested: u32,
        capacity: u32,
    },
}

/// Per-node resource requests extracted from a process group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupRequirements {
    nodes: Vec<NodeRequest>,
}

impl GroupRequirements {
    pub fn nodes(&self) -> &[NodeRequest] {
        &self.nodes
    }

    /// Number of cells the group occupies.
    pub fn cell_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.cell.is_some()).count()
    }

    /// Units of `class` summed over every node.
    pub fn total(&self, class: ResourceClass) -> u32 {
        self.nodes
            .iter()
            .flat_map(|n| n.units.iter())
            .filter(|(c, _)| *c == class)
            .map(|(_, units)| units)
            .sum()
    }
}

/// Resolves a [`ProcessGroup`]'s named requirements against the hardware table.
#[derive(Debug, Clone)]
pub struct ManifestInterpreter {
    hw: Arc<HardwareDescription>,
}

impl ManifestInterpreter {
    pub fn new(hw: Arc<HardwareDescription>) -> Self {
        Self { hw }
    }

    /// Extract per-node requests and reject groups that exceed total capacity.
    ///
    /// Zero-unit entries are dropped here so they never reach the pools.
    pub fn interpret(&self, group: &ProcessGroup) -> Result<GroupRequirements, ManifestError> {
        if group.nodes.is_empty() {
            return Err(ManifestError::Empty);
        }
        for &(from, to) in &group.edges {
            if from >= group.nodes.len() || to >= group.nodes.len() {
                return Err(ManifestError::DanglingEdge(from, to));
            }
        }

        let mut nodes = Vec::with_capacity(group.nodes.len());
        for (idx, node) in group.nodes.iter().enumerate() {
            let cell = self.resolve_cell(idx, node.cell.as_deref(), node.cell_type.as_deref())?;

            let mut units = Vec::new();
            for (name, &count) in &node.channels {
                let id = self
                    .hw
                    .channel_by_name(name)
                    .ok_or_else(|| ManifestError::UnknownChannel {
                        node: idx,
                        name: name.clone(),
                    })?;
                if count > 0 {
                    units.push((ResourceClass::Channel(id), count));
                }
            }
            for (name, &count) in &node.memory {
                let id = self
                    .hw
                    .bank_by_name(name)
                    .ok_or_else(|| ManifestError::UnknownMemoryBank {
                        node: idx,
                        name: name.clone(),
                    })?;
                if count > 0 {
                    units.push((ResourceClass::MemoryBank(id), count));
                }
            }
            nodes.push(NodeRequest { cell, units });
        }

        let requirements = GroupRequirements { nodes };
        self.check_capacity(&requirements)?;
        Ok(requirements)
    }

    fn resolve_cell(
        &self,
        node: usize,
        cell: Option<&str>,
        cell_type: Option<&str>,
    ) -> Result<Option<CellRequest>, ManifestError> {
        let wanted_type = cell_type
            .map(|name| {
                self.hw
                    .cell_type_by_name(name)
                    .ok_or_else(|| ManifestError::UnknownCellType {
                        node,
                        name: name.to_string(),
                    })
            })
            .transpose()?;

        match cell {
            Some(name) => {
                let id = self
                    .hw
                    .cell_by_name(name)
                    .ok_or_else(|| ManifestError::UnknownCell {
                        node,
                        name: name.to_string(),
                    })?;
                if let (Some(wanted), Some(desc)) = (wanted_type, self.hw.cell(id)) {
                    if desc.cell_type != wanted {
                        return Err(ManifestError::TypeMismatch {
                            node,
                            cell: name.to_string(),
                            cell_type: cell_type.unwrap_or_default().to_string(),
                        });
                    }
                }
                Ok(Some(CellRequest::Pinned(id)))
            }
            None => Ok(wanted_type.map(CellRequest::OfType)),
        }
    }

    /// Compare summed demand against the whole machine. Anything over can never run.
    fn check_capacity(&self, requirements: &GroupRequirements) -> Result<(), ManifestError> {
        let mut demand: BTreeMap<Demand, u64> = BTreeMap::new();
        for node in requirements.nodes() {
            match node.cell {
                Some(CellRequest::Pinned(id)) => {
                    *demand.entry(Demand::Cell(id)).or_default() += 1;
                    if let Some(desc) = self.hw.cell(id) {
                        *demand.entry(Demand::CellType(desc.cell_type)).or_default() += 1;
                    }
                }
                Some(CellRequest::OfType(t)) => {
                    *demand.entry(Demand::CellType(t)).or_default() += 1;
                }
                None => {}
            }
            for &(class, units) in &node.units {
                let key = match class {
                    ResourceClass::Channel(id) => Demand::Channel(id),
                    ResourceClass::MemoryBank(id) => Demand::MemoryBank(id),
                    ResourceClass::Cell => continue,
                };
                *demand.entry(key).or_default() += units as u64;
            }
        }

        for (key, requested) in demand {
            let capacity = match key {
                Demand::Cell(_) => 1,
                Demand::CellType(t) => self.hw.cells_of_type(t) as u32,
                Demand::Channel(id) => self.hw.channel(id).map_or(0, |c| c.capacity),
                Demand::MemoryBank(id) => self.hw.memory_bank(id).map_or(0, |b| b.capacity),
            };
            if requested > capacity as u64 {
                return Err(ManifestError::Impossible {
                    demand: key,
                    requested: requested.min(u32::MAX as u64) as u32,
                    capacity,
                });
            }
        }
        Ok(())
    }
}
