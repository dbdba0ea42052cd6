//! Resolved hardware description table.
//!
//! [`HardwareDescription`] is the validated, index-addressed form of the
//! `[hardware]` config section. Resource ids are positions in the table, so
//! the same id always names the same unit for the lifetime of the engine.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::HardwareConfig;
use crate::error::CoreError;

/// Index of an execution cell in the cell table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub u16);

/// Interned cell type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellTypeId(pub u8);

/// Index of a device-channel class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelClassId(pub u8);

/// Index of an external memory bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BankId(pub u8);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

impl fmt::Display for ChannelClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel#{}", self.0)
    }
}

impl fmt::Display for BankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bank#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellDesc {
    pub id: CellId,
    pub name: String,
    pub cell_type: CellTypeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDesc {
    pub id: ChannelClassId,
    pub name: String,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankDesc {
    pub id: BankId,
    pub name: String,
    pub capacity: u32,
}

/// Immutable description of the processing system's resources.
#[derive(Debug, Clone)]
pub struct HardwareDescription {
    cells: Vec<CellDesc>,
    cell_types: Vec<String>,
    channels: Vec<ChannelDesc>,
    memory_banks: Vec<BankDesc>,
    cell_names: HashMap<String, CellId>,
    type_names: HashMap<String, CellTypeId>,
    channel_names: HashMap<String, ChannelClassId>,
    bank_names: HashMap<String, BankId>,
}

impl HardwareDescription {
    /// Validate a hardware config section and resolve it into an indexed table.
    pub fn from_config(config: &HardwareConfig) -> Result<Self, CoreError> {
        config.validate()?;

        let mut cell_types: Vec<String> = Vec::new();
        let mut type_names: HashMap<String, CellTypeId> = HashMap::new();
        let mut cells = Vec::with_capacity(config.cells.len());
        let mut cell_names = HashMap::with_capacity(config.cells.len());

        for (idx, cell) in config.cells.iter().enumerate() {
            let cell_type = match type_names.get(&cell.cell_type) {
                Some(t) => *t,
                None => {
                    if cell_types.len() > u8::MAX as usize {
                        return Err(CoreError::Config(
                            "hardware.cells declares more than 256 distinct cell types".into(),
                        ));
                    }
                    let t = CellTypeId(cell_types.len() as u8);
                    cell_types.push(cell.cell_type.clone());
                    type_names.insert(cell.cell_type.clone(), t);
                    t
                }
            };
            let id = CellId(idx as u16);
            cell_names.insert(cell.name.clone(), id);
            cells.push(CellDesc {
                id,
                name: cell.name.clone(),
                cell_type,
            });
        }

        let channels: Vec<ChannelDesc> = config
            .channels
            .iter()
            .enumerate()
            .map(|(idx, c)| ChannelDesc {
                id: ChannelClassId(idx as u8),
                name: c.name.clone(),
                capacity: c.capacity,
            })
            .collect();
        let channel_names = channels.iter().map(|c| (c.name.clone(), c.id)).collect();

        let memory_banks: Vec<BankDesc> = config
            .memory_banks
            .iter()
            .enumerate()
            .map(|(idx, b)| BankDesc {
                id: BankId(idx as u8),
                name: b.name.clone(),
                capacity: b.capacity,
            })
            .collect();
        let bank_names = memory_banks.iter().map(|b| (b.name.clone(), b.id)).collect();

        Ok(Self {
            cells,
            cell_types,
            channels,
            memory_banks,
            cell_names,
            type_names,
            channel_names,
            bank_names,
        })
    }

    pub fn cells(&self) -> &[CellDesc] {
        &self.cells
    }

    pub fn channels(&self) -> &[ChannelDesc] {
        &self.channels
    }

    pub fn memory_banks(&self) -> &[BankDesc] {
        &self.memory_banks
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, id: CellId) -> Option<&CellDesc> {
        self.cells.get(id.0 as usize)
    }

    pub fn channel(&self, id: ChannelClassId) -> Option<&ChannelDesc> {
        self.channels.get(id.0 as usize)
    }

    pub fn memory_bank(&self, id: BankId) -> Option<&BankDesc> {
        self.memory_banks.get(id.0 as usize)
    }

    pub fn cell_by_name(&self, name: &str) -> Option<CellId> {
        self.cell_names.get(name).copied()
    }

    pub fn cell_type_by_name(&self, name: &str) -> Option<CellTypeId> {
        self.type_names.get(name).copied()
    }

    pub fn channel_by_name(&self, name: &str) -> Option<ChannelClassId> {
        self.channel_names.get(name).copied()
    }

    pub fn bank_by_name(&self, name: &str) -> Option<BankId> {
        self.bank_names.get(name).copied()
    }

    /// Human-readable name of an interned cell type.
    pub fn cell_type_name(&self, id: CellTypeId) -> Option<&str> {
        self.cell_types.get(id.0 as usize).map(String::as_str)
    }

    /// Number of cells declared with the given type.
    pub fn cells_of_type(&self, cell_type: CellTypeId) -> usize {
        self.cells.iter().filter(|c| c.cell_type == cell_type).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HardwareConfig {
        HardwareConfig::default()
            .with_cell("sp0", "scalar")
            .with_cell("vp0", "vector")
            .with_cell("vp1", "vector")
            .with_channel("dma_ext0", 30)
            .with_memory_bank("vmem0", 64)
    }

    #[test]
    fn ids_follow_table_order() {
        let hw = HardwareDescription::from_config(&sample()).unwrap();
        assert_eq!(hw.cell_by_name("vp1"), Some(CellId(2)));
        assert_eq!(hw.channel_by_name("dma_ext0"), Some(ChannelClassId(0)));
        assert_eq!(hw.bank_by_name("vmem0"), Some(BankId(0)));
        assert_eq!(hw.cell_count(), 3);
    }

    #[test]
    fn cell_types_are_interned() {
        let hw = HardwareDescription::from_config(&sample()).unwrap();
        let vector = hw.cell_type_by_name("vector").unwrap();
        assert_eq!(hw.cell(CellId(1)).unwrap().cell_type, vector);
        assert_eq!(hw.cell(CellId(2)).unwrap().cell_type, vector);
        assert_eq!(hw.cells_of_type(vector), 2);
        assert_eq!(hw.cell_type_name(vector), Some("vector"));
        assert_eq!(hw.cell_type_by_name("fixed"), None);
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(HardwareDescription::from_config(&HardwareConfig::default()).is_err());
    }
}
