use std::sync::Arc;

use psys_core::{CellId, HardwareDescription};
use serde::Serialize;
use tracing::trace;

use crate::error::AllocError;

use super::bitmap::Bitmap;
use super::grant::{Extent, Grant, ResourceClass, Tier};
use super::request::{CellRequest, NodeRequest};

/// Bitmaps for one capacity tier.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    tier: Tier,
    cells: Bitmap,
    channels: Vec<Bitmap>,
    banks: Vec<Bitmap>,
}

/// Units in use per resource class for one tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolOccupancy {
    pub cells: usize,
    pub channels: Vec<usize>,
    pub memory_banks: Vec<usize>,
}

impl ResourcePool {
    fn new(tier: Tier, hw: &HardwareDescription) -> Self {
        Self {
            tier,
            cells: Bitmap::new(hw.cell_count()),
            channels: hw
                .channels()
                .iter()
                .map(|c| Bitmap::new(c.capacity as usize))
                .collect(),
            banks: hw
                .memory_banks()
                .iter()
                .map(|b| Bitmap::new(b.capacity as usize))
                .collect(),
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Bitmap backing a resource class, if the class exists.
    pub fn bitmap(&self, class: ResourceClass) -> Option<&Bitmap> {
        match class {
            ResourceClass::Cell => Some(&self.cells),
            ResourceClass::Channel(id) => self.channels.get(id.0 as usize),
            ResourceClass::MemoryBank(id) => self.banks.get(id.0 as usize),
        }
    }

    fn bitmap_mut(&mut self, class: ResourceClass) -> Option<&mut Bitmap> {
        match class {
            ResourceClass::Cell => Some(&mut self.cells),
            ResourceClass::Channel(id) => self.channels.get_mut(id.0 as usize),
            ResourceClass::MemoryBank(id) => self.banks.get_mut(id.0 as usize),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.cells.is_clear()
            && self.channels.iter().all(Bitmap::is_clear)
            && self.banks.iter().all(Bitmap::is_clear)
    }

    pub fn occupancy(&self) -> PoolOccupancy {
        PoolOccupancy {
            cells: self.cells.count_ones(),
            channels: self.channels.iter().map(Bitmap::count_ones).collect(),
            memory_banks: self.banks.iter().map(Bitmap::count_ones).collect(),
        }
    }
}

/// The started/running pool pair plus the cell table they allocate from.
///
/// All mutation goes through `&mut self`, so callers serialize access by
/// owning the pools inside a single lock.
#[derive(Debug, Clone)]
pub struct ResourcePools {
    hw: Arc<HardwareDescription>,
    started: ResourcePool,
    running: ResourcePool,
}

impl ResourcePools {
    /// Create empty pools sized from the hardware table.
    pub fn new(hw: Arc<HardwareDescription>) -> Self {
        let started = ResourcePool::new(Tier::Started, &hw);
        let running = ResourcePool::new(Tier::Running, &hw);
        Self {
            hw,
            started,
            running,
        }
    }

    pub fn hardware(&self) -> &HardwareDescription {
        &self.hw
    }

    pub fn pool(&self, tier: Tier) -> &ResourcePool {
        match tier {
            Tier::Started => &self.started,
            Tier::Running => &self.running,
        }
    }

    fn pool_mut(&mut self, tier: Tier) -> &mut ResourcePool {
        match tier {
            Tier::Started => &mut self.started,
            Tier::Running => &mut self.running,
        }
    }

    /// True when neither tier holds any unit.
    pub fn is_idle(&self) -> bool {
        self.started.is_idle() && self.running.is_idle()
    }

    /// Reserve `count` contiguous units of `class` in `tier`, first fit from index 0.
    ///
    /// A zero count yields an empty grant without touching the bitmap.
    pub fn allocate(&mut self, tier: Tier, class: ResourceClass, count: u32) -> Result<Grant, AllocError> {
        let mut grant = Grant::empty(tier);
        if count == 0 {
            return Ok(grant);
        }
        let map = self
            .pool_mut(tier)
            .bitmap_mut(class)
            .ok_or(AllocError::UnknownResource(class))?;
        let start = map
            .find_clear_run(count as usize)
            .ok_or(AllocError::Exhausted {
                tier,
                class,
                requested: count,
            })?;
        map.set_range(start, count as usize);
        trace!(%tier, %class, start, count, "allocated");
        grant.push(Extent {
            class,
            start: start as u32,
            len: count,
        });
        Ok(grant)
    }

    /// Reserve one execution cell in `tier`.
    ///
    /// For a type request, the first cell of that type that is free in
    /// `tier` and also free in the sibling tier wins; if every free
    /// candidate is held by the sibling, the lowest-indexed free candidate
    /// is taken. A pinned request only checks its one cell.
    pub fn allocate_cell(&mut self, tier: Tier, request: CellRequest) -> Result<Grant, AllocError> {
        let exhausted = AllocError::Exhausted {
            tier,
            class: ResourceClass::Cell,
            requested: 1,
        };
        let cell = match request {
            CellRequest::Pinned(id) => {
                if self.hw.cell(id).is_none() {
                    return Err(AllocError::UnknownResource(ResourceClass::Cell));
                }
                if self.pool(tier).cells.test(id.0 as usize) {
                    return Err(exhausted);
                }
                id
            }
            CellRequest::OfType(cell_type) => {
                let target = &self.pool(tier).cells;
                let sibling = &self.pool(tier.sibling()).cells;
                let mut fallback: Option<CellId> = None;
                let mut chosen: Option<CellId> = None;
                for desc in self.hw.cells().iter().filter(|c| c.cell_type == cell_type) {
                    let idx = desc.id.0 as usize;
                    if target.test(idx) {
                        continue;
                    }
                    if !sibling.test(idx) {
                        chosen = Some(desc.id);
                        break;
                    }
                    fallback.get_or_insert(desc.id);
                }
                chosen.or(fallback).ok_or(exhausted)?
            }
        };

        self.pool_mut(tier).cells.set_range(cell.0 as usize, 1);
        trace!(%tier, %cell, "allocated cell");
        let mut grant = Grant::empty(tier);
        grant.push(Extent {
            class: ResourceClass::Cell,
            start: cell.0 as u32,
            len: 1,
        });
        Ok(grant)
    }

    /// Reserve everything a process group needs in one tier.
    ///
    /// Pinned cells are taken first so a typed request cannot steal a cell
    /// another node hard-codes, then typed cells, then channel and bank
    /// ranges node by node. If any step fails, every unit granted by the
    /// earlier steps is released before the error is returned.
    pub fn allocate_group(&mut self, tier: Tier, nodes: &[NodeRequest]) -> Result<Grant, AllocError> {
        let mut grant = Grant::empty(tier);
        match self.allocate_group_steps(tier, nodes, &mut grant) {
            Ok(()) => Ok(grant),
            Err(e) => {
                self.free(grant);
                Err(e)
            }
        }
    }

    fn allocate_group_steps(&mut self, tier: Tier, nodes: &[NodeRequest], grant: &mut Grant) -> Result<(), AllocError> {
        let pinned = nodes
            .iter()
            .filter_map(|n| n.cell)
            .filter(|c| matches!(c, CellRequest::Pinned(_)));
        let typed = nodes
            .iter()
            .filter_map(|n| n.cell)
            .filter(|c| matches!(c, CellRequest::OfType(_)));
        for request in pinned.chain(typed) {
            grant.absorb(self.allocate_cell(tier, request)?);
        }
        for node in nodes {
            for &(class, count) in &node.units {
                grant.absorb(self.allocate(tier, class, count)?);
            }
        }
        Ok(())
    }

    /// Release every unit a grant covers, consuming it.
    pub fn free(&mut self, grant: Grant) {
        let tier = grant.tier();
        let pool = self.pool_mut(tier);
        for extent in grant.into_extents() {
            // Extents only come from this pool pair, so the class always exists.
            if let Some(map) = pool.bitmap_mut(extent.class) {
                map.clear_range(extent.start as usize, extent.len as usize);
            }
        }
        trace!(%tier, "freed grant");
    }

    /// Move a grant's units into `target`, updating the grant in place.
    ///
    /// Every unit is first re-validated as free in `target`; on the first
    /// conflict the call returns with neither pool nor grant modified.
    pub fn move_grant(&mut self, grant: &mut Grant, target: Tier) -> Result<(), AllocError> {
        let source = grant.tier();
        if source == target {
            return Ok(());
        }

        let dest = self.pool(target);
        for extent in grant.extents() {
            let map = dest
                .bitmap(extent.class)
                .ok_or(AllocError::UnknownResource(extent.class))?;
            let start = extent.start as usize;
            if let Some(index) = (start..start + extent.len as usize).find(|idx| map.test(*idx)) {
                return Err(AllocError::Conflict {
                    target,
                    class: extent.class,
                    index: index as u32,
                });
            }
        }

        for extent in grant.extents() {
            let (start, len) = (extent.start as usize, extent.len as usize);
            if let Some(map) = self.pool_mut(source).bitmap_mut(extent.class) {
                map.clear_range(start, len);
            }
            if let Some(map) = self.pool_mut(target).bitmap_mut(extent.class) {
                map.set_range(start, len);
            }
        }
        grant.set_tier(target);
        trace!(from = %source, to = %target, "moved grant");
        Ok(())
    }
}
