use std::fmt;

use psys_core::{BankId, CellId, ChannelClassId};
use serde::Serialize;

/// Capacity tier a grant is held in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Tier {
    /// Weaker reservation: resources held but not yet dispatchable for execution.
    Started,
    /// Strong reservation: the job may execute now.
    Running,
}

impl Tier {
    /// The other tier of the pair.
    pub fn sibling(self) -> Tier {
        match self {
            Tier::Started => Tier::Running,
            Tier::Running => Tier::Started,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Started => f.write_str("started"),
            Tier::Running => f.write_str("running"),
        }
    }
}

/// A bitmap-backed resource class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceClass {
    Cell,
    Channel(ChannelClassId),
    MemoryBank(BankId),
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceClass::Cell => f.write_str("cells"),
            ResourceClass::Channel(id) => write!(f, "{id}"),
            ResourceClass::MemoryBank(id) => write!(f, "{id}"),
        }
    }
}

/// A contiguous run of units within one resource class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Extent {
    pub class: ResourceClass,
    pub start: u32,
    pub len: u32,
}

/// Resources reserved for one job.
///
/// A grant is an owned, non-cloneable value: the only ways to get rid of it
/// are [`ResourcePools::free`](super::ResourcePools::free), which consumes it,
/// or moving it between tiers with
/// [`ResourcePools::move_grant`](super::ResourcePools::move_grant).
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a grant holds pool units until it is freed"]
pub struct Grant {
    tier: Tier,
    extents: Vec<Extent>,
}

impl Grant {
    pub(super) fn empty(tier: Tier) -> Self {
        Self {
            tier,
            extents: Vec::new(),
        }
    }

    pub(super) fn push(&mut self, extent: Extent) {
        self.extents.push(extent);
    }

    pub(super) fn set_tier(&mut self, tier: Tier) {
        self.tier = tier;
    }

    /// Fold another grant from the same tier into this one.
    pub(super) fn absorb(&mut self, other: Grant) {
        debug_assert_eq!(self.tier, other.tier);
        self.extents.extend(other.extents);
    }

    pub(super) fn into_extents(self) -> Vec<Extent> {
        self.extents
    }

    /// Tier whose bitmaps currently hold this grant's units.
    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn extents(&self) -> &[Extent] {
        &self.extents
    }

    /// Cells reserved by this grant, in allocation order.
    pub fn cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.extents
            .iter()
            .filter(|e| e.class == ResourceClass::Cell)
            .map(|e| CellId(e.start as u16))
    }

    /// Total units held in `class`.
    pub fn units(&self, class: ResourceClass) -> u32 {
        self.extents
            .iter()
            .filter(|e| e.class == class)
            .map(|e| e.len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }
}
