//! Resource pools: bitmap allocators for cells, device channels and memory banks.
//!
//! Two [`ResourcePool`]s exist, one per [`Tier`]. A [`Grant`] lives in
//! exactly one of them and moves between them atomically on promotion.

pub mod bitmap;
pub mod grant;
pub mod pool;
pub mod request;


pub use bitmap::Bitmap;
pub use grant::{Extent, Grant, ResourceClass, Tier};
pub use pool::{PoolOccupancy, ResourcePool, ResourcePools};
pub use request::{CellRequest, NodeRequest};
