//! Node consumers.
//!
//! Each plugin walks a loaded `PoolImage`, picks the nodes whose flags match
//! its mask, and decodes their payload overlay. Per-node failures are
//! collected as `Skip` entries and the walk continues.

pub mod chunks;
pub mod hints;
