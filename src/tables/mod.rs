pub mod pattern;
pub mod walking;

pub use pattern::{PatternDatabase, PatternPartition, MAX_GROUPS, MAX_GROUP_TILES};
pub use walking::{LinkDirection, WalkingDistanceTables};
