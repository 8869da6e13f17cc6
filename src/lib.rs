pub mod config;
pub mod error;
pub mod heuristic;
pub mod puzzle;
pub mod reference;
pub mod search;
pub mod solver;
pub mod tables;

pub use config::{HeuristicKind, SolverConfig};
pub use error::{BoardError, ReferenceError, SolverError, SolverResult};
pub use heuristic::{AdditivePattern, Estimate, Heuristic, ManhattanDistance, WalkingDistance};
pub use puzzle::{Board, Direction};
pub use reference::{
    CanonicalKey, Fingerprint, InMemoryReferences, Inserted, ReferenceRecord, ReferenceStore,
    TimeoutReferences,
};
pub use search::{CancelToken, SearchStatus, MAX_MOVES};
pub use solver::{ReferenceUse, SolveStatus, Solution, Solver};
pub use tables::{PatternDatabase, PatternPartition, WalkingDistanceTables};
