#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use fifteen_solver::{PatternDatabase, PatternPartition, Solver, SolverConfig, WalkingDistanceTables};

/// One of the boards 80 moves from the goal.
pub const HARDEST: [u8; 16] = [0, 12, 9, 13, 15, 11, 10, 14, 3, 7, 2, 5, 4, 8, 6, 1];

static WALKING: OnceLock<Arc<WalkingDistanceTables>> = OnceLock::new();
static PATTERN_555: OnceLock<Arc<PatternDatabase>> = OnceLock::new();
static PATTERN_78: OnceLock<Arc<PatternDatabase>> = OnceLock::new();

pub fn walking_tables() -> Arc<WalkingDistanceTables> {
    WALKING
        .get_or_init(|| Arc::new(WalkingDistanceTables::build()))
        .clone()
}

pub fn pattern_555() -> Arc<PatternDatabase> {
    PATTERN_555
        .get_or_init(|| Arc::new(PatternDatabase::build(PatternPartition::Pattern555).unwrap()))
        .clone()
}

/// Several gigabytes while building; only the ignored 80-move tests use it.
pub fn pattern_78() -> Arc<PatternDatabase> {
    PATTERN_78
        .get_or_init(|| Arc::new(PatternDatabase::build(PatternPartition::Pattern78).unwrap()))
        .clone()
}

/// Every solve counts as slow, so each one is offered to the collection.
pub fn eager_config() -> SolverConfig {
    SolverConfig {
        reference_cutoff_ms: 0,
        ..SolverConfig::default()
    }
}

pub fn walking_solver() -> Solver {
    Solver::walking(eager_config(), walking_tables()).unwrap()
}

pub fn pattern_solver() -> Solver {
    Solver::pattern(eager_config(), pattern_555()).unwrap()
}
