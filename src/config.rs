use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SolverError, SolverResult};
use crate::search::{SearchLimits, MAX_MOVES};
use crate::tables::PatternPartition;

/// Which estimator drives the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicKind {
    WalkingDistance,
    #[default]
    PatternDatabase,
    Manhattan,
}

/// Solver settings. Every field is optional in JSON; missing ones take the default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub heuristic: HeuristicKind,
    pub pattern: PatternPartition,
    /// Adds linear conflicts to the Manhattan estimate
    pub linear_conflict: bool,
    /// Consult and grow the reference collection; can be switched at runtime
    pub advanced: bool,
    /// No limit when absent
    pub search_timeout_ms: Option<u64>,
    /// Solves slower than this are added to the reference collection
    pub reference_cutoff_ms: u64,
    /// Number of leading moves stored with a reference record
    pub prefix_moves: usize,
    pub max_moves: u8,
    /// Reference calls run without a deadline when absent
    pub reference_timeout_ms: Option<u64>,
    pub warm_up_nodes: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            heuristic: HeuristicKind::PatternDatabase,
            pattern: PatternPartition::Pattern663,
            linear_conflict: true,
            advanced: true,
            search_timeout_ms: None,
            reference_cutoff_ms: 10_000,
            prefix_moves: 8,
            max_moves: MAX_MOVES,
            reference_timeout_ms: Some(2_000),
            warm_up_nodes: 10_000,
        }
    }
}

impl SolverConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> SolverResult<Self> {
        let config: Self = serde_json::from_slice(&fs::read(path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SolverResult<()> {
        if self.max_moves == 0 || self.max_moves > MAX_MOVES {
            return Err(SolverError::Config(format!(
                "max_moves must be between 1 and {MAX_MOVES}, got {}",
                self.max_moves
            )));
        }
        if self.prefix_moves > self.max_moves as usize {
            return Err(SolverError::Config(format!(
                "prefix_moves ({}) exceeds max_moves ({})",
                self.prefix_moves, self.max_moves
            )));
        }
        if self.reference_timeout_ms == Some(0) {
            return Err(SolverError::Config(
                "reference_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn search_timeout(&self) -> Option<Duration> {
        self.search_timeout_ms.map(Duration::from_millis)
    }

    pub fn reference_cutoff(&self) -> Duration {
        Duration::from_millis(self.reference_cutoff_ms)
    }

    pub fn reference_timeout(&self) -> Option<Duration> {
        self.reference_timeout_ms.map(Duration::from_millis)
    }

    pub fn limits(&self) -> SearchLimits {
        SearchLimits {
            timeout: self.search_timeout(),
            max_moves: self.max_moves,
            warm_up_nodes: self.warm_up_nodes,
        }
    }
}
