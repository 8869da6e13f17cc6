use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::{HeuristicKind, SolverConfig};
use crate::error::{ReferenceError, SolverError, SolverResult};
use crate::heuristic::{AdditivePattern, Estimate, Heuristic, ManhattanDistance, WalkingDistance};
use crate::puzzle::{Board, Direction};
use crate::reference::{CanonicalKey, Inserted, ReferenceRecord, ReferenceStore, TimeoutReferences};
use crate::search::{CancelToken, Search, SearchLimits, SearchPlan, SearchReport, SearchStatus};
use crate::tables::{PatternDatabase, WalkingDistanceTables};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Solved,
    TimedOut,
    Unsolvable,
    Cancelled,
    Exhausted,
}

impl From<SearchStatus> for SolveStatus {
    fn from(status: SearchStatus) -> Self {
        match status {
            SearchStatus::Solved => SolveStatus::Solved,
            SearchStatus::TimedOut => SolveStatus::TimedOut,
            SearchStatus::Cancelled => SolveStatus::Cancelled,
            SearchStatus::Exhausted => SolveStatus::Exhausted,
        }
    }
}

/// How the reference collection took part in a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceUse {
    None,
    /// A stored distance became the first bound
    Estimate,
    /// A stored prefix was replayed and only the rest searched
    Prefix,
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub status: SolveStatus,
    pub moves: Vec<Direction>,
    pub nodes: u64,
    pub elapsed: Duration,
    /// Solution length when solved, otherwise the last fully searched bound
    pub depth: u8,
    /// Standard estimate of the start board
    pub estimate: Option<u8>,
    pub reference: ReferenceUse,
    pub added_reference: bool,
}

impl Solution {
    pub fn is_solved(&self) -> bool {
        self.status == SolveStatus::Solved
    }

    fn unsolvable(elapsed: Duration) -> Self {
        Self {
            status: SolveStatus::Unsolvable,
            moves: Vec::new(),
            nodes: 0,
            elapsed,
            depth: 0,
            estimate: None,
            reference: ReferenceUse::None,
            added_reference: false,
        }
    }
}

enum Evaluator {
    Walking(WalkingDistance),
    Pattern(AdditivePattern),
    Manhattan(ManhattanDistance),
}

impl Evaluator {
    fn name(&self) -> &'static str {
        match self {
            Evaluator::Walking(h) => h.name(),
            Evaluator::Pattern(h) => h.name(),
            Evaluator::Manhattan(h) => h.name(),
        }
    }

    fn lower_bound(&self, board: &Board) -> SolverResult<Estimate> {
        match self {
            Evaluator::Walking(h) => h.lower_bound(board),
            Evaluator::Pattern(h) => h.lower_bound(board),
            Evaluator::Manhattan(h) => h.lower_bound(board),
        }
    }

    fn reads_references(&self) -> bool {
        !matches!(self, Evaluator::Walking(_))
    }

    // Manhattan solvers only read the collection
    fn writes_references(&self) -> bool {
        matches!(self, Evaluator::Pattern(_))
    }
}

pub struct Solver {
    config: SolverConfig,
    evaluator: Evaluator,
    references: Option<Arc<dyn ReferenceStore>>,
    advanced: AtomicBool,
    timeout_enabled: AtomicBool,
    degraded: AtomicBool,
    last: Mutex<Option<(Board, Estimate)>>,
}

impl Solver {
    pub fn walking(config: SolverConfig, tables: Arc<WalkingDistanceTables>) -> SolverResult<Self> {
        Self::new(config, Evaluator::Walking(WalkingDistance::new(tables)))
    }

    /// The database's own partition wins over `config.pattern`.
    pub fn pattern(config: SolverConfig, database: Arc<PatternDatabase>) -> SolverResult<Self> {
        Self::new(config, Evaluator::Pattern(AdditivePattern::new(database)))
    }

    /// Manhattan distance, with linear conflicts when `config.linear_conflict` is set.
    pub fn manhattan(config: SolverConfig) -> SolverResult<Self> {
        let heuristic = ManhattanDistance::new(config.linear_conflict);
        Self::new(config, Evaluator::Manhattan(heuristic))
    }

    /// Builds the tables the configuration asks for.
    pub fn from_config(config: SolverConfig) -> SolverResult<Self> {
        config.validate()?;
        let started = Instant::now();
        let solver = match config.heuristic {
            HeuristicKind::WalkingDistance => {
                let tables = Arc::new(WalkingDistanceTables::build());
                Self::walking(config, tables)?
            }
            HeuristicKind::PatternDatabase => {
                let database = Arc::new(PatternDatabase::build(config.pattern.clone())?);
                Self::pattern(config, database)?
            }
            HeuristicKind::Manhattan => Self::manhattan(config)?,
        };
        info!(
            heuristic = solver.heuristic_name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tables ready"
        );
        Ok(solver)
    }

    fn new(config: SolverConfig, evaluator: Evaluator) -> SolverResult<Self> {
        config.validate()?;
        Ok(Self {
            advanced: AtomicBool::new(config.advanced),
            timeout_enabled: AtomicBool::new(true),
            config,
            evaluator,
            references: None,
            degraded: AtomicBool::new(false),
            last: Mutex::new(None),
        })
    }

    /// Attaches a reference collection. Calls are bounded by
    /// `reference_timeout_ms` when it is set.
    pub fn with_references(mut self, store: Arc<dyn ReferenceStore>) -> Self {
        let store: Arc<dyn ReferenceStore> = match self.config.reference_timeout() {
            Some(timeout) => Arc::new(TimeoutReferences::new(store, timeout)),
            None => store,
        };
        self.references = Some(store);
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn heuristic_name(&self) -> &'static str {
        self.evaluator.name()
    }

    /// Turns reference lookups during solves on or off, returning the old setting.
    /// Slow solves are still offered to the collection either way.
    pub fn set_advanced(&self, on: bool) -> bool {
        self.advanced.swap(on, Ordering::Relaxed)
    }

    pub fn advanced(&self) -> bool {
        self.advanced.load(Ordering::Relaxed)
    }

    /// Turns the configured search timeout on or off, returning the old setting.
    pub fn set_timeout_enabled(&self, on: bool) -> bool {
        self.timeout_enabled.swap(on, Ordering::Relaxed)
    }

    pub fn timeout_enabled(&self) -> bool {
        self.timeout_enabled.load(Ordering::Relaxed)
    }

    /// Table-based lower bound. Repeating the previous board skips the evaluation.
    pub fn heuristic_standard(&self, board: &Board) -> SolverResult<Estimate> {
        if !board.solvable() {
            return Ok(Estimate::Unsolvable);
        }
        if let Some((cached, estimate)) = self.last.lock().as_ref() {
            if cached == board {
                return Ok(*estimate);
            }
        }

        let estimate = self.evaluator.lower_bound(board)?;
        *self.last.lock() = Some((board.clone(), estimate));
        Ok(estimate)
    }

    /// Exact distance when the reference collection knows the board,
    /// otherwise the standard estimate.
    pub fn heuristic_advanced(&self, board: &Board) -> SolverResult<Estimate> {
        let standard = self.heuristic_standard(board)?;
        let Estimate::Cost(cost) = standard else {
            return Ok(standard);
        };
        if !self.evaluator.reads_references() {
            return Ok(standard);
        }
        let key = CanonicalKey::of(board);
        Ok(match self.lookup(&key, cost) {
            Some(record) => Estimate::Cost(record.distance),
            None => standard,
        })
    }

    pub fn solve(&self, board: &Board) -> SolverResult<Solution> {
        self.solve_with_cancel(board, &CancelToken::new())
    }

    /// Solves `board` optimally. A panic inside the search fails this request
    /// only; the shared tables are never written after construction.
    pub fn solve_with_cancel(&self, board: &Board, cancel: &CancelToken) -> SolverResult<Solution> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.solve_inner(board, cancel))) {
            Ok(result) => result,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(SolverError::Internal(format!("search panicked: {message}")))
            }
        }
    }

    fn solve_inner(&self, board: &Board, cancel: &CancelToken) -> SolverResult<Solution> {
        let started = Instant::now();
        let standard = match self.heuristic_standard(board)? {
            Estimate::Cost(cost) => cost,
            Estimate::Unsolvable => {
                info!(%board, "board is unsolvable");
                return Ok(Solution::unsolvable(started.elapsed()));
            }
        };

        let mut solution = match &self.evaluator {
            Evaluator::Walking(h) => {
                let report = self.search(h, board, SearchPlan::from_bound(standard), cancel, started)?;
                Self::to_solution(report, standard, ReferenceUse::None)
            }
            Evaluator::Pattern(h) => self.solve_with_references(h, board, standard, cancel, started)?,
            Evaluator::Manhattan(h) => self.solve_with_references(h, board, standard, cancel, started)?,
        };
        solution.elapsed = started.elapsed();

        if solution.is_solved() {
            let reaches_goal = board
                .apply_all(&solution.moves)
                .map(|end| end.is_goal())
                .unwrap_or(false);
            if !reaches_goal {
                return Err(SolverError::Internal(format!(
                    "{} moves returned for\n{board}do not reach the goal",
                    solution.moves.len()
                )));
            }
        }

        info!(
            heuristic = self.heuristic_name(),
            status = ?solution.status,
            moves = solution.moves.len(),
            estimate = standard,
            nodes = solution.nodes,
            elapsed_ms = solution.elapsed.as_millis() as u64,
            reference = ?solution.reference,
            "solve finished"
        );
        Ok(solution)
    }

    fn solve_with_references<H: Heuristic>(
        &self,
        heuristic: &H,
        board: &Board,
        standard: u8,
        cancel: &CancelToken,
        started: Instant,
    ) -> SolverResult<Solution> {
        let key = CanonicalKey::of(board);
        let hit = if self.advanced() {
            self.lookup(&key, standard)
        } else {
            None
        };

        let mut solution = match &hit {
            Some(record) if !record.prefix.is_empty() => {
                let (replayed, nodes) = self.replay_prefix(heuristic, board, standard, &key, record, cancel, started)?;
                match replayed {
                    Some(solution) => solution,
                    None => {
                        let mut solution = self.solve_from_distance(heuristic, board, standard, record, cancel, started)?;
                        solution.nodes += nodes;
                        solution
                    }
                }
            }
            Some(record) => self.solve_from_distance(heuristic, board, standard, record, cancel, started)?,
            None => {
                let report = self.search(heuristic, board, SearchPlan::from_bound(standard), cancel, started)?;
                Self::to_solution(report, standard, ReferenceUse::None)
            }
        };

        if hit.is_none()
            && self.evaluator.writes_references()
            && solution.is_solved()
            && started.elapsed() > self.config.reference_cutoff()
        {
            solution.added_reference = self.remember(&key, &solution.moves);
        }
        Ok(solution)
    }

    fn solve_from_distance<H: Heuristic>(
        &self,
        heuristic: &H,
        board: &Board,
        standard: u8,
        record: &ReferenceRecord,
        cancel: &CancelToken,
        started: Instant,
    ) -> SolverResult<Solution> {
        let plan = SearchPlan {
            start_bound: record.distance,
            warm_up_from: Some(standard),
            forbidden: None,
        };
        let report = self.search(heuristic, board, plan, cancel, started)?;
        Ok(Self::to_solution(report, standard, ReferenceUse::Estimate))
    }

    /// Replays a stored prefix and searches the rest at its exact remaining
    /// depth. Returns `None` when the shortcut does not hold up, along with
    /// the nodes spent finding out.
    #[allow(clippy::too_many_arguments)]
    fn replay_prefix<H: Heuristic>(
        &self,
        heuristic: &H,
        board: &Board,
        standard: u8,
        key: &CanonicalKey,
        record: &ReferenceRecord,
        cancel: &CancelToken,
        started: Instant,
    ) -> SolverResult<(Option<Solution>, u64)> {
        let prefix = key.orient(&record.prefix);
        let middle = match board.apply_all(&prefix) {
            Ok(middle) => middle,
            Err(e) => {
                warn!(error = %e, "stored prefix does not fit the board, ignoring it");
                return Ok((None, 0));
            }
        };
        let remaining = record.distance - prefix.len() as u8;
        let plan = SearchPlan {
            start_bound: remaining,
            warm_up_from: None,
            forbidden: prefix.last().map(|last| last.opposite()),
        };
        let report = self.search(heuristic, &middle, plan, cancel, started)?;

        match report.status {
            SearchStatus::Solved if report.moves.len() == remaining as usize => {
                let mut solution = Self::to_solution(report, standard, ReferenceUse::Prefix);
                let mut moves = prefix;
                moves.append(&mut solution.moves);
                solution.moves = moves;
                solution.depth = record.distance;
                Ok((Some(solution), 0))
            }
            SearchStatus::TimedOut | SearchStatus::Cancelled => {
                Ok((Some(Self::to_solution(report, standard, ReferenceUse::Prefix)), 0))
            }
            _ => {
                warn!(
                    distance = record.distance,
                    found = report.moves.len() + prefix.len(),
                    "stored prefix did not lead to a solution of the recorded length, searching in full"
                );
                Ok((None, report.nodes))
            }
        }
    }

    fn search<H: Heuristic>(
        &self,
        heuristic: &H,
        board: &Board,
        plan: SearchPlan,
        cancel: &CancelToken,
        started: Instant,
    ) -> SolverResult<SearchReport> {
        Search::new(heuristic, self.limits_after(started)).run(board, plan, cancel)
    }

    // the timeout covers the whole request, not each search inside it
    fn limits_after(&self, started: Instant) -> SearchLimits {
        let mut limits = self.config.limits();
        limits.timeout = if self.timeout_enabled() {
            limits.timeout.map(|t| t.saturating_sub(started.elapsed()))
        } else {
            None
        };
        limits
    }

    fn to_solution(report: SearchReport, standard: u8, reference: ReferenceUse) -> Solution {
        Solution {
            status: report.status.into(),
            moves: report.moves,
            nodes: report.nodes,
            elapsed: report.elapsed,
            depth: report.depth,
            estimate: Some(standard),
            reference,
            added_reference: false,
        }
    }

    /// A usable record for `key`, or `None` on a miss, a failed call or a
    /// record that cannot be the distance of a board with this estimate.
    fn lookup(&self, key: &CanonicalKey, standard: u8) -> Option<ReferenceRecord> {
        let store = self.references.as_ref()?;
        let record = match store.lookup(key.fingerprint) {
            Ok(record) => {
                self.recovered();
                record?
            }
            Err(e) => {
                self.degrade(&e);
                return None;
            }
        };

        let valid = record.distance >= standard
            && (record.distance - standard) % 2 == 0
            && record.distance <= self.config.max_moves
            && record.prefix.len() <= record.distance as usize;
        if !valid {
            warn!(
                fingerprint = key.fingerprint.0,
                distance = record.distance,
                prefix = record.prefix.len(),
                standard,
                "ignoring inconsistent reference record"
            );
            return None;
        }
        debug!(fingerprint = key.fingerprint.0, distance = record.distance, "reference hit");
        Some(record)
    }

    fn remember(&self, key: &CanonicalKey, moves: &[Direction]) -> bool {
        let Some(store) = self.references.as_ref() else {
            return false;
        };
        let take = moves.len().min(self.config.prefix_moves);
        let record = ReferenceRecord {
            distance: moves.len() as u8,
            prefix: key.orient(&moves[..take]),
        };
        match store.insert(key.fingerprint, record) {
            Ok(Inserted::New) => {
                self.recovered();
                info!(fingerprint = key.fingerprint.0, distance = moves.len(), "reference added");
                true
            }
            Ok(Inserted::AlreadyPresent) => {
                self.recovered();
                debug!(fingerprint = key.fingerprint.0, "reference already present");
                false
            }
            Err(e) => {
                self.degrade(&e);
                false
            }
        }
    }

    fn degrade(&self, error: &ReferenceError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(%error, "reference collection unavailable, continuing with the standard estimate");
        }
    }

    fn recovered(&self) {
        if self.degraded.swap(false, Ordering::Relaxed) {
            info!("reference collection available again");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{Fingerprint, InMemoryReferences};
    use crate::testing::{pattern_database, walking_tables};
    use rand::{rngs::StdRng, SeedableRng};

    struct BrokenStore;

    impl ReferenceStore for BrokenStore {
        fn lookup(&self, _: Fingerprint) -> Result<Option<ReferenceRecord>, ReferenceError> {
            Err(ReferenceError::Unavailable("offline".into()))
        }

        fn insert(&self, _: Fingerprint, _: ReferenceRecord) -> Result<Inserted, ReferenceError> {
            Err(ReferenceError::Unavailable("offline".into()))
        }

        fn size(&self) -> Result<usize, ReferenceError> {
            Err(ReferenceError::Unavailable("offline".into()))
        }
    }

    fn config() -> SolverConfig {
        SolverConfig {
            reference_cutoff_ms: 0,
            ..SolverConfig::default()
        }
    }

    fn pattern_solver() -> Solver {
        Solver::pattern(config(), pattern_database()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = SolverConfig {
            max_moves: 0,
            ..SolverConfig::default()
        };
        assert!(matches!(
            Solver::walking(config, walking_tables()),
            Err(SolverError::Config(_))
        ));
    }

    #[test]
    fn test_goal_and_unsolvable() {
        let solver = Solver::walking(config(), walking_tables()).unwrap();
        let goal = solver.solve(&Board::goal()).unwrap();
        assert!(goal.is_solved());
        assert!(goal.moves.is_empty());
        assert_eq!(goal.estimate, Some(0));

        let mut tiles = *Board::goal().tiles();
        tiles.swap(13, 14);
        let board = Board::new(&tiles).unwrap();
        assert_eq!(solver.solve(&board).unwrap().status, SolveStatus::Unsolvable);
        assert_eq!(solver.heuristic_advanced(&board).unwrap(), Estimate::Unsolvable);
    }

    #[test]
    fn test_repeated_board_uses_cached_estimate() {
        let solver = pattern_solver();
        let board = Board::scrambled(&mut StdRng::seed_from_u64(12), 40);
        let first = solver.heuristic_standard(&board).unwrap();
        assert_eq!(solver.last.lock().as_ref().map(|(b, _)| b.clone()), Some(board.clone()));
        assert_eq!(solver.heuristic_standard(&board).unwrap(), first);
    }

    #[test]
    fn test_slow_solve_is_recorded_with_prefix() {
        let store = Arc::new(InMemoryReferences::new());
        let solver = pattern_solver().with_references(store.clone());
        let board = Board::scrambled(&mut StdRng::seed_from_u64(21), 50);

        let first = solver.solve(&board).unwrap();
        assert!(first.is_solved());
        assert!(first.added_reference);
        assert_eq!(first.reference, ReferenceUse::None);

        let key = CanonicalKey::of(&board);
        let record = store.lookup(key.fingerprint).unwrap().unwrap();
        assert_eq!(record.distance as usize, first.moves.len());
        assert_eq!(key.orient(&record.prefix), first.moves[..record.prefix.len()]);

        let advanced = solver.heuristic_advanced(&board).unwrap();
        assert_eq!(advanced, Estimate::Cost(first.moves.len() as u8));

        let second = solver.solve(&board).unwrap();
        assert_eq!(second.reference, ReferenceUse::Prefix);
        assert!(!second.added_reference);
        assert_eq!(second.moves.len(), first.moves.len());
        assert_eq!(store.size().unwrap(), 1);
    }

    #[test]
    fn test_inconsistent_record_is_ignored() {
        let store = Arc::new(InMemoryReferences::new());
        let board = Board::scrambled(&mut StdRng::seed_from_u64(30), 40);
        let key = CanonicalKey::of(&board);
        let solver = pattern_solver().with_references(store.clone());
        let standard = solver.heuristic_standard(&board).unwrap().cost().unwrap();

        // wrong parity
        store
            .insert(
                key.fingerprint,
                ReferenceRecord {
                    distance: standard + 1,
                    prefix: Vec::new(),
                },
            )
            .unwrap();
        assert_eq!(solver.heuristic_advanced(&board).unwrap(), Estimate::Cost(standard));

        let solution = solver.solve(&board).unwrap();
        assert!(solution.is_solved());
        assert_eq!(solution.reference, ReferenceUse::None);
    }

    #[test]
    fn test_bad_prefix_falls_back_to_full_search() {
        let store = Arc::new(InMemoryReferences::new());
        let board = Board::scrambled(&mut StdRng::seed_from_u64(31), 40);
        let solver = pattern_solver().with_references(store.clone());
        let exact = Solver::walking(SolverConfig::default(), walking_tables())
            .unwrap()
            .solve(&board)
            .unwrap()
            .moves
            .len() as u8;

        // a prefix that wanders off the board
        let key = CanonicalKey::of(&board);
        store
            .insert(
                key.fingerprint,
                ReferenceRecord {
                    distance: exact,
                    prefix: vec![Direction::Up; 4],
                },
            )
            .unwrap();
        let solution = solver.solve(&board).unwrap();
        assert!(solution.is_solved());
        assert_eq!(solution.moves.len(), exact as usize);
        assert_eq!(solution.reference, ReferenceUse::Estimate);
    }

    #[test]
    fn test_broken_store_degrades_and_still_solves() {
        let solver = pattern_solver().with_references(Arc::new(BrokenStore));
        let board = Board::scrambled(&mut StdRng::seed_from_u64(40), 40);
        for _ in 0..2 {
            let solution = solver.solve(&board).unwrap();
            assert!(solution.is_solved());
            assert!(!solution.added_reference);
            assert!(solver.degraded.load(Ordering::Relaxed));
        }
    }

    #[test]
    fn test_walking_distance_ignores_references() {
        let store = Arc::new(InMemoryReferences::new());
        let solver = Solver::walking(config(), walking_tables())
            .unwrap()
            .with_references(store.clone());
        let board = Board::scrambled(&mut StdRng::seed_from_u64(41), 40);
        let solution = solver.solve(&board).unwrap();
        assert!(solution.is_solved());
        assert!(!solution.added_reference);
        assert_eq!(store.size().unwrap(), 0);
    }

    #[test]
    fn test_cancelled_solve_reports_status() {
        let solver = pattern_solver();
        let cancel = CancelToken::new();
        cancel.cancel();
        let board = Board::scrambled(&mut StdRng::seed_from_u64(42), 60);
        let solution = solver.solve_with_cancel(&board, &cancel).unwrap();
        assert_eq!(solution.status, SolveStatus::Cancelled);
        assert!(solution.moves.is_empty());
    }

    #[test]
    fn test_panicking_search_fails_only_that_request() {
        let solver = Solver::walking(config(), Arc::new(walking_tables().with_links_cut())).unwrap();
        let board = Board::goal().apply(Direction::Left).unwrap();
        assert!(matches!(solver.solve(&board), Err(SolverError::Internal(_))));

        assert_eq!(solver.heuristic_standard(&board).unwrap(), Estimate::Cost(1));
        assert!(solver.solve(&Board::goal()).unwrap().is_solved());
    }

    #[test]
    fn test_moves_that_miss_the_goal_are_rejected() {
        let solver = Solver::walking(config(), Arc::new(walking_tables().with_distances_zeroed())).unwrap();
        let board = Board::goal().apply(Direction::Left).unwrap();
        assert!(matches!(solver.solve(&board), Err(SolverError::Internal(_))));

        let goal = solver.solve(&Board::goal()).unwrap();
        assert!(goal.is_solved());
        assert!(goal.moves.is_empty());
    }

    #[test]
    fn test_standard_mode_skips_lookups() {
        let store = Arc::new(InMemoryReferences::new());
        let board = Board::scrambled(&mut StdRng::seed_from_u64(44), 40);
        let solver = pattern_solver().with_references(store.clone());
        let exact = solver.solve(&board).unwrap().moves.len() as u8;
        assert_eq!(store.size().unwrap(), 1);

        assert!(solver.set_advanced(false));
        assert!(!solver.advanced());
        let standard = solver.solve(&board).unwrap();
        assert_eq!(standard.reference, ReferenceUse::None);
        assert_eq!(standard.moves.len(), exact as usize);
        assert!(!standard.added_reference);
        // the explicit advanced estimate still reads the collection
        assert_eq!(solver.heuristic_advanced(&board).unwrap(), Estimate::Cost(exact));

        assert!(!solver.set_advanced(true));
        assert_eq!(solver.solve(&board).unwrap().reference, ReferenceUse::Prefix);
    }

    #[test]
    fn test_advanced_flag_comes_from_config() {
        let config = SolverConfig {
            advanced: false,
            ..config()
        };
        let store = Arc::new(InMemoryReferences::new());
        let solver = Solver::pattern(config, pattern_database())
            .unwrap()
            .with_references(store.clone());
        assert!(!solver.advanced());

        // lookups are off but slow solves are still recorded
        let board = Board::scrambled(&mut StdRng::seed_from_u64(45), 40);
        let solution = solver.solve(&board).unwrap();
        assert!(solution.added_reference);
        assert_eq!(solver.solve(&board).unwrap().reference, ReferenceUse::None);
    }

    #[test]
    fn test_timeout_can_be_switched_off() {
        let config = SolverConfig {
            search_timeout_ms: Some(0),
            ..config()
        };
        let solver = Solver::pattern(config, pattern_database()).unwrap();
        assert!(solver.timeout_enabled());

        let mut rng = StdRng::seed_from_u64(46);
        let board = (0..50)
            .map(|_| Board::scrambled(&mut rng, 70))
            .find(|board| solver.solve(board).unwrap().status == SolveStatus::TimedOut)
            .unwrap();

        assert!(solver.set_timeout_enabled(false));
        let solution = solver.solve(&board).unwrap();
        assert!(solution.is_solved());

        solver.set_timeout_enabled(true);
        assert_eq!(solver.solve(&board).unwrap().status, SolveStatus::TimedOut);
    }

    #[test]
    fn test_manhattan_reads_but_never_writes_references() {
        let store = Arc::new(InMemoryReferences::new());
        let solver = Solver::manhattan(config()).unwrap().with_references(store.clone());
        assert_eq!(solver.heuristic_name(), "manhattan distance with linear conflicts");
        let board = Board::scrambled(&mut StdRng::seed_from_u64(47), 30);

        let first = solver.solve(&board).unwrap();
        assert!(first.is_solved());
        assert!(!first.added_reference);
        assert_eq!(store.size().unwrap(), 0);
        assert_eq!(first.moves.len(), pattern_solver().solve(&board).unwrap().moves.len());

        let key = CanonicalKey::of(&board);
        store
            .insert(
                key.fingerprint,
                ReferenceRecord {
                    distance: first.moves.len() as u8,
                    prefix: key.orient(&first.moves[..4.min(first.moves.len())]),
                },
            )
            .unwrap();
        assert_eq!(
            solver.heuristic_advanced(&board).unwrap(),
            Estimate::Cost(first.moves.len() as u8)
        );
        let second = solver.solve(&board).unwrap();
        assert_eq!(second.reference, ReferenceUse::Prefix);
        assert_eq!(second.moves.len(), first.moves.len());
    }
}
