use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::SolverResult;
use crate::heuristic::Heuristic;
use crate::puzzle::{Board, Direction, CELLS, SYM_POS};

/// Subtree estimate reported once the search is over.
pub const END_OF_SEARCH: u8 = u8::MAX;

/// Longest optimal solution of any fifteen-puzzle board.
pub const MAX_MOVES: u8 = 80;

// the clock is read once per this many expanded nodes
const TIME_CHECK_MASK: u64 = 0xFFF;

/// Cooperative stop signal shared with whoever started the search.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    Solved,
    TimedOut,
    Cancelled,
    /// The bound passed the move ceiling without reaching the goal
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct SearchReport {
    pub status: SearchStatus,
    pub moves: Vec<Direction>,
    pub nodes: u64,
    pub elapsed: Duration,
    /// Solution length when solved, otherwise the last fully searched bound
    pub depth: u8,
    pub rounds: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    pub timeout: Option<Duration>,
    pub max_moves: u8,
    /// Warm-up rounds stop once any first move costs more nodes than this
    pub warm_up_nodes: u64,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            timeout: None,
            max_moves: MAX_MOVES,
            warm_up_nodes: 10_000,
        }
    }
}

/// Where a search starts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchPlan {
    /// Bound of the first real round, at least the root estimate
    pub start_bound: u8,
    /// Run ordering-only rounds from this bound up to `start_bound`
    pub warm_up_from: Option<u8>,
    /// First move the root may not make
    pub forbidden: Option<Direction>,
}

impl SearchPlan {
    pub fn from_bound(start_bound: u8) -> Self {
        Self {
            start_bound,
            ..Self::default()
        }
    }
}

/// Recent turns, two bits each: 01 clockwise, 10 counter-clockwise.
/// A sixth turn of one rotation is refused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Swirl(u16);

impl Swirl {
    const CLOCKWISE: u16 = 0b01;
    const COUNTER_CLOCKWISE: u16 = 0b10;
    const WINDOW: u16 = 0xFFF;
    const FULL_CLOCKWISE: u16 = 0b0101_0101_0101;
    const FULL_COUNTER_CLOCKWISE: u16 = 0b1010_1010_1010;

    fn turn(self, code: u16) -> Option<Self> {
        let next = (self.0 << 2 | code) & Self::WINDOW;
        if next == Self::FULL_CLOCKWISE || next == Self::FULL_COUNTER_CLOCKWISE {
            None
        } else {
            Some(Swirl(next))
        }
    }
}

/// Previous round's result per first move, indexed by `Direction::index`.
#[derive(Debug, Clone)]
struct RootSummary {
    allowed: [bool; 4],
    estimate: [u8; 4],
    nodes: [u64; 4],
}

impl RootSummary {
    fn new(board: &Board, forbidden: Option<Direction>) -> Self {
        let mut allowed = [false; 4];
        for dir in Direction::ALL {
            allowed[dir.index()] = dir.allowed_from(board.zero()) && Some(dir) != forbidden;
        }
        Self {
            allowed,
            estimate: [0; 4],
            nodes: [0; 4],
        }
    }

    /// Cheapest estimate first, then fewest nodes, then direction order.
    fn next(&self, pending: &[bool; 4]) -> Option<usize> {
        (0..4)
            .filter(|&i| pending[i])
            .min_by_key(|&i| (self.estimate[i], self.nodes[i], i))
    }

    fn branching(&self) -> usize {
        self.allowed.iter().filter(|&&a| a).count()
    }
}

/// Mutable state of one search, owned by it for its whole life.
struct SearchContext {
    tiles: [u8; CELLS],
    mirrored: [u8; CELLS],
    path: Vec<Direction>,
    solution: Option<Vec<Direction>>,
    summary: RootSummary,
    nodes: u64,
    started: Instant,
    timeout: Option<Duration>,
    cancel: CancelToken,
    terminated: bool,
    timed_out: bool,
}

impl SearchContext {
    fn new(board: &Board, plan: &SearchPlan, timeout: Option<Duration>, cancel: CancelToken) -> Self {
        Self {
            tiles: *board.tiles(),
            mirrored: *board.mirrored_tiles(),
            path: Vec::with_capacity(MAX_MOVES as usize + 1),
            solution: None,
            summary: RootSummary::new(board, plan.forbidden),
            nodes: 0,
            started: Instant::now(),
            timeout,
            cancel,
            terminated: false,
            timed_out: false,
        }
    }

    #[inline]
    fn stopped(&mut self) -> bool {
        if !self.terminated && self.cancel.is_cancelled() {
            self.terminated = true;
        }
        self.terminated
    }

    fn check_clock(&mut self) {
        if let Some(limit) = self.timeout {
            if self.started.elapsed() > limit {
                self.timed_out = true;
                self.terminated = true;
            }
        }
    }

    #[inline]
    fn swap(&mut self, a: usize, b: usize) {
        self.tiles.swap(a, b);
        self.mirrored.swap(SYM_POS[a], SYM_POS[b]);
    }

    fn self_symmetric(&self, zero: usize) -> bool {
        SYM_POS[zero] == zero && self.tiles == self.mirrored
    }

    fn report(&self, status: SearchStatus, moves: Vec<Direction>, depth: u8, rounds: u32) -> SearchReport {
        SearchReport {
            status,
            moves,
            nodes: self.nodes,
            elapsed: self.started.elapsed(),
            depth,
            rounds,
        }
    }
}

/// IDA* driven by one heuristic.
pub struct Search<'h, H: Heuristic> {
    heuristic: &'h H,
    limits: SearchLimits,
}

impl<'h, H: Heuristic> Search<'h, H> {
    pub fn new(heuristic: &'h H, limits: SearchLimits) -> Self {
        Self { heuristic, limits }
    }

    pub fn run(&self, board: &Board, plan: SearchPlan, cancel: &CancelToken) -> SolverResult<SearchReport> {
        let root = self.heuristic.evaluate(board)?;
        let estimate = self.heuristic.estimate(&root);
        let mut ctx = SearchContext::new(board, &plan, self.limits.timeout, cancel.clone());

        if estimate == 0 {
            return Ok(ctx.report(SearchStatus::Solved, Vec::new(), 0, 0));
        }

        let zero = board.zero();
        if let Some(from) = plan.warm_up_from {
            self.warm_up(&mut ctx, zero, &root, from, plan.start_bound);
        }

        let mut bound = plan.start_bound.max(estimate);
        let mut completed = 0u8;
        let mut rounds = 0u32;
        while bound <= self.limits.max_moves {
            if let Some(moves) = ctx.solution.take() {
                let depth = moves.len() as u8;
                return Ok(ctx.report(SearchStatus::Solved, moves, depth, rounds));
            }

            let before = ctx.nodes;
            self.round(&mut ctx, zero, &root, bound);
            rounds += 1;
            debug!(
                heuristic = self.heuristic.name(),
                bound,
                nodes = ctx.nodes - before,
                elapsed_ms = ctx.started.elapsed().as_millis() as u64,
                "deepening round finished"
            );

            if let Some(moves) = ctx.solution.take() {
                let depth = moves.len() as u8;
                return Ok(ctx.report(SearchStatus::Solved, moves, depth, rounds));
            }
            if ctx.timed_out {
                return Ok(ctx.report(SearchStatus::TimedOut, Vec::new(), completed, rounds));
            }
            if ctx.terminated {
                return Ok(ctx.report(SearchStatus::Cancelled, Vec::new(), completed, rounds));
            }
            completed = bound;
            bound = match bound.checked_add(2) {
                Some(next) => next,
                None => break,
            };
        }

        Ok(ctx.report(SearchStatus::Exhausted, Vec::new(), completed, rounds))
    }

    // shallow rounds whose only purpose is to rank the first moves
    fn warm_up(&self, ctx: &mut SearchContext, zero: usize, root: &H::State, from: u8, to: u8) {
        if ctx.summary.branching() < 2 {
            return;
        }
        let mut bound = from;
        while bound < to && !ctx.stopped() {
            self.round(ctx, zero, root, bound);
            bound += 2;
            if ctx.summary.nodes.iter().any(|&n| n > self.limits.warm_up_nodes) {
                break;
            }
        }
        debug!(nodes = ctx.nodes, reached = bound, "warm-up finished");
    }

    fn round(&self, ctx: &mut SearchContext, zero: usize, root: &H::State, bound: u8) {
        let mut pending = ctx.summary.allowed;
        while !ctx.stopped() {
            let Some(i) = ctx.summary.next(&pending) else {
                break;
            };
            pending[i] = false;

            let start = ctx.nodes;
            ctx.nodes += 1;
            let estimate = self.shift(ctx, zero, root, Direction::ALL[i], bound, Swirl::default());
            ctx.summary.estimate[i] = estimate;
            ctx.summary.nodes[i] = ctx.nodes - start;
        }
    }

    fn expand(&self, ctx: &mut SearchContext, zero: usize, state: &H::State, limit: u8, swirl: Swirl) -> u8 {
        ctx.nodes += 1;
        if ctx.stopped() {
            return END_OF_SEARCH;
        }
        if ctx.nodes & TIME_CHECK_MASK == 0 {
            ctx.check_clock();
            if ctx.terminated {
                return END_OF_SEARCH;
            }
        }
        let Some(&prev) = ctx.path.last() else {
            return END_OF_SEARCH;
        };

        let mut estimate = self.heuristic.estimate(state);
        if prev.allowed_from(zero) {
            estimate = estimate.min(self.shift(ctx, zero, state, prev, limit, Swirl::default()));
        }
        if ctx.self_symmetric(zero) {
            return estimate;
        }

        let turns = [
            (prev.clockwise(), Swirl::CLOCKWISE),
            (prev.counter_clockwise(), Swirl::COUNTER_CLOCKWISE),
        ];
        for (dir, code) in turns {
            if !dir.allowed_from(zero) {
                continue;
            }
            if let Some(next) = swirl.turn(code) {
                estimate = estimate.min(self.shift(ctx, zero, state, dir, limit, next));
            }
        }
        estimate
    }

    fn shift(
        &self,
        ctx: &mut SearchContext,
        zero: usize,
        state: &H::State,
        dir: Direction,
        limit: u8,
        swirl: Swirl,
    ) -> u8 {
        if ctx.stopped() {
            return END_OF_SEARCH;
        }
        let next = (zero as isize + dir.offset()) as usize;
        let tile = ctx.tiles[next];
        let child = self.heuristic.step(state, tile, next, zero, dir);
        let priority = self.heuristic.estimate(&child);

        ctx.path.push(dir);
        let result = if priority == 0 {
            ctx.solution = Some(ctx.path.clone());
            ctx.terminated = true;
            END_OF_SEARCH
        } else if priority < limit {
            ctx.swap(zero, next);
            let below = self.expand(ctx, next, &child, limit - 1, swirl);
            ctx.swap(zero, next);
            priority.min(below)
        } else {
            priority
        };
        ctx.path.pop();
        result
    }
}
