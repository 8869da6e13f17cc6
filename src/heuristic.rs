use std::fmt;
use std::sync::Arc;

use crate::error::{SolverError, SolverResult};
use crate::puzzle::{Board, Direction, CELLS, SIZE, SYM_POS, SYM_VAL};
use crate::tables::walking::LineCounts;
use crate::tables::{LinkDirection, PatternDatabase, WalkingDistanceTables, MAX_GROUPS};

/// Lower bound on the moves left, or the unsolvable sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Estimate {
    Cost(u8),
    Unsolvable,
}

impl Estimate {
    pub fn cost(self) -> Option<u8> {
        match self {
            Estimate::Cost(cost) => Some(cost),
            Estimate::Unsolvable => None,
        }
    }
}

impl fmt::Display for Estimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Estimate::Cost(cost) => write!(f, "{}", cost),
            Estimate::Unsolvable => write!(f, "unsolvable"),
        }
    }
}

/// An admissible, incrementally updatable estimator.
pub trait Heuristic: Send + Sync {
    type State: Copy + fmt::Debug + PartialEq;

    fn name(&self) -> &'static str;

    /// Full evaluation of a solvable board.
    fn evaluate(&self, board: &Board) -> SolverResult<Self::State>;

    fn estimate(&self, state: &Self::State) -> u8;

    /// State after the blank travels `direction`, moving `tile` from cell `from` to cell `to`.
    fn step(
        &self,
        state: &Self::State,
        tile: u8,
        from: usize,
        to: usize,
        direction: Direction,
    ) -> Self::State;

    fn lower_bound(&self, board: &Board) -> SolverResult<Estimate> {
        if !board.solvable() {
            return Ok(Estimate::Unsolvable);
        }
        let state = self.evaluate(board)?;
        Ok(Estimate::Cost(self.estimate(&state)))
    }
}

/// Row and column walking distance.
#[derive(Debug, Clone)]
pub struct WalkingDistance {
    tables: Arc<WalkingDistanceTables>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkingState {
    index_h: u16,
    index_v: u16,
    value_h: u8,
    value_v: u8,
}

impl WalkingDistance {
    pub fn new(tables: Arc<WalkingDistanceTables>) -> Self {
        Self { tables }
    }

    fn index(&self, counts: &LineCounts, blank_line: usize) -> SolverResult<u16> {
        self.tables.index_of(counts, blank_line).ok_or_else(|| {
            SolverError::Internal(format!(
                "walking distance pattern {counts:?} (blank line {blank_line}) is not in the tables"
            ))
        })
    }
}

impl Heuristic for WalkingDistance {
    type State = WalkingState;

    fn name(&self) -> &'static str {
        "walking distance"
    }

    fn evaluate(&self, board: &Board) -> SolverResult<WalkingState> {
        let mut rows: LineCounts = [[0; SIZE]; SIZE];
        let mut cols: LineCounts = [[0; SIZE]; SIZE];
        for (pos, &tile) in board.tiles().iter().enumerate() {
            if tile != 0 {
                let goal = tile as usize - 1;
                rows[pos / SIZE][goal / SIZE] += 1;
                cols[pos % SIZE][goal % SIZE] += 1;
            }
        }

        let index_h = self.index(&rows, board.zero_y())?;
        let index_v = self.index(&cols, board.zero_x())?;
        Ok(WalkingState {
            index_h,
            index_v,
            value_h: self.tables.distance(index_h),
            value_v: self.tables.distance(index_v),
        })
    }

    #[inline]
    fn estimate(&self, state: &WalkingState) -> u8 {
        state.value_h + state.value_v
    }

    #[inline]
    fn step(
        &self,
        state: &WalkingState,
        tile: u8,
        _from: usize,
        _to: usize,
        direction: Direction,
    ) -> WalkingState {
        let goal = tile as usize - 1;
        let mut next = *state;
        match direction {
            Direction::Down | Direction::Up => {
                let link = if direction == Direction::Down {
                    LinkDirection::Forward
                } else {
                    LinkDirection::Backward
                };
                next.index_h = self.tables.link(state.index_h, goal / SIZE, link);
                next.value_h = self.tables.distance(next.index_h);
            }
            Direction::Right | Direction::Left => {
                let link = if direction == Direction::Right {
                    LinkDirection::Forward
                } else {
                    LinkDirection::Backward
                };
                next.index_v = self.tables.link(state.index_v, goal % SIZE, link);
                next.value_v = self.tables.distance(next.index_v);
            }
        }
        next
    }
}

/// Manhattan distance, optionally with linear conflicts.
#[derive(Debug, Clone, Copy)]
pub struct ManhattanDistance {
    linear_conflict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManhattanState {
    tiles: [u8; CELLS],
    distance: u8,
    // rows first, then columns
    conflicts: [u8; 2 * SIZE],
    conflict_sum: u8,
}

impl ManhattanDistance {
    pub fn new(linear_conflict: bool) -> Self {
        Self { linear_conflict }
    }

    pub fn linear_conflict(&self) -> bool {
        self.linear_conflict
    }

    fn tile_distance(tile: u8, pos: usize) -> u8 {
        let goal = tile as usize - 1;
        ((goal / SIZE).abs_diff(pos / SIZE) + (goal % SIZE).abs_diff(pos % SIZE)) as u8
    }

    // each line costs two moves per tile that must leave it to untangle the rest
    fn line_conflicts(&self, tiles: &[u8; CELLS], line: usize) -> u8 {
        if !self.linear_conflict {
            return 0;
        }
        let mut goals = [0usize; SIZE];
        let mut len = 0;
        for i in 0..SIZE {
            let (pos, home) = if line < SIZE {
                (line * SIZE + i, line)
            } else {
                (i * SIZE + line - SIZE, line - SIZE)
            };
            let tile = tiles[pos];
            if tile == 0 {
                continue;
            }
            let goal = tile as usize - 1;
            let (goal_line, goal_offset) = if line < SIZE {
                (goal / SIZE, goal % SIZE)
            } else {
                (goal % SIZE, goal / SIZE)
            };
            if goal_line == home {
                goals[len] = goal_offset;
                len += 1;
            }
        }

        let mut longest = [1u8; SIZE];
        for i in 0..len {
            for j in 0..i {
                if goals[j] < goals[i] {
                    longest[i] = longest[i].max(longest[j] + 1);
                }
            }
        }
        let kept = longest[..len].iter().copied().max().unwrap_or(0);
        2 * (len as u8 - kept)
    }

    fn refresh(&self, state: &mut ManhattanState, line: usize) {
        let conflicts = self.line_conflicts(&state.tiles, line);
        state.conflict_sum = state.conflict_sum - state.conflicts[line] + conflicts;
        state.conflicts[line] = conflicts;
    }
}

impl Heuristic for ManhattanDistance {
    type State = ManhattanState;

    fn name(&self) -> &'static str {
        if self.linear_conflict {
            "manhattan distance with linear conflicts"
        } else {
            "manhattan distance"
        }
    }

    fn evaluate(&self, board: &Board) -> SolverResult<ManhattanState> {
        let tiles = *board.tiles();
        let distance = tiles
            .iter()
            .enumerate()
            .filter(|&(_, &tile)| tile != 0)
            .map(|(pos, &tile)| Self::tile_distance(tile, pos))
            .sum();

        let mut conflicts = [0u8; 2 * SIZE];
        for (line, count) in conflicts.iter_mut().enumerate() {
            *count = self.line_conflicts(&tiles, line);
        }
        Ok(ManhattanState {
            tiles,
            distance,
            conflicts,
            conflict_sum: conflicts.iter().sum(),
        })
    }

    #[inline]
    fn estimate(&self, state: &ManhattanState) -> u8 {
        state.distance + state.conflict_sum
    }

    fn step(
        &self,
        state: &ManhattanState,
        tile: u8,
        from: usize,
        to: usize,
        direction: Direction,
    ) -> ManhattanState {
        let mut next = *state;
        next.distance = state.distance - Self::tile_distance(tile, from) + Self::tile_distance(tile, to);
        next.tiles.swap(from, to);
        match direction {
            // the tile changes row, its column order is untouched
            Direction::Down | Direction::Up => {
                self.refresh(&mut next, from / SIZE);
                self.refresh(&mut next, to / SIZE);
            }
            Direction::Right | Direction::Left => {
                self.refresh(&mut next, SIZE + from % SIZE);
                self.refresh(&mut next, SIZE + to % SIZE);
            }
        }
        next
    }
}

/// Additive pattern database, maximised over the board and its mirror.
#[derive(Debug, Clone)]
pub struct AdditivePattern {
    database: Arc<PatternDatabase>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternState {
    regular: [u32; MAX_GROUPS],
    mirrored: [u32; MAX_GROUPS],
    regular_sum: u8,
    mirrored_sum: u8,
}

impl PatternState {
    /// Sums of the regular and mirrored orientation.
    pub fn sums(&self) -> (u8, u8) {
        (self.regular_sum, self.mirrored_sum)
    }
}

impl AdditivePattern {
    pub fn new(database: Arc<PatternDatabase>) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &PatternDatabase {
        &self.database
    }

    fn orientation(&self, tiles: &[u8; CELLS]) -> ([u32; MAX_GROUPS], u8) {
        let mut positions = [0u8; CELLS];
        for (pos, &tile) in tiles.iter().enumerate() {
            positions[tile as usize] = pos as u8;
        }

        let mut keys = [0u32; MAX_GROUPS];
        let mut sum = 0u8;
        for (group, key) in keys.iter_mut().enumerate().take(self.database.group_count()) {
            *key = self.database.key(group, &positions);
            sum += self.database.cost(group, *key);
        }
        (keys, sum)
    }

    #[inline]
    fn shift(&self, keys: &mut [u32; MAX_GROUPS], sum: u8, tile: u8, from: usize, to: usize) -> u8 {
        let (group, slot) = self.database.locate(tile);
        let shift = 4 * slot;
        let old = keys[group];
        debug_assert_eq!((old >> shift & 0xF) as usize, from);
        let new = old & !(0xF << shift) | (to as u32) << shift;
        keys[group] = new;
        sum - self.database.cost(group, old) + self.database.cost(group, new)
    }
}

impl Heuristic for AdditivePattern {
    type State = PatternState;

    fn name(&self) -> &'static str {
        "pattern database"
    }

    fn evaluate(&self, board: &Board) -> SolverResult<PatternState> {
        let (regular, regular_sum) = self.orientation(board.tiles());
        let (mirrored, mirrored_sum) = self.orientation(board.mirrored_tiles());
        Ok(PatternState {
            regular,
            mirrored,
            regular_sum,
            mirrored_sum,
        })
    }

    #[inline]
    fn estimate(&self, state: &PatternState) -> u8 {
        state.regular_sum.max(state.mirrored_sum)
    }

    #[inline]
    fn step(
        &self,
        state: &PatternState,
        tile: u8,
        from: usize,
        to: usize,
        _direction: Direction,
    ) -> PatternState {
        let mut next = *state;
        next.regular_sum = self.shift(&mut next.regular, state.regular_sum, tile, from, to);
        next.mirrored_sum = self.shift(
            &mut next.mirrored,
            state.mirrored_sum,
            SYM_VAL[tile as usize],
            SYM_POS[from],
            SYM_POS[to],
        );
        next
    }
}
