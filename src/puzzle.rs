use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BoardError;

pub const SIZE: usize = 4;
pub const CELLS: usize = SIZE * SIZE;

/// Cell index of each cell after reflecting across the main diagonal.
pub const SYM_POS: [usize; CELLS] = [0, 4, 8, 12, 1, 5, 9, 13, 2, 6, 10, 14, 3, 7, 11, 15];

/// Tile value whose goal cell is the reflection of the given tile's goal cell.
pub const SYM_VAL: [u8; CELLS] = [0, 1, 5, 9, 13, 2, 6, 10, 14, 3, 7, 11, 15, 4, 8, 12];

/// The way the blank travels for one move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Right,
    Down,
    Left,
    Up,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Right,
        Direction::Down,
        Direction::Left,
        Direction::Up,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Cell delta of the blank.
    pub fn offset(self) -> isize {
        match self {
            Direction::Right => 1,
            Direction::Down => SIZE as isize,
            Direction::Left => -1,
            Direction::Up => -(SIZE as isize),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Right => Direction::Left,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Up => Direction::Down,
        }
    }

    pub fn clockwise(self) -> Self {
        match self {
            Direction::Right => Direction::Down,
            Direction::Down => Direction::Left,
            Direction::Left => Direction::Up,
            Direction::Up => Direction::Right,
        }
    }

    pub fn counter_clockwise(self) -> Self {
        self.clockwise().opposite()
    }

    /// The same move seen on the board reflected across the main diagonal.
    pub fn mirrored(self) -> Self {
        match self {
            Direction::Right => Direction::Down,
            Direction::Down => Direction::Right,
            Direction::Left => Direction::Up,
            Direction::Up => Direction::Left,
        }
    }

    /// Whether the blank at `pos` can travel this way.
    pub fn allowed_from(self, pos: usize) -> bool {
        let (x, y) = (pos % SIZE, pos / SIZE);
        match self {
            Direction::Right => x < SIZE - 1,
            Direction::Down => y < SIZE - 1,
            Direction::Left => x > 0,
            Direction::Up => y > 0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Direction::Right => "Right",
            Direction::Down => "Down",
            Direction::Left => "Left",
            Direction::Up => "Up",
        };
        write!(f, "{}", s)
    }
}

/// An immutable 4x4 arrangement. Tile 0 is the blank; the goal has tiles
/// 1..=15 in reading order with the blank in the bottom-right corner.
#[derive(Debug, Clone)]
pub struct Board {
    tiles: [u8; CELLS],
    mirrored: [u8; CELLS],
    zero: usize,
    solvable: bool,
}

impl Board {
    pub fn new(tiles: &[u8]) -> Result<Self, BoardError> {
        if tiles.len() != CELLS {
            return Err(BoardError::WrongLength(tiles.len()));
        }

        let mut seen = [false; CELLS];
        let mut arr = [0u8; CELLS];
        for (i, &value) in tiles.iter().enumerate() {
            let slot = seen
                .get_mut(value as usize)
                .ok_or(BoardError::OutOfRange(value))?;
            if *slot {
                return Err(BoardError::Duplicate(value));
            }
            *slot = true;
            arr[i] = value;
        }

        Ok(Self::from_array(arr))
    }

    pub fn goal() -> Self {
        let mut tiles = [0u8; CELLS];
        for (i, tile) in tiles.iter_mut().enumerate().take(CELLS - 1) {
            *tile = i as u8 + 1;
        }
        Self::from_array(tiles)
    }

    // callers guarantee `tiles` is a permutation
    fn from_array(tiles: [u8; CELLS]) -> Self {
        let zero = tiles.iter().position(|&t| t == 0).unwrap_or(CELLS - 1);
        let solvable = Self::is_solvable(&tiles, zero / SIZE);
        Self {
            tiles,
            mirrored: mirror_tiles(&tiles),
            zero,
            solvable,
        }
    }

    /// Random solvable board drawn uniformly from all permutations.
    pub fn shuffled<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut flattened = Self::goal().tiles;

        loop {
            flattened.shuffle(rng);
            let zero = flattened.iter().position(|&t| t == 0).unwrap_or(0);
            if Self::is_solvable(&flattened, zero / SIZE) {
                return Self::from_array(flattened);
            }
        }
    }

    /// Random walk of `moves` non-reversing steps away from the goal.
    pub fn scrambled<R: Rng + ?Sized>(rng: &mut R, moves: usize) -> Self {
        let mut board = Self::goal();
        let mut last: Option<Direction> = None;

        for _ in 0..moves {
            let options: Vec<Direction> = Direction::ALL
                .into_iter()
                .filter(|&d| d.allowed_from(board.zero) && Some(d.opposite()) != last)
                .collect();
            if let Some(&dir) = options.choose(rng) {
                if let Some(next) = board.apply(dir) {
                    board = next;
                    last = Some(dir);
                }
            }
        }
        board
    }

    fn is_solvable(flattened: &[u8], empty_row: usize) -> bool {
        let inversions = Self::count_inversions(flattened);
        // Even-sized puzzle: solvable if inversions count plus empty row index is odd
        (inversions + empty_row) % 2 == 1
    }

    fn count_inversions(flattened: &[u8]) -> usize {
        flattened
            .iter()
            .enumerate()
            .filter(|&(_, &val)| val != 0)
            .map(|(i, &val)| {
                flattened[i + 1..]
                    .iter()
                    .filter(|&&next| next != 0 && next < val)
                    .count()
            })
            .sum()
    }

    pub fn tiles(&self) -> &[u8; CELLS] {
        &self.tiles
    }

    pub fn mirrored_tiles(&self) -> &[u8; CELLS] {
        &self.mirrored
    }

    /// Cell index of the blank.
    pub fn zero(&self) -> usize {
        self.zero
    }

    pub fn zero_x(&self) -> usize {
        self.zero % SIZE
    }

    pub fn zero_y(&self) -> usize {
        self.zero / SIZE
    }

    pub fn solvable(&self) -> bool {
        self.solvable
    }

    pub fn is_goal(&self) -> bool {
        self.tiles == Self::goal().tiles
    }

    /// Bit `d.index()` is set when the blank can travel in direction `d`.
    pub fn valid_moves(&self) -> u8 {
        Direction::ALL
            .into_iter()
            .filter(|d| d.allowed_from(self.zero))
            .fold(0, |bits, d| bits | 1 << d.index())
    }

    /// Reflection across the main diagonal. Same optimal distance.
    pub fn mirror(&self) -> Self {
        Self::from_array(self.mirrored)
    }

    pub fn apply(&self, direction: Direction) -> Option<Self> {
        if !direction.allowed_from(self.zero) {
            return None;
        }
        let next = (self.zero as isize + direction.offset()) as usize;
        let mut tiles = self.tiles;
        tiles.swap(self.zero, next);
        Some(Self::from_array(tiles))
    }

    /// Replays `moves`, failing on the first one that leaves the board.
    pub fn apply_all(&self, moves: &[Direction]) -> Result<Self, BoardError> {
        moves.iter().enumerate().try_fold(self.clone(), |board, (step, &dir)| {
            board.apply(dir).ok_or(BoardError::IllegalMove {
                step,
                direction: dir.to_string(),
            })
        })
    }
}

pub(crate) fn mirror_tiles(tiles: &[u8; CELLS]) -> [u8; CELLS] {
    let mut mirrored = [0u8; CELLS];
    for (pos, &tile) in tiles.iter().enumerate() {
        mirrored[SYM_POS[pos]] = SYM_VAL[tile as usize];
    }
    mirrored
}

impl PartialEq for Board {
    fn eq(&self, other: &Self) -> bool {
        self.tiles == other.tiles
    }
}

impl Eq for Board {}

impl std::hash::Hash for Board {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.tiles.hash(state);
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.tiles.chunks(SIZE) {
            for &val in row {
                write!(f, "{:2} ", val)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    const HARDEST: [u8; 16] = [0, 12, 9, 13, 15, 11, 10, 14, 3, 7, 2, 5, 4, 8, 6, 1];

    #[test]
    fn test_rejects_malformed_input() {
        assert_eq!(
            Board::new(&[1, 2, 3]).unwrap_err(),
            BoardError::WrongLength(3)
        );
        let mut dup = Board::goal().tiles;
        dup[0] = 2;
        assert_eq!(Board::new(&dup).unwrap_err(), BoardError::Duplicate(2));
        let mut big = Board::goal().tiles;
        big[3] = 16;
        assert_eq!(Board::new(&big).unwrap_err(), BoardError::OutOfRange(16));
    }

    #[test]
    fn test_solvability_parity() {
        assert!(Board::goal().solvable());
        assert!(Board::new(&HARDEST).unwrap().solvable());

        let mut swapped = Board::goal().tiles;
        swapped.swap(0, 1);
        assert!(!Board::new(&swapped).unwrap().solvable());
    }

    #[test]
    fn test_valid_moves_at_corner_and_centre() {
        let goal = Board::goal();
        assert_eq!(
            goal.valid_moves(),
            1 << Direction::Left.index() | 1 << Direction::Up.index()
        );

        let centre = goal.apply(Direction::Left).unwrap().apply(Direction::Up).unwrap();
        assert_eq!(centre.zero(), 10);
        assert_eq!(centre.valid_moves(), 0b1111);
    }

    #[test]
    fn test_mirror_is_an_involution_and_keeps_goal() {
        assert_eq!(Board::goal().mirror(), Board::goal());

        let board = Board::new(&HARDEST).unwrap();
        let mirrored = board.mirror();
        assert_ne!(mirrored, board);
        assert_eq!(mirrored.mirror(), board);
        assert!(mirrored.solvable());
        assert_eq!(mirrored.zero(), SYM_POS[board.zero()]);
    }

    #[test]
    fn test_mirrored_moves_commute_with_mirror() {
        let mut rng = StdRng::seed_from_u64(7);
        let board = Board::scrambled(&mut rng, 20);
        for dir in Direction::ALL {
            let direct = board.apply(dir).map(|b| b.mirror());
            let reflected = board.mirror().apply(dir.mirrored());
            assert_eq!(direct, reflected);
        }
    }

    #[test]
    fn test_apply_all_replays_and_rejects_illegal() {
        let goal = Board::goal();
        let moves = [Direction::Left, Direction::Up, Direction::Right, Direction::Down];
        let back = goal.apply_all(&moves).unwrap();
        assert_ne!(back, goal);

        let err = goal.apply_all(&[Direction::Right]).unwrap_err();
        assert_eq!(
            err,
            BoardError::IllegalMove {
                step: 0,
                direction: "Right".to_string()
            }
        );
    }

    #[test]
    fn test_shuffled_is_always_solvable() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            assert!(Board::shuffled(&mut rng).solvable());
        }
    }

    #[test]
    fn test_turns() {
        for dir in Direction::ALL {
            assert_eq!(dir.clockwise().counter_clockwise(), dir);
            assert_eq!(dir.clockwise().clockwise(), dir.opposite());
            assert_eq!(dir.mirrored().mirrored(), dir);
        }
    }
}
