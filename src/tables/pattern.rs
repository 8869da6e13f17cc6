use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SolverError, SolverResult};
use crate::puzzle::CELLS;

pub const MAX_GROUP_TILES: usize = 8;
pub const MAX_GROUPS: usize = 8;

const UNSEEN: u8 = u8::MAX;
const COLUMN_LEFT: u16 = 0x1111;
const COLUMN_RIGHT: u16 = 0x8888;

/// How the tiles are split into groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternPartition {
    /// Three groups of five tiles
    Pattern555,
    /// Two groups of six tiles and one of three
    Pattern663,
    /// One group of seven tiles and one of eight
    Pattern78,
    /// Caller supplied groups, validated on build
    Custom(Vec<Vec<u8>>),
}

impl PatternPartition {
    pub fn groups(&self) -> Vec<Vec<u8>> {
        match self {
            PatternPartition::Pattern555 => vec![
                vec![1, 5, 6, 9, 13],
                vec![2, 3, 4, 7, 8],
                vec![10, 11, 12, 14, 15],
            ],
            PatternPartition::Pattern663 => vec![
                vec![1, 5, 6, 9, 10, 13],
                vec![7, 8, 11, 12, 14, 15],
                vec![2, 3, 4],
            ],
            PatternPartition::Pattern78 => vec![
                vec![1, 5, 6, 9, 10, 13, 14],
                vec![2, 3, 4, 7, 8, 11, 12, 15],
            ],
            PatternPartition::Custom(groups) => groups.clone(),
        }
    }

    fn validate(&self) -> SolverResult<Vec<Vec<u8>>> {
        let groups = self.groups();
        if groups.is_empty() || groups.len() > MAX_GROUPS {
            return Err(SolverError::InvalidPartition(format!(
                "expected 1 to {MAX_GROUPS} groups, got {}",
                groups.len()
            )));
        }

        let mut seen = [false; CELLS];
        for group in &groups {
            if group.is_empty() || group.len() > MAX_GROUP_TILES {
                return Err(SolverError::InvalidPartition(format!(
                    "group {group:?} must hold 1 to {MAX_GROUP_TILES} tiles"
                )));
            }
            for &tile in group {
                if tile == 0 || tile as usize >= CELLS {
                    return Err(SolverError::InvalidPartition(format!(
                        "tile {tile} is not a numbered tile"
                    )));
                }
                if std::mem::replace(&mut seen[tile as usize], true) {
                    return Err(SolverError::InvalidPartition(format!(
                        "tile {tile} is in more than one group"
                    )));
                }
            }
        }
        if let Some(missing) = (1..CELLS).find(|&tile| !seen[tile]) {
            return Err(SolverError::InvalidPartition(format!(
                "tile {missing} is not in any group"
            )));
        }
        Ok(groups)
    }
}

impl Default for PatternPartition {
    fn default() -> Self {
        PatternPartition::Pattern663
    }
}

#[derive(Debug)]
struct PatternGroup {
    tiles: Vec<u8>,
    costs: Box<[u8]>,
}

/// Immutable additive pattern database shared by every solver.
#[derive(Debug)]
pub struct PatternDatabase {
    partition: PatternPartition,
    groups: Vec<PatternGroup>,
    group_of: [u8; CELLS],
    slot_of: [u8; CELLS],
}

impl PatternDatabase {
    pub fn build(partition: PatternPartition) -> SolverResult<Self> {
        let groups = partition.validate()?;

        let mut group_of = [0u8; CELLS];
        let mut slot_of = [0u8; CELLS];
        for (g, group) in groups.iter().enumerate() {
            for (slot, &tile) in group.iter().enumerate() {
                group_of[tile as usize] = g as u8;
                slot_of[tile as usize] = slot as u8;
            }
        }

        let groups = groups
            .into_iter()
            .map(|tiles| {
                let costs = build_group(&tiles);
                PatternGroup { tiles, costs }
            })
            .collect();

        Ok(Self {
            partition,
            groups,
            group_of,
            slot_of,
        })
    }

    pub fn partition(&self) -> &PatternPartition {
        &self.partition
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Group index and slot within the group of a numbered tile.
    #[inline]
    pub fn locate(&self, tile: u8) -> (usize, u32) {
        (
            self.group_of[tile as usize] as usize,
            self.slot_of[tile as usize] as u32,
        )
    }

    /// Cells of `group`'s tiles packed four bits each, given the cell of every tile value.
    pub fn key(&self, group: usize, positions: &[u8; CELLS]) -> u32 {
        self.groups[group]
            .tiles
            .iter()
            .enumerate()
            .fold(0, |key, (slot, &tile)| {
                key | (positions[tile as usize] as u32) << (4 * slot)
            })
    }

    #[inline]
    pub fn cost(&self, group: usize, key: u32) -> u8 {
        let group = &self.groups[group];
        let cells = (0..group.tiles.len()).map(|slot| (key >> (4 * slot) & 0xF) as u8);
        group.costs[rank(cells)]
    }
}

/// Number of ways to place `width` distinct tiles on the board.
fn arrangements(width: usize) -> usize {
    (CELLS - width + 1..=CELLS).product()
}

/// Position of an arrangement in lexicographic order of distinct cells.
fn rank(cells: impl Iterator<Item = u8>) -> usize {
    let mut used = 0u16;
    let mut rank = 0usize;
    for (slot, cell) in cells.enumerate() {
        let below = (used & ((1u16 << cell) - 1)).count_ones() as usize;
        used |= 1 << cell;
        rank = rank * (CELLS - slot) + cell as usize - below;
    }
    rank
}

fn unrank(mut rank: usize, width: usize) -> [u8; MAX_GROUP_TILES] {
    let mut digits = [0usize; MAX_GROUP_TILES];
    for slot in (0..width).rev() {
        let radix = CELLS - slot;
        digits[slot] = rank % radix;
        rank /= radix;
    }

    let mut cells = [0u8; MAX_GROUP_TILES];
    let mut used = 0u16;
    for (slot, &digit) in digits.iter().enumerate().take(width) {
        let mut skip = digit;
        let mut cell = 0u8;
        loop {
            if used & 1 << cell == 0 {
                if skip == 0 {
                    break;
                }
                skip -= 1;
            }
            cell += 1;
        }
        cells[slot] = cell;
        used |= 1 << cell;
    }
    cells
}

fn occupancy(cells: &[u8]) -> u16 {
    cells.iter().fold(0, |mask, &cell| mask | 1 << cell)
}

fn neighbours(cells: u16) -> u16 {
    (cells << 1 & !COLUMN_LEFT) | (cells >> 1 & !COLUMN_RIGHT) | cells << 4 | cells >> 4
}

/// Cells the blank reaches from `start` without crossing a group tile.
fn flood(open: u16, start: u8) -> u16 {
    let mut region = 1u16 << start;
    loop {
        let grown = (region | neighbours(region)) & open;
        if grown == region {
            return region;
        }
        region = grown;
    }
}

/// One bit per (arrangement, blank cell); a blank region is marked as a whole.
struct Visited {
    bits: Vec<u64>,
    free: usize,
}

impl Visited {
    fn new(width: usize) -> Self {
        let free = CELLS - width;
        Self {
            bits: vec![0; (arrangements(width) * free).div_ceil(64)],
            free,
        }
    }

    fn index(&self, rank: usize, occupied: u16, cell: u8) -> usize {
        let below = (occupied & ((1u16 << cell) - 1)).count_ones() as usize;
        rank * self.free + cell as usize - below
    }

    fn contains(&self, rank: usize, occupied: u16, cell: u8) -> bool {
        let i = self.index(rank, occupied, cell);
        self.bits[i / 64] & 1 << (i % 64) != 0
    }

    fn mark(&mut self, rank: usize, occupied: u16, mut region: u16) {
        while region != 0 {
            let cell = region.trailing_zeros() as u8;
            region &= region - 1;
            let i = self.index(rank, occupied, cell);
            self.bits[i / 64] |= 1 << (i % 64);
        }
    }
}

// Breadth-first over (arrangement, blank region) from every goal region.
// Only moves of group tiles are counted and a cost is the minimum over blank cells.
fn build_group(tiles: &[u8]) -> Box<[u8]> {
    let width = tiles.len();
    let mut costs = vec![UNSEEN; arrangements(width)].into_boxed_slice();
    let mut visited = Visited::new(width);

    let goal: Vec<u8> = tiles.iter().map(|&tile| tile - 1).collect();
    let goal_rank = rank(goal.iter().copied());
    let occupied = occupancy(&goal);
    costs[goal_rank] = 0;

    let mut frontier: Vec<u64> = Vec::new();
    let mut unclaimed = !occupied;
    while unclaimed != 0 {
        let start = unclaimed.trailing_zeros() as u8;
        let region = flood(!occupied, start);
        visited.mark(goal_rank, occupied, region);
        frontier.push((goal_rank as u64) << 4 | start as u64);
        unclaimed &= !region;
    }

    let mut depth = 0u8;
    let mut reached = 1usize;
    while !frontier.is_empty() {
        depth += 1;
        let mut next_frontier = Vec::new();
        for &entry in &frontier {
            let cells = unrank((entry >> 4) as usize, width);
            let occupied = occupancy(&cells[..width]);
            let region = flood(!occupied, (entry & 0xF) as u8);
            let touching = neighbours(region) & occupied;

            for slot in 0..width {
                let from = cells[slot];
                if touching & 1 << from == 0 {
                    continue;
                }
                let mut targets = neighbours(1 << from) & region;
                while targets != 0 {
                    let to = targets.trailing_zeros() as u8;
                    targets &= targets - 1;

                    let mut moved = cells;
                    moved[slot] = to;
                    let moved_rank = rank(moved[..width].iter().copied());
                    let moved_occupied = occupied & !(1 << from) | 1 << to;
                    if visited.contains(moved_rank, moved_occupied, from) {
                        continue;
                    }
                    visited.mark(moved_rank, moved_occupied, flood(!moved_occupied, from));
                    next_frontier.push((moved_rank as u64) << 4 | from as u64);
                    if costs[moved_rank] == UNSEEN {
                        costs[moved_rank] = depth;
                        reached += 1;
                    }
                }
            }
        }
        frontier = next_frontier;
    }

    debug!(
        ?tiles,
        reached,
        max_cost = costs.iter().copied().max().unwrap_or(0),
        "pattern group built"
    );
    costs
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

    fn positions(tiles: &[u8; CELLS]) -> [u8; CELLS] {
        let mut positions = [0u8; CELLS];
        for (pos, &tile) in tiles.iter().enumerate() {
            positions[tile as usize] = pos as u8;
        }
        positions
    }

    fn goal_tiles() -> [u8; CELLS] {
        let mut tiles = [0u8; CELLS];
        for (i, tile) in tiles.iter_mut().enumerate().take(CELLS - 1) {
            *tile = i as u8 + 1;
        }
        tiles
    }

    #[test]
    fn test_rejects_bad_partitions() {
        let overlapping = PatternPartition::Custom(vec![
            (1..=8).collect(),
            (8..=15).collect(),
        ]);
        assert!(matches!(
            PatternDatabase::build(overlapping),
            Err(SolverError::InvalidPartition(_))
        ));

        let missing = PatternPartition::Custom(vec![vec![1, 2, 3], vec![4, 5, 6]]);
        assert!(PatternDatabase::build(missing).is_err());

        let too_wide = PatternPartition::Custom(vec![(1..=9).collect(), (10..=15).collect()]);
        assert!(PatternDatabase::build(too_wide).is_err());

        let blank = PatternPartition::Custom(vec![(0..=5).collect(), (6..=15).collect()]);
        assert!(PatternDatabase::build(blank).is_err());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(PatternPartition::Pattern555.validate().is_ok());
        assert!(PatternPartition::Pattern663.validate().is_ok());
        assert!(PatternPartition::Pattern78.validate().is_ok());
    }

    #[test]
    fn test_rank_is_dense_and_reversible() {
        assert_eq!(arrangements(8), 518_918_400);
        assert_eq!(rank([0, 1, 2].into_iter()), 0);
        assert_eq!(rank([15, 14, 13].into_iter()), arrangements(3) - 1);

        let mut rng = StdRng::seed_from_u64(6);
        let mut cells: Vec<u8> = (0..CELLS as u8).collect();
        for width in 1..=MAX_GROUP_TILES {
            for _ in 0..50 {
                cells.shuffle(&mut rng);
                let r = rank(cells[..width].iter().copied());
                assert!(r < arrangements(width));
                assert_eq!(unrank(r, width)[..width], cells[..width]);
            }
        }
    }

    #[test]
    fn test_flood_stops_at_group_tiles() {
        // tiles on cells 1 and 4 wall off the corner
        let open = !(1u16 << 1 | 1 << 4);
        assert_eq!(flood(open, 0), 1);
        assert_eq!(flood(open, 15).count_ones(), 13);
    }

    #[test]
    fn test_single_tile_costs_its_manhattan_distance() {
        let db = PatternDatabase::build(PatternPartition::Custom(vec![
            vec![1],
            vec![2, 3, 4],
            vec![5, 6, 7],
            vec![8, 9, 10],
            vec![11, 12, 13],
            vec![14, 15],
        ]))
        .unwrap();
        let mut tiles = goal_tiles();
        tiles.swap(0, 15); // tile 1 to the far corner
        let positions = positions(&tiles);
        let (g, _) = db.locate(1);
        assert_eq!(db.cost(g, db.key(g, &positions)), 6);
    }

    #[test]
    fn test_goal_costs_nothing() {
        let db = PatternDatabase::build(PatternPartition::Pattern555).unwrap();
        let positions = positions(&goal_tiles());
        for g in 0..db.group_count() {
            assert_eq!(db.cost(g, db.key(g, &positions)), 0);
        }
    }

    #[test]
    fn test_walled_in_blank_costs_extra_moves() {
        // tiles 1 and 2 swapped in the corner of a group that also holds 5 and 6
        let db = PatternDatabase::build(PatternPartition::Custom(vec![
            vec![1, 2, 5, 6],
            vec![3, 4, 7, 8],
            vec![9, 10, 11, 12],
            vec![13, 14, 15],
        ]))
        .unwrap();
        let mut tiles = goal_tiles();
        tiles.swap(0, 1);
        let positions = positions(&tiles);
        let (g, _) = db.locate(1);
        assert!(db.cost(g, db.key(g, &positions)) > 2);
        assert_eq!(db.cost(g, db.key(g, &positions)) % 2, 0);
    }

    #[test]
    fn test_one_tile_move_changes_cost_by_one() {
        let db = PatternDatabase::build(PatternPartition::Pattern555).unwrap();
        let mut rng = StdRng::seed_from_u64(19);
        for _ in 0..200 {
            let mut tiles = goal_tiles();
            tiles.shuffle(&mut rng);
            let before = positions(&tiles);
            let zero = before[0] as usize;
            let candidates: Vec<usize> = [zero.wrapping_sub(4), zero + 4, zero.wrapping_sub(1), zero + 1]
                .into_iter()
                .filter(|&n| n < CELLS && (n / 4 == zero / 4 || n % 4 == zero % 4))
                .collect();
            let neighbour = *candidates.choose(&mut rng).unwrap();
            let mut after_tiles = tiles;
            after_tiles.swap(zero, neighbour);
            let after = positions(&after_tiles);

            for g in 0..db.group_count() {
                let a = db.cost(g, db.key(g, &before)) as i32;
                let b = db.cost(g, db.key(g, &after)) as i32;
                let (moved_group, _) = db.locate(tiles[neighbour]);
                if g == moved_group {
                    assert_eq!((a - b).abs(), 1);
                } else {
                    assert_eq!(a, b);
                }
            }
        }
    }
}
