use std::collections::HashMap;

use tracing::debug;

use crate::puzzle::SIZE;

/// Link value for a move the pattern cannot make.
pub const NO_LINK: u16 = u16::MAX;

/// Tile counts per board line (outer) and goal line (inner).
pub type LineCounts = [[u8; SIZE]; SIZE];

/// Which neighbour line the blank moves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDirection {
    /// Blank moves to the next line (down, or right for columns)
    Forward = 0,
    /// Blank moves to the previous line (up, or left for columns)
    Backward = 1,
}

/// Immutable walking-distance lookup data shared by every solver.
#[derive(Debug, Clone)]
pub struct WalkingDistanceTables {
    row_keys: HashMap<u16, u8>,
    pattern_keys: HashMap<u32, u16>,
    distances: Vec<u8>,
    links: Vec<u16>,
}

// three bits per count
fn row_code(row: &[u8; SIZE]) -> u16 {
    row.iter().fold(0, |code, &count| code << 3 | count as u16)
}

impl WalkingDistanceTables {
    /// Enumerates every reachable pattern breadth-first from the goal.
    pub fn build() -> Self {
        let mut goal: LineCounts = [[0; SIZE]; SIZE];
        for (line, counts) in goal.iter_mut().enumerate() {
            counts[line] = SIZE as u8;
        }
        goal[SIZE - 1][SIZE - 1] = SIZE as u8 - 1;

        let mut tables = Self {
            row_keys: HashMap::new(),
            pattern_keys: HashMap::new(),
            distances: Vec::new(),
            links: Vec::new(),
        };
        let mut patterns: Vec<(LineCounts, usize)> = Vec::new();
        tables.intern(&mut patterns, goal, SIZE - 1, 0);

        let mut head = 0;
        while head < patterns.len() {
            let (counts, blank) = patterns[head];
            let distance = tables.distances[head] + 1;

            let neighbours = [
                (LinkDirection::Forward, (blank + 1 < SIZE).then_some(blank + 1)),
                (LinkDirection::Backward, blank.checked_sub(1)),
            ];
            for (direction, target) in neighbours {
                let Some(target) = target else { continue };
                for goal_line in 0..SIZE {
                    if counts[target][goal_line] == 0 {
                        continue;
                    }
                    let mut next = counts;
                    next[target][goal_line] -= 1;
                    next[blank][goal_line] += 1;
                    let index = tables.intern(&mut patterns, next, target, distance);
                    tables.links[Self::link_slot(head, goal_line, direction)] = index;
                }
            }
            head += 1;
        }

        debug!(
            patterns = tables.len(),
            max_distance = tables.max_distance(),
            "walking distance tables built"
        );
        tables
    }

    fn intern(
        &mut self,
        patterns: &mut Vec<(LineCounts, usize)>,
        counts: LineCounts,
        blank: usize,
        distance: u8,
    ) -> u16 {
        let mut key = 0u32;
        for row in &counts {
            let next_id = self.row_keys.len() as u8;
            let id = *self.row_keys.entry(row_code(row)).or_insert(next_id);
            key = key << 6 | id as u32;
        }
        key = key << 4 | blank as u32;

        if let Some(&index) = self.pattern_keys.get(&key) {
            return index;
        }
        let index = self.distances.len() as u16;
        self.pattern_keys.insert(key, index);
        self.distances.push(distance);
        self.links.extend_from_slice(&[NO_LINK; SIZE * 2]);
        patterns.push((counts, blank));
        index
    }

    fn link_slot(index: usize, goal_line: usize, direction: LinkDirection) -> usize {
        index * SIZE * 2 + goal_line * 2 + direction as usize
    }

    /// Pattern index of a projection, `None` if the counts are not a reachable pattern.
    pub fn index_of(&self, counts: &LineCounts, blank_line: usize) -> Option<u16> {
        let mut key = 0u32;
        for row in counts {
            let id = *self.row_keys.get(&row_code(row))?;
            key = key << 6 | id as u32;
        }
        key = key << 4 | blank_line as u32;
        self.pattern_keys.get(&key).copied()
    }

    /// Pattern reached after the blank moves, carrying a tile whose goal line is `goal_line`.
    #[inline]
    pub fn link(&self, index: u16, goal_line: usize, direction: LinkDirection) -> u16 {
        self.links[Self::link_slot(index as usize, goal_line, direction)]
    }

    #[inline]
    pub fn distance(&self, index: u16) -> u8 {
        self.distances[index as usize]
    }

    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    pub fn max_distance(&self) -> u8 {
        self.distances.iter().copied().max().unwrap_or(0)
    }

    /// Copy whose links all lead nowhere, so the first move fails.
    #[cfg(test)]
    pub(crate) fn with_links_cut(&self) -> Self {
        let mut tables = self.clone();
        tables.links.fill(NO_LINK);
        tables
    }

    /// Copy that rates every pattern as solved.
    #[cfg(test)]
    pub(crate) fn with_distances_zeroed(&self) -> Self {
        let mut tables = self.clone();
        tables.distances.fill(0);
        tables
    }
}
