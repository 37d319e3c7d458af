//! Map rotation for auto-scheduled public games.
//!
//! The playlist holds `frequency[map]` copies of each map per cycle, shuffled
//! so that the same map never appears twice in a row. Once drained, a new
//! cycle is generated from the same seeded RNG.

use std::collections::VecDeque;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use skirmish_core::GameMapType;

use crate::error::{LobbyError, LobbyResult};

/// Shuffles tried before falling back to the greedy arrangement.
const MAX_SHUFFLE_ATTEMPTS: usize = 1000;

/// Built-in rotation weights.
pub const DEFAULT_FREQUENCIES: [(GameMapType, u32); 11] = [
    (GameMapType::World, 3),
    (GameMapType::Europe, 3),
    (GameMapType::Mena, 2),
    (GameMapType::NorthAmerica, 2),
    (GameMapType::BlackSea, 2),
    (GameMapType::Africa, 2),
    (GameMapType::Asia, 2),
    (GameMapType::Mars, 2),
    (GameMapType::Britannia, 2),
    (GameMapType::GatewayToTheAtlantic, 2),
    (GameMapType::Iceland, 2),
];

/// Produces the next map for each scheduled public game.
pub struct MapRotationPlanner {
    frequencies: Vec<(GameMapType, u32)>,
    playlist: VecDeque<GameMapType>,
    rng: StdRng,
    /// Last map handed out, so a new cycle does not open with it.
    last_served: Option<GameMapType>,
    cycles: u64,
}

impl MapRotationPlanner {
    /// Planner over the built-in frequency table.
    pub fn new(seed: u64) -> Self {
        Self {
            frequencies: DEFAULT_FREQUENCIES.to_vec(),
            playlist: VecDeque::new(),
            rng: StdRng::seed_from_u64(seed),
            last_served: None,
            cycles: 0,
        }
    }

    /// Planner over a custom frequency table.
    ///
    /// Rejects tables with no maps and tables where one map outnumbers the
    /// rest so heavily that adjacent repeats are unavoidable.
    pub fn with_frequencies(seed: u64, frequencies: &[(GameMapType, u32)]) -> LobbyResult<Self> {
        let mut merged: Vec<(GameMapType, u32)> = Vec::new();
        for &(map, count) in frequencies {
            match merged.iter_mut().find(|(m, _)| *m == map) {
                Some(entry) => entry.1 += count,
                None => merged.push((map, count)),
            }
        }
        merged.retain(|(_, count)| *count > 0);

        let total: u32 = merged.iter().map(|(_, c)| c).sum();
        if total == 0 {
            return Err(LobbyError::InvalidRotation("no maps in frequency table".into()));
        }
        let largest = merged.iter().map(|(_, c)| *c).max().unwrap_or(0);
        if largest > total - largest + 1 {
            return Err(LobbyError::InvalidRotation(format!(
                "a map with {largest} of {total} slots cannot avoid repeating"
            )));
        }

        Ok(Self {
            frequencies: merged,
            playlist: VecDeque::new(),
            rng: StdRng::seed_from_u64(seed),
            last_served: None,
            cycles: 0,
        })
    }

    /// Pop the next map, generating a new cycle first if the current one is
    /// exhausted.
    pub fn next_map(&mut self) -> GameMapType {
        if self.playlist.is_empty() {
            self.regenerate();
        }
        // Never empty after regenerate: the table holds at least one map.
        let map = self.playlist.pop_front().unwrap_or(self.frequencies[0].0);
        self.last_served = Some(map);
        map
    }

    /// Put back a map that was drawn but never used.
    pub fn restore(&mut self, map: GameMapType) {
        self.playlist.push_front(map);
        self.last_served = None;
    }

    /// Maps left in the current cycle.
    pub fn remaining(&self) -> usize {
        self.playlist.len()
    }

    /// Upcoming maps of the current cycle, front first.
    pub fn upcoming(&self) -> impl Iterator<Item = GameMapType> + '_ {
        self.playlist.iter().copied()
    }

    /// Number of cycles generated so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn regenerate(&mut self) {
        let mut maps: Vec<GameMapType> = self
            .frequencies
            .iter()
            .flat_map(|&(map, count)| std::iter::repeat_n(map, count as usize))
            .collect();

        let distinct = self.frequencies.len();
        let previous = if distinct > 1 { self.last_served } else { None };

        let mut shuffled = false;
        for _ in 0..MAX_SHUFFLE_ATTEMPTS {
            maps.shuffle(&mut self.rng);
            if all_non_consecutive(&maps) && maps.first().copied() != previous {
                shuffled = true;
                break;
            }
        }
        if !shuffled {
            debug!("shuffle attempts exhausted, using greedy arrangement");
            maps = self.greedy_arrangement(previous);
            if !all_non_consecutive(&maps) {
                // Avoiding the previous map made the cycle itself infeasible.
                maps = self.greedy_arrangement(None);
            }
        }

        self.cycles += 1;
        debug!(cycle = self.cycles, len = maps.len(), "map playlist regenerated");
        self.playlist = maps.into();
    }

    /// Always pick a map with the most copies left that differs from the
    /// previous pick. Succeeds for every table accepted by
    /// [`with_frequencies`](Self::with_frequencies).
    fn greedy_arrangement(&mut self, previous: Option<GameMapType>) -> Vec<GameMapType> {
        let mut left: Vec<(GameMapType, u32)> = self.frequencies.clone();
        let total: u32 = left.iter().map(|(_, c)| c).sum();
        let mut out = Vec::with_capacity(total as usize);
        let mut prev = previous;

        while out.len() < total as usize {
            let best = left
                .iter()
                .filter(|(map, count)| *count > 0 && Some(*map) != prev)
                .map(|(_, count)| *count)
                .max();
            let candidates: Vec<usize> = match best {
                Some(best) => left
                    .iter()
                    .enumerate()
                    .filter(|(_, (map, count))| *count == best && Some(*map) != prev)
                    .map(|(i, _)| i)
                    .collect(),
                // Only the previous map is left; can only happen when it was
                // carried over from the last cycle.
                None => left
                    .iter()
                    .enumerate()
                    .filter(|(_, (_, count))| *count > 0)
                    .map(|(i, _)| i)
                    .collect(),
            };
            let pick = candidates[self.rng.gen_range(0..candidates.len())];
            left[pick].1 -= 1;
            out.push(left[pick].0);
            prev = Some(left[pick].0);
        }
        out
    }
}

/// Whether no two neighbouring entries are equal.
pub fn all_non_consecutive(maps: &[GameMapType]) -> bool {
    maps.windows(2).all(|w| w[0] != w[1])
}
