//! Board-key normalization and canonical column-key inference.
//!
//! The supervisor reports device state as nested mappings of uneven depth:
//! board-level rows (names, firmware), ADC-level rows (temperatures) and
//! RF-level rows (gains, levels). To lay every row of a panel out on one
//! column grid, all keys are first normalized to integer tuples and then
//! reduced to a single canonical, sorted, gap-filled set of deepest keys.
//! A board that runs no firmware contributes only its board-level key; a
//! synthesized all-zero tail keeps it aligned with the boards that do.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::debug;

use crate::error::{McError, McResult};

/// Normalize a board name to its zero-based index.
///
/// Fixed naming convention: boards are named with a 1-based trailing numeral
/// ("roach1", "roach2", ...), so "roach2" maps to index 1. This is not
/// general name parsing; a name without trailing digits, or numbered 0, is
/// rejected.
pub fn board_index(name: &str) -> McResult<u32> {
    let bytes = name.as_bytes();
    let start = bytes
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    let digits = &name[start..];
    let number: u32 = digits
        .parse()
        .map_err(|_| McError::BoardName(name.to_string()))?;
    if number == 0 {
        return Err(McError::BoardName(name.to_string()));
    }
    Ok(number - 1)
}

/// Integer key tuple of depth 1..=3 addressing one grid column (or a span of
/// columns when shallower than the grid's deepest keys).
///
/// Ordering is lexicographic by tuple value, which is also the column order.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridKey(Vec<u32>);

impl GridKey {
    pub fn new(parts: Vec<u32>) -> Self {
        GridKey(parts)
    }

    /// Depth-1 key for one board.
    pub fn board(index: u32) -> Self {
        GridKey(vec![index])
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn parts(&self) -> &[u32] {
        &self.0
    }

    /// Leading (board) component, if any.
    pub fn board_part(&self) -> Option<u32> {
        self.0.first().copied()
    }

    /// This key extended with trailing zeros out to `depth`.
    pub fn padded_to(&self, depth: usize) -> GridKey {
        let mut parts = self.0.clone();
        while parts.len() < depth {
            parts.push(0);
        }
        GridKey(parts)
    }

    /// True when `other` starts with this key (equal keys count).
    pub fn is_prefix_of(&self, other: &GridKey) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }
}

impl fmt::Display for GridKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{part}")?;
        }
        write!(f, ")")
    }
}

impl From<&[u32]> for GridKey {
    fn from(parts: &[u32]) -> Self {
        GridKey(parts.to_vec())
    }
}

/// Compute the canonical ordered column keys for a set of rows.
///
/// Each input set holds the (already normalized) keys of one row. The result
/// is the de-duplicated set of keys at the highest observed depth, padded so
/// that every board named by a depth-1 key is represented, then sorted.
///
/// Rows of intermediate depth (an ADC-level temperature row between board
/// and RF rows) are legal: they contribute no columns and are later placed
/// by prefix matching. What cannot be reconciled is a board whose deepest
/// contribution is neither board-level (absent firmware, recoverable by
/// zero padding) nor the grid's highest depth; that fails with
/// `KeyInconsistency`. An empty input yields an empty result.
pub fn canonical_keys(sets: &[Vec<GridKey>]) -> McResult<Vec<GridKey>> {
    let mut by_depth: BTreeMap<usize, Vec<GridKey>> = BTreeMap::new();
    let mut deepest_per_board: BTreeMap<u32, usize> = BTreeMap::new();
    for set in sets {
        for key in set {
            if key.depth() == 0 {
                continue;
            }
            let bucket = by_depth.entry(key.depth()).or_default();
            if !bucket.contains(key) {
                bucket.push(key.clone());
            }
            if let Some(board) = key.board_part() {
                let deepest = deepest_per_board.entry(board).or_insert(0);
                *deepest = (*deepest).max(key.depth());
            }
        }
    }
    let highest = match by_depth.keys().next_back() {
        Some(depth) => *depth,
        None => return Ok(Vec::new()),
    };
    for (&board, &deepest) in &deepest_per_board {
        if deepest != 1 && deepest != highest {
            return Err(McError::KeyInconsistency(format!(
                "board {board} reports depth {deepest}, grid needs {highest} or board-level"
            )));
        }
    }

    let mut keys = by_depth.get(&highest).cloned().unwrap_or_default();
    if highest > 1 {
        if let Some(boards) = by_depth.get(&1) {
            // Every board needs at least one column, even with no firmware.
            let covered: BTreeSet<u32> =
                keys.iter().filter_map(GridKey::board_part).collect();
            let uncovered = boards
                .iter()
                .any(|b| b.board_part().map(|i| !covered.contains(&i)).unwrap_or(false));
            if uncovered {
                for board in boards {
                    let padded = board.padded_to(highest);
                    if !keys.contains(&padded) {
                        let position =
                            (board.board_part().unwrap_or(0) as usize).min(keys.len());
                        debug!("synthesizing column key {padded} at position {position}");
                        keys.insert(position, padded);
                    }
                }
            }
        }
    }

    keys.sort();
    keys.dedup();
    Ok(keys)
}
