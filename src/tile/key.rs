//! Quad-tree tile keys.
//!
//! A [`TileKey`] is a `(row, column, level)` triple. At level `n` the grid is
//! `2^n` rows by `2^n` columns; level 0 is the single root tile.
//!
//! # Morton code
//!
//! Keys are also identified by a single integer: a sentinel bit at
//! position `2 * level` followed by the interleaved bits of the column
//! (even positions) and row (odd positions). The root is `1`, its four
//! children are `4..=7`. The decimal string of the Morton code is the tile
//! identifier used in platform URLs.
//!
//! ```text
//!   level 1:   ┌───┬───┐
//!              │ 4 │ 5 │   row 0
//!              ├───┼───┤
//!              │ 6 │ 7 │   row 1
//!              └───┴───┘
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::TileError;

/// Deepest supported level. Keeps the Morton code within a `u64`.
pub const MAX_LEVEL: u32 = 31;

/// Identifies a node in the quad-tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    /// Row (0-indexed from the top)
    pub row: u32,

    /// Column (0-indexed from the left)
    pub column: u32,

    /// Level (0 = root)
    pub level: u32,
}

impl TileKey {
    /// Create a key without validation.
    pub const fn new(row: u32, column: u32, level: u32) -> Self {
        Self { row, column, level }
    }

    /// Create a key, checking the level and that row and column fit the grid.
    pub fn try_new(row: u32, column: u32, level: u32) -> Result<Self, TileError> {
        let key = Self::new(row, column, level);
        if !key.is_valid() {
            return Err(TileError::InvalidTileKey(format!(
                "row {row} / column {column} out of range for level {level} (max level {MAX_LEVEL})"
            )));
        }
        Ok(key)
    }

    /// Number of rows (and columns) at a level.
    pub fn rows_at_level(level: u32) -> u64 {
        1u64 << level
    }

    /// Whether the level is supported and row/column lie inside the grid.
    pub fn is_valid(&self) -> bool {
        if self.level > MAX_LEVEL {
            return false;
        }
        let size = Self::rows_at_level(self.level);
        u64::from(self.row) < size && u64::from(self.column) < size
    }

    /// The tile one level up, or `None` for the root.
    pub fn parent(&self) -> Option<TileKey> {
        if self.level == 0 {
            return None;
        }
        Some(Self::new(self.row >> 1, self.column >> 1, self.level - 1))
    }

    /// Move `delta` levels: positive towards the leaves (the top-left
    /// descendant), negative towards the root.
    ///
    /// Moving above the root clamps to level 0.
    pub fn changed_level_by(&self, delta: i32) -> TileKey {
        let level = (i64::from(self.level) + i64::from(delta)).clamp(0, i64::from(MAX_LEVEL));
        self.changed_level_to(level as u32)
    }

    /// Move to an absolute level, shifting row and column accordingly.
    pub fn changed_level_to(&self, level: u32) -> TileKey {
        let level = level.min(MAX_LEVEL);
        if level >= self.level {
            let shift = level - self.level;
            Self::new(self.row << shift, self.column << shift, level)
        } else {
            let shift = self.level - level;
            Self::new(
                self.row.checked_shr(shift).unwrap_or(0),
                self.column.checked_shr(shift).unwrap_or(0),
                level,
            )
        }
    }

    /// One of the four children: quadrant bit 0 selects the column, bit 1
    /// the row, matching the Morton ordering.
    pub fn child(&self, quadrant: u8) -> Option<TileKey> {
        if quadrant > 3 || self.level >= MAX_LEVEL {
            return None;
        }
        let column = (self.column << 1) | u32::from(quadrant & 1);
        let row = (self.row << 1) | u32::from(quadrant >> 1);
        Some(Self::new(row, column, self.level + 1))
    }

    /// All four children in Morton order. Empty at [`MAX_LEVEL`].
    pub fn children(&self) -> Vec<TileKey> {
        (0..4).filter_map(|q| self.child(q)).collect()
    }

    /// Whether `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &TileKey) -> bool {
        other.level > self.level && other.changed_level_to(self.level) == *self
    }

    /// Encode as a Morton code.
    ///
    /// Levels past [`MAX_LEVEL`] do not fit in 64 bits; such keys are
    /// encoded at [`MAX_LEVEL`]. Check [`is_valid`](Self::is_valid) first.
    pub fn morton_code(&self) -> u64 {
        let level = self.level.min(MAX_LEVEL);
        let mut code = 1u64 << (2 * level);
        let mut row = self.row;
        let mut column = self.column;
        for i in 0..level {
            if column & 1 == 1 {
                code |= 1 << (2 * i);
            }
            if row & 1 == 1 {
                code |= 1 << (2 * i + 1);
            }
            column >>= 1;
            row >>= 1;
        }
        code
    }

    /// Decode a Morton code.
    pub fn from_morton_code(code: u64) -> Result<TileKey, TileError> {
        if code == 0 {
            return Err(TileError::InvalidTileKey(
                "Morton code 0 has no sentinel bit".to_string(),
            ));
        }
        let top_bit = 63 - code.leading_zeros();
        if top_bit % 2 != 0 {
            return Err(TileError::InvalidTileKey(format!(
                "Morton code {code} has its sentinel bit at an odd position"
            )));
        }

        let level = top_bit / 2;
        let mut row = 0u32;
        let mut column = 0u32;
        for i in 0..level {
            if code & (1 << (2 * i)) != 0 {
                column |= 1 << i;
            }
            if code & (1 << (2 * i + 1)) != 0 {
                row |= 1 << i;
            }
        }
        Ok(Self::new(row, column, level))
    }

    /// The decimal Morton code string used as tile identifier in URLs.
    pub fn to_here_tile(&self) -> String {
        self.morton_code().to_string()
    }

    /// Parse a decimal Morton code string.
    pub fn from_here_tile(tile: &str) -> Result<TileKey, TileError> {
        let code = tile
            .parse::<u64>()
            .map_err(|e| TileError::InvalidTileKey(format!("'{tile}': {e}")))?;
        Self::from_morton_code(code)
    }

    /// Path key of this tile relative to its ancestor `depth` levels up.
    ///
    /// This is the Morton code string of the tile's position inside the
    /// ancestor's subtree, the form used by quad-tree index entries. The
    /// ancestor itself (`depth == 0`) is `"1"`.
    pub fn relative_key(&self, depth: u32) -> String {
        let depth = depth.min(self.level);
        let mask = if depth >= 32 { u32::MAX } else { (1u32 << depth) - 1 };
        Self::new(self.row & mask, self.column & mask, depth).to_here_tile()
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.row, self.column)
    }
}

impl FromStr for TileKey {
    type Err = TileError;

    /// Accepts either `level/row/column` or a decimal Morton code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [single] => Self::from_here_tile(single),
            [level, row, column] => {
                let parse = |v: &str, name: &str| {
                    v.trim()
                        .parse::<u32>()
                        .map_err(|e| TileError::InvalidTileKey(format!("{name} '{v}': {e}")))
                };
                Self::try_new(parse(row, "row")?, parse(column, "column")?, parse(level, "level")?)
            }
            _ => Err(TileError::InvalidTileKey(format!(
                "expected 'level/row/column' or a Morton code, got '{s}'"
            ))),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
