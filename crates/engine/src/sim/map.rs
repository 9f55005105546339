use thiserror::Error;

use super::los;
use super::world::Vec2;

/// Read-only dungeon queries. Tiles are unit squares; tile (x, y) covers
/// world [x, x+1) x [y, y+1).
pub trait DungeonMap {
    fn is_walkable(&self, x: f32, y: f32) -> bool;

    fn has_line_of_sight(&self, from: Vec2, to: Vec2) -> bool {
        los::has_clear_line(self, from, to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub x: i32,
    pub y: i32,
}

impl TileCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn from_world(point: Vec2) -> Self {
        Self {
            x: point.x.floor() as i32,
            y: point.y.floor() as i32,
        }
    }

    pub fn center(self) -> Vec2 {
        Vec2::new(self.x as f32 + 0.5, self.y as f32 + 0.5)
    }
}

pub(crate) fn tile_walkable<M: DungeonMap + ?Sized>(map: &M, tile: TileCoord) -> bool {
    let center = tile.center();
    map.is_walkable(center.x, center.y)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileKind {
    Floor,
    Wall,
    Door,
    Stairs,
}

impl TileKind {
    pub fn is_walkable(self) -> bool {
        !matches!(self, Self::Wall)
    }

    fn from_glyph(glyph: char) -> Option<Self> {
        match glyph {
            '.' | '@' => Some(Self::Floor),
            '#' | ' ' => Some(Self::Wall),
            '+' => Some(Self::Door),
            '>' => Some(Self::Stairs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tilemap {
    width: u32,
    height: u32,
    tiles: Vec<TileKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TilemapError {
    #[error("tile count mismatch: expected {expected}, got {actual}")]
    TileCountMismatch { expected: usize, actual: usize },
    #[error("map has no rows")]
    Empty,
    #[error("row {row} has {actual} tiles, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("unknown map glyph '{glyph}' at ({x}, {y})")]
    UnknownGlyph { glyph: char, x: usize, y: usize },
}

impl Tilemap {
    pub fn new(width: u32, height: u32, tiles: Vec<TileKind>) -> Result<Self, TilemapError> {
        let expected = width as usize * height as usize;
        let actual = tiles.len();
        if expected != actual {
            return Err(TilemapError::TileCountMismatch { expected, actual });
        }
        Ok(Self {
            width,
            height,
            tiles,
        })
    }

    pub fn filled(width: u32, height: u32, kind: TileKind) -> Self {
        Self {
            width,
            height,
            tiles: vec![kind; width as usize * height as usize],
        }
    }

    /// ASCII rows, row `i` holding the tiles with y = i. `#` wall, `.` floor,
    /// `+` door, `>` stairs, `@` floor marking a spawn.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self, TilemapError> {
        let Some(first) = rows.first() else {
            return Err(TilemapError::Empty);
        };
        let width = first.as_ref().chars().count();
        if width == 0 {
            return Err(TilemapError::Empty);
        }

        let mut tiles = Vec::with_capacity(width * rows.len());
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            let actual = row.chars().count();
            if actual != width {
                return Err(TilemapError::RaggedRow {
                    row: y,
                    expected: width,
                    actual,
                });
            }
            for (x, glyph) in row.chars().enumerate() {
                let kind = TileKind::from_glyph(glyph)
                    .ok_or(TilemapError::UnknownGlyph { glyph, x, y })?;
                tiles.push(kind);
            }
        }

        Self::new(width as u32, rows.len() as u32, tiles)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn index_of(&self, tile: TileCoord) -> Option<usize> {
        if tile.x < 0 || tile.y < 0 {
            return None;
        }
        let (x, y) = (tile.x as u32, tile.y as u32);
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    pub fn tile_at(&self, tile: TileCoord) -> Option<TileKind> {
        self.index_of(tile)
            .and_then(|index| self.tiles.get(index).copied())
    }

    pub fn set_tile(&mut self, tile: TileCoord, kind: TileKind) -> bool {
        match self.index_of(tile) {
            Some(index) => {
                self.tiles[index] = kind;
                true
            }
            None => false,
        }
    }

    /// Tiles matching `glyph` in the given rows; used to locate spawn markers.
    pub fn glyph_positions<S: AsRef<str>>(rows: &[S], glyph: char) -> Vec<TileCoord> {
        let mut found = Vec::new();
        for (y, row) in rows.iter().enumerate() {
            for (x, candidate) in row.as_ref().chars().enumerate() {
                if candidate == glyph {
                    found.push(TileCoord::new(x as i32, y as i32));
                }
            }
        }
        found
    }
}

impl DungeonMap for Tilemap {
    fn is_walkable(&self, x: f32, y: f32) -> bool {
        if !x.is_finite() || !y.is_finite() {
            return false;
        }
        self.tile_at(TileCoord::from_world(Vec2::new(x, y)))
            .is_some_and(TileKind::is_walkable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_maps_glyphs_to_tiles() {
        let map = Tilemap::from_rows(&["#.+", ">@#"]).expect("map");
        assert_eq!(map.width(), 3);
        assert_eq!(map.height(), 2);
        assert_eq!(map.tile_at(TileCoord::new(0, 0)), Some(TileKind::Wall));
        assert_eq!(map.tile_at(TileCoord::new(2, 0)), Some(TileKind::Door));
        assert_eq!(map.tile_at(TileCoord::new(0, 1)), Some(TileKind::Stairs));
        assert_eq!(map.tile_at(TileCoord::new(1, 1)), Some(TileKind::Floor));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = Tilemap::from_rows(&["...", ".."]).expect_err("ragged");
        assert_eq!(
            err,
            TilemapError::RaggedRow {
                row: 1,
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn unknown_glyph_reports_position() {
        let err = Tilemap::from_rows(&["..", ".?"]).expect_err("glyph");
        assert_eq!(
            err,
            TilemapError::UnknownGlyph {
                glyph: '?',
                x: 1,
                y: 1
            }
        );
    }

    #[test]
    fn tile_count_mismatch_is_rejected() {
        let err = Tilemap::new(2, 2, vec![TileKind::Floor; 3]).expect_err("mismatch");
        assert_eq!(
            err,
            TilemapError::TileCountMismatch {
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn outside_bounds_and_walls_are_not_walkable() {
        let map = Tilemap::from_rows(&[".#"]).expect("map");
        assert!(map.is_walkable(0.5, 0.5));
        assert!(!map.is_walkable(1.5, 0.5));
        assert!(!map.is_walkable(-0.1, 0.5));
        assert!(!map.is_walkable(0.5, 1.0));
        assert!(!map.is_walkable(f32::NAN, 0.5));
    }

    #[test]
    fn glyph_positions_finds_spawn_markers() {
        let rows = ["#@.", "..@"];
        assert_eq!(
            Tilemap::glyph_positions(&rows, '@'),
            vec![TileCoord::new(1, 0), TileCoord::new(2, 1)]
        );
    }
}
