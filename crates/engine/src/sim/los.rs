//! Supercover grid walk shared by the line-of-sight gate and projectile
//! wall sweeps.

use super::map::{tile_walkable, DungeonMap, TileCoord};
use super::world::Vec2;

const CORNER_EPSILON: f32 = 1e-5;
const SEGMENT_END_SLACK: f32 = 1e-4;

/// Visits every tile the segment touches, in travel order, passing the
/// segment parameter `t` at which the tile is entered. When the segment
/// crosses a tile corner exactly, both tiles beside the corner are visited
/// before the diagonal one. Stops early when `visit` returns false; the
/// return value says whether the walk ran to completion.
fn walk_supercover(from: Vec2, to: Vec2, mut visit: impl FnMut(TileCoord, f32) -> bool) -> bool {
    let mut tile = TileCoord::from_world(from);
    let end = TileCoord::from_world(to);
    if !visit(tile, 0.0) {
        return false;
    }

    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let step_x = axis_step(dx);
    let step_y = axis_step(dy);
    let t_delta_x = axis_delta(dx);
    let t_delta_y = axis_delta(dy);
    let mut t_max_x = axis_first_crossing(from.x, tile.x, dx);
    let mut t_max_y = axis_first_crossing(from.y, tile.y, dy);

    let max_steps = (end.x - tile.x).unsigned_abs() + (end.y - tile.y).unsigned_abs() + 2;
    for _ in 0..max_steps {
        if tile == end {
            break;
        }
        let t_next = t_max_x.min(t_max_y);
        if t_next > 1.0 + SEGMENT_END_SLACK {
            break;
        }

        if (t_max_x - t_max_y).abs() <= CORNER_EPSILON {
            let beside_x = TileCoord::new(tile.x + step_x, tile.y);
            let beside_y = TileCoord::new(tile.x, tile.y + step_y);
            if !visit(beside_x, t_next) || !visit(beside_y, t_next) {
                return false;
            }
            tile = TileCoord::new(tile.x + step_x, tile.y + step_y);
            t_max_x += t_delta_x;
            t_max_y += t_delta_y;
        } else if t_max_x < t_max_y {
            tile.x += step_x;
            t_max_x += t_delta_x;
        } else {
            tile.y += step_y;
            t_max_y += t_delta_y;
        }

        if !visit(tile, t_next) {
            return false;
        }
    }
    true
}

fn axis_step(delta: f32) -> i32 {
    if delta > 0.0 {
        1
    } else if delta < 0.0 {
        -1
    } else {
        0
    }
}

fn axis_delta(delta: f32) -> f32 {
    if delta == 0.0 {
        f32::INFINITY
    } else {
        1.0 / delta.abs()
    }
}

fn axis_first_crossing(origin: f32, tile: i32, delta: f32) -> f32 {
    if delta > 0.0 {
        (tile as f32 + 1.0 - origin) / delta
    } else if delta < 0.0 {
        (origin - tile as f32) / -delta
    } else {
        f32::INFINITY
    }
}

fn lexicographic_order(a: Vec2, b: Vec2) -> (Vec2, Vec2) {
    if (a.x, a.y) <= (b.x, b.y) {
        (a, b)
    } else {
        (b, a)
    }
}

/// True when no opaque tile lies on the segment. Both endpoint tiles count.
/// The walk always starts from the lexicographically smaller endpoint, so the
/// answer is identical in both directions.
pub fn has_clear_line<M: DungeonMap + ?Sized>(map: &M, a: Vec2, b: Vec2) -> bool {
    if !a.is_finite() || !b.is_finite() {
        return false;
    }
    let (start, end) = lexicographic_order(a, b);
    walk_supercover(start, end, |tile, _| tile_walkable(map, tile))
}

/// Point where travel from `from` to `to` first enters an opaque tile.
pub fn first_wall_impact<M: DungeonMap + ?Sized>(map: &M, from: Vec2, to: Vec2) -> Option<Vec2> {
    let mut impact = None;
    walk_supercover(from, to, |tile, t| {
        if tile_walkable(map, tile) {
            return true;
        }
        impact = Some(from + (to - from) * t);
        false
    });
    impact
}

/// Gate used before every damage and targeting action.
#[derive(Clone, Copy)]
pub struct LineOfSightGate<'a> {
    map: &'a dyn DungeonMap,
}

impl<'a> LineOfSightGate<'a> {
    pub fn new(map: &'a dyn DungeonMap) -> Self {
        Self { map }
    }

    pub fn clear(&self, from: Vec2, to: Vec2) -> bool {
        self.map.has_line_of_sight(from, to)
    }
}
