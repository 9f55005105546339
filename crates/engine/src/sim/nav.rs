use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::debug;

use super::components::NavPath;
use super::map::{tile_walkable, DungeonMap, TileCoord};
use super::world::Vec2;

pub const DEFAULT_PATH_ITERATION_CAP: usize = 4096;
const STRAIGHT_STEP_COST: u32 = 10;
const DIAGONAL_STEP_COST: u32 = 14;

/// Neighbour order fixes insertion order, which is the final tie-break.
const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (0, 1),
    (1, 0),
    (0, -1),
    (-1, 0),
    (1, 1),
    (1, -1),
    (-1, -1),
    (-1, 1),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePath {
    pub tiles: Vec<TileCoord>,
    pub cost: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    coord: TileCoord,
    g_cost: u32,
    f_cost: u32,
    insertion_order: u64,
}

fn open_node_order_key(node: &OpenNode) -> (u32, u64) {
    (node.f_cost, node.insertion_order)
}

impl Ord for OpenNode {
    // BinaryHeap is a max-heap; reverse so the lowest key pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        open_node_order_key(other).cmp(&open_node_order_key(self))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub fn octile_distance(a: TileCoord, b: TileCoord) -> u32 {
    let dx = a.x.abs_diff(b.x);
    let dy = a.y.abs_diff(b.y);
    let diagonal = dx.min(dy);
    let straight = dx.max(dy) - diagonal;
    diagonal * DIAGONAL_STEP_COST + straight * STRAIGHT_STEP_COST
}

/// Grid A* over any `DungeonMap`. 8-way movement; diagonals may not cut a
/// wall corner.
pub struct Pathfinder<'a> {
    map: &'a dyn DungeonMap,
    iteration_cap: usize,
}

impl<'a> Pathfinder<'a> {
    pub fn new(map: &'a dyn DungeonMap) -> Self {
        Self {
            map,
            iteration_cap: DEFAULT_PATH_ITERATION_CAP,
        }
    }

    pub fn with_iteration_cap(mut self, iteration_cap: usize) -> Self {
        self.iteration_cap = iteration_cap.max(1);
        self
    }

    /// World-space path as a fresh `NavPath`. `None` means stay put.
    pub fn find_path(&self, start: Vec2, goal: Vec2) -> Option<NavPath> {
        let start_tile = TileCoord::from_world(start);
        let goal_tile = TileCoord::from_world(goal);
        let tile_path = self.find_tile_path(start_tile, goal_tile)?;

        let mut waypoints = tile_path
            .tiles
            .iter()
            .skip(1)
            .map(|tile| tile.center())
            .collect::<Vec<_>>();
        match waypoints.last_mut() {
            Some(last) => *last = goal,
            None => waypoints.push(goal),
        }
        Some(NavPath::new(goal, waypoints))
    }

    /// Like `find_path`, then drops intermediate waypoints the previous kept
    /// point can already see.
    pub fn find_smoothed_path(&self, start: Vec2, goal: Vec2) -> Option<NavPath> {
        let mut path = self.find_path(start, goal)?;
        path.waypoints = smooth_waypoints(self.map, start, &path.waypoints);
        Some(path)
    }

    pub fn find_tile_path(&self, start: TileCoord, goal: TileCoord) -> Option<TilePath> {
        if !tile_walkable(self.map, start) || !tile_walkable(self.map, goal) {
            return None;
        }
        if start == goal {
            return Some(TilePath {
                tiles: vec![start],
                cost: 0,
            });
        }

        let mut open = BinaryHeap::new();
        let mut closed = HashSet::<TileCoord>::new();
        let mut best_g = HashMap::<TileCoord, u32>::new();
        let mut parent = HashMap::<TileCoord, TileCoord>::new();
        let mut next_insertion = 0u64;
        let mut expansions = 0usize;

        let start_h = octile_distance(start, goal);
        open.push(OpenNode {
            coord: start,
            g_cost: 0,
            f_cost: start_h,
            insertion_order: next_insertion,
        });
        next_insertion += 1;
        best_g.insert(start, 0);

        while let Some(current) = open.pop() {
            if !closed.insert(current.coord) {
                continue;
            }
            if current.coord == goal {
                let tiles = reconstruct_tile_path(&parent, start, goal)?;
                return Some(TilePath {
                    tiles,
                    cost: current.g_cost,
                });
            }

            expansions += 1;
            if expansions > self.iteration_cap {
                debug!(
                    start_x = start.x,
                    start_y = start.y,
                    goal_x = goal.x,
                    goal_y = goal.y,
                    cap = self.iteration_cap,
                    "path_search_capped"
                );
                return None;
            }

            for (dx, dy) in NEIGHBOR_OFFSETS {
                let neighbor = TileCoord::new(current.coord.x + dx, current.coord.y + dy);
                if closed.contains(&neighbor) || !tile_walkable(self.map, neighbor) {
                    continue;
                }
                let diagonal = dx != 0 && dy != 0;
                if diagonal && !self.diagonal_is_open(current.coord, dx, dy) {
                    continue;
                }

                let step = if diagonal {
                    DIAGONAL_STEP_COST
                } else {
                    STRAIGHT_STEP_COST
                };
                let tentative_g = current.g_cost.saturating_add(step);
                if best_g
                    .get(&neighbor)
                    .is_some_and(|known| tentative_g >= *known)
                {
                    continue;
                }

                best_g.insert(neighbor, tentative_g);
                parent.insert(neighbor, current.coord);
                open.push(OpenNode {
                    coord: neighbor,
                    g_cost: tentative_g,
                    f_cost: tentative_g.saturating_add(octile_distance(neighbor, goal)),
                    insertion_order: next_insertion,
                });
                next_insertion += 1;
            }
        }

        None
    }

    fn diagonal_is_open(&self, from: TileCoord, dx: i32, dy: i32) -> bool {
        tile_walkable(self.map, TileCoord::new(from.x + dx, from.y))
            && tile_walkable(self.map, TileCoord::new(from.x, from.y + dy))
    }
}

fn reconstruct_tile_path(
    parent: &HashMap<TileCoord, TileCoord>,
    start: TileCoord,
    goal: TileCoord,
) -> Option<Vec<TileCoord>> {
    let mut cursor = goal;
    let mut tiles = vec![cursor];
    while cursor != start {
        cursor = *parent.get(&cursor)?;
        tiles.push(cursor);
    }
    tiles.reverse();
    Some(tiles)
}

pub fn smooth_waypoints(map: &dyn DungeonMap, start: Vec2, waypoints: &[Vec2]) -> Vec<Vec2> {
    let mut smoothed = Vec::with_capacity(waypoints.len());
    let mut anchor = start;
    let mut index = 0usize;
    while index < waypoints.len() {
        let mut furthest = index;
        for candidate in (index + 1)..waypoints.len() {
            if map.has_line_of_sight(anchor, waypoints[candidate]) {
                furthest = candidate;
            } else {
                break;
            }
        }
        smoothed.push(waypoints[furthest]);
        anchor = waypoints[furthest];
        index = furthest + 1;
    }
    smoothed
}
