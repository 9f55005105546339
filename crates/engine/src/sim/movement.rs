use tracing::trace;

use super::components::{Position, Velocity};
use super::map::DungeonMap;
use super::world::{ComponentKind, ComponentSet, EntityStore, Query, Vec2};

pub const MOVEMENT_QUERY: Query = Query::new(
    ComponentSet::EMPTY
        .with(ComponentKind::Position)
        .with(ComponentKind::Velocity),
    ComponentSet::EMPTY,
);

/// Kinds that move without ground collision and resolve their own boundaries.
pub const FREE_FLIGHT: ComponentSet = ComponentSet::EMPTY
    .with(ComponentKind::Projectile)
    .with(ComponentKind::AreaEffect)
    .with(ComponentKind::VisualEffect);

/// Kinds held in place regardless of velocity.
pub const HELD_IN_PLACE: ComponentSet = ComponentSet::EMPTY
    .with(ComponentKind::Dead)
    .with(ComponentKind::Downed);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MovementStats {
    pub moved: u32,
    pub slid: u32,
    pub blocked: u32,
}

pub(crate) fn run_movement(
    store: &mut EntityStore,
    map: &dyn DungeonMap,
    dt_seconds: f32,
) -> MovementStats {
    let mut stats = MovementStats::default();
    for id in store.query(MOVEMENT_QUERY) {
        let kinds = store.component_set(id);
        let (Some(position), Some(velocity)) = (store.position_of(id), store.velocities.get(id))
        else {
            continue;
        };
        let mut velocity = velocity.0;
        debug_assert!(velocity.is_finite(), "non-finite velocity on {id}");
        if !velocity.is_finite() {
            velocity = Vec2::ZERO;
            store.velocities.insert(id, Velocity(velocity));
        }

        let step = velocity * dt_seconds;
        let proposed = position + step;
        if kinds.intersects(FREE_FLIGHT) {
            store.positions.insert(id, Position(proposed));
            continue;
        }
        if kinds.intersects(HELD_IN_PLACE) {
            store.velocities.insert(id, Velocity(Vec2::ZERO));
            continue;
        }
        if velocity == Vec2::ZERO {
            continue;
        }

        if map.is_walkable(proposed.x, proposed.y) {
            store.positions.insert(id, Position(proposed));
            stats.moved += 1;
        } else if map.is_walkable(proposed.x, position.y) {
            store
                .positions
                .insert(id, Position(Vec2::new(proposed.x, position.y)));
            stats.slid += 1;
        } else if map.is_walkable(position.x, proposed.y) {
            store
                .positions
                .insert(id, Position(Vec2::new(position.x, proposed.y)));
            stats.slid += 1;
        } else {
            trace!(entity = %id, "move_blocked");
            stats.blocked += 1;
        }
    }
    stats
}
