use tracing::warn;

use super::components::{Faction, LastValidPosition, Position};
use super::config::SanityTuning;
use super::intent::halt;
use super::map::{tile_walkable, DungeonMap, TileCoord};
use super::movement::FREE_FLIGHT;
use super::party::PartyState;
use super::world::{ComponentKind, ComponentSet, EntityId, EntityStore, Query, Vec2};

pub const SANITY_QUERY: Query = Query::new(
    ComponentSet::EMPTY.with(ComponentKind::Position),
    FREE_FLIGHT.with(ComponentKind::Dead),
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairAction {
    LastValidPosition,
    NearestWalkableTile,
    PartySpawn,
    Despawned,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionRepair {
    pub entity: EntityId,
    pub from: Vec2,
    pub action: RepairAction,
}

/// Last pass of the tick. Grounded entities standing on a non-walkable tile
/// are moved back somewhere walkable; everyone else has their position
/// recorded as the new fallback.
pub(crate) fn run_position_sanity(
    store: &mut EntityStore,
    map: &dyn DungeonMap,
    party: &PartyState,
    tuning: &SanityTuning,
) -> Vec<PositionRepair> {
    let mut repairs = Vec::new();
    for id in store.query(SANITY_QUERY) {
        debug_assert!(
            !store.component_set(id).intersects(FREE_FLIGHT),
            "free-flight entity reached the sanity pass"
        );
        let Some(position) = store.position_of(id) else {
            continue;
        };
        if map.is_walkable(position.x, position.y) {
            store
                .last_valid_positions
                .insert(id, LastValidPosition(position));
            continue;
        }

        let action = repair_entity(store, map, party, tuning, id, position);
        warn!(
            entity = %store.label(id),
            x = position.x,
            y = position.y,
            action = ?action,
            "position_repaired"
        );
        repairs.push(PositionRepair {
            entity: id,
            from: position,
            action,
        });
    }
    repairs
}

fn repair_entity(
    store: &mut EntityStore,
    map: &dyn DungeonMap,
    party: &PartyState,
    tuning: &SanityTuning,
    id: EntityId,
    position: Vec2,
) -> RepairAction {
    halt(store, id);

    if let Some(LastValidPosition(last)) = store.last_valid_positions.get(id).copied() {
        if map.is_walkable(last.x, last.y) {
            store.positions.insert(id, Position(last));
            return RepairAction::LastValidPosition;
        }
    }

    if let Some(tile) = nearest_walkable_tile(map, position, tuning.search_radius_tiles) {
        let center = tile.center();
        store.positions.insert(id, Position(center));
        store
            .last_valid_positions
            .insert(id, LastValidPosition(center));
        return RepairAction::NearestWalkableTile;
    }

    if store.faction_of(id) == Some(Faction::Party) {
        store.positions.insert(id, Position(party.spawn_point));
        store
            .last_valid_positions
            .insert(id, LastValidPosition(party.spawn_point));
        return RepairAction::PartySpawn;
    }

    store.despawn(id);
    RepairAction::Despawned
}

/// Closest walkable tile centre to `origin`, searching square rings of
/// growing radius. Within a ring, ties go to the first tile in row order.
pub fn nearest_walkable_tile<M: DungeonMap + ?Sized>(
    map: &M,
    origin: Vec2,
    max_radius: i32,
) -> Option<TileCoord> {
    let center = TileCoord::from_world(origin);
    if tile_walkable(map, center) {
        return Some(center);
    }
    for radius in 1..=max_radius.max(0) {
        let mut best: Option<(f32, TileCoord)> = None;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx.abs() != radius && dy.abs() != radius {
                    continue;
                }
                let tile = TileCoord::new(center.x + dx, center.y + dy);
                if !tile_walkable(map, tile) {
                    continue;
                }
                let distance = tile.center().distance_squared(origin);
                if best.map_or(true, |(best_distance, _)| distance < best_distance) {
                    best = Some((distance, tile));
                }
            }
        }
        if let Some((_, tile)) = best {
            return Some(tile);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::components::{Dead, Projectile};
    use crate::sim::map::Tilemap;
    use crate::sim::test_support::spawn_fighter;

    fn walled_map() -> Tilemap {
        Tilemap::from_rows(&[".....", "..#..", "....."]).expect("map")
    }

    #[test]
    fn walkable_positions_are_recorded() {
        let map = walled_map();
        let mut store = EntityStore::default();
        let id = spawn_fighter(&mut store, Vec2::new(0.5, 0.5), Faction::Party, 5, 0);
        store.positions.insert(id, Position(Vec2::new(3.5, 2.5)));

        let repairs = run_position_sanity(
            &mut store,
            &map,
            &PartyState::default(),
            &SanityTuning::default(),
        );

        assert!(repairs.is_empty());
        assert_eq!(
            store.last_valid_positions.get(id).map(|p| p.0),
            Some(Vec2::new(3.5, 2.5))
        );
    }

    #[test]
    fn entity_in_wall_returns_to_last_valid_position() {
        let map = walled_map();
        let mut store = EntityStore::default();
        let id = spawn_fighter(&mut store, Vec2::new(1.5, 1.5), Faction::Hostile, 5, 0);
        store.positions.insert(id, Position(Vec2::new(2.5, 1.5)));

        let repairs = run_position_sanity(
            &mut store,
            &map,
            &PartyState::default(),
            &SanityTuning::default(),
        );

        assert_eq!(repairs.len(), 1);
        assert_eq!(repairs[0].action, RepairAction::LastValidPosition);
        assert_eq!(store.position_of(id), Some(Vec2::new(1.5, 1.5)));
    }

    #[test]
    fn without_fallback_the_nearest_tile_is_used() {
        let map = walled_map();
        let mut store = EntityStore::default();
        let id = spawn_fighter(&mut store, Vec2::new(2.4, 1.5), Faction::Hostile, 5, 0);
        store.last_valid_positions.remove(id);

        let repairs = run_position_sanity(
            &mut store,
            &map,
            &PartyState::default(),
            &SanityTuning::default(),
        );

        assert_eq!(repairs[0].action, RepairAction::NearestWalkableTile);
        assert_eq!(store.position_of(id), Some(Vec2::new(1.5, 1.5)));
    }

    #[test]
    fn unplaceable_party_member_goes_to_spawn_and_enemy_is_despawned() {
        let map = Tilemap::from_rows(&["#####", "#####"]).expect("map");
        let mut store = EntityStore::default();
        let hero = spawn_fighter(&mut store, Vec2::new(1.5, 0.5), Faction::Party, 5, 0);
        let rat = spawn_fighter(&mut store, Vec2::new(3.5, 0.5), Faction::Hostile, 5, 0);
        let party = PartyState::new(Vec2::new(40.5, 40.5));

        let repairs = run_position_sanity(&mut store, &map, &party, &SanityTuning::default());

        assert_eq!(repairs.len(), 2);
        assert_eq!(store.position_of(hero), Some(Vec2::new(40.5, 40.5)));
        assert!(store.is_pending_despawn(rat));
    }

    #[test]
    fn projectiles_and_corpses_are_never_repaired() {
        let map = walled_map();
        let mut store = EntityStore::default();
        let corpse = spawn_fighter(&mut store, Vec2::new(2.5, 1.5), Faction::Hostile, 5, 0);
        store.dead.insert(
            corpse,
            Dead {
                elapsed: 0.0,
                killer: None,
            },
        );
        let bolt = store.spawn();
        store.positions.insert(bolt, Position(Vec2::new(2.5, 1.5)));
        store.projectiles.insert(
            bolt,
            Projectile {
                spell: crate::content::SpellDefId(0),
                caster: corpse,
                faction: Faction::Hostile,
                homing_target: None,
                aim_point: Vec2::ZERO,
                targets_ground: false,
                speed: 1.0,
                damage: 1,
                damage_type: crate::sim::components::DamageType::Physical,
                splash_radius: 0.0,
                status: None,
                lifetime_remaining: 1.0,
                last_position: Vec2::new(2.5, 1.5),
            },
        );

        let repairs = run_position_sanity(
            &mut store,
            &map,
            &PartyState::default(),
            &SanityTuning::default(),
        );

        assert!(repairs.is_empty());
        assert_eq!(store.position_of(bolt), Some(Vec2::new(2.5, 1.5)));
        assert_eq!(store.position_of(corpse), Some(Vec2::new(2.5, 1.5)));
    }
}
