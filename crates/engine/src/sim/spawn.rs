use thiserror::Error;
use tracing::debug;

use super::components::{
    AiController, AiRole, AllyPosture, AttackCooldown, CombatStats, GlobalCooldown, Health,
    LastValidPosition, Mana, MoveSpeed, Name, Position, Regeneration, SpellBook, StatusEffects,
    Velocity,
};
use super::config::AiTuning;
use super::map::DungeonMap;
use super::world::{EntityId, EntityStore, Vec2};
use crate::content::{CreatureAi, CreatureDefId, DefDatabase};

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("unknown creature def id {0}")]
    UnknownCreature(u32),
    #[error("cannot spawn {def_name} on non-walkable point ({x}, {y})")]
    NotWalkable { def_name: String, x: f32, y: f32 },
    #[error("creature {def_name} knows unknown spell id {spell_id}")]
    UnknownSpell { def_name: String, spell_id: u32 },
}

/// Creates a character from its def with every component its def implies.
/// Allies start in the Follow posture.
pub fn spawn_creature(
    store: &mut EntityStore,
    defs: &DefDatabase,
    map: &dyn DungeonMap,
    tuning: &AiTuning,
    def_id: CreatureDefId,
    position: Vec2,
) -> Result<EntityId, SpawnError> {
    let def = defs
        .creature_def(def_id)
        .ok_or(SpawnError::UnknownCreature(def_id.0))?;
    if !position.is_finite() || !map.is_walkable(position.x, position.y) {
        return Err(SpawnError::NotWalkable {
            def_name: def.def_name.clone(),
            x: position.x,
            y: position.y,
        });
    }
    if let Some(missing) = def
        .spells
        .iter()
        .find(|spell| defs.spell_def(**spell).is_none())
    {
        return Err(SpawnError::UnknownSpell {
            def_name: def.def_name.clone(),
            spell_id: missing.0,
        });
    }

    let id = store.spawn();
    store.names.insert(id, Name(def.label.clone()));
    store.positions.insert(id, Position(position));
    store.last_valid_positions.insert(id, LastValidPosition(position));
    store.velocities.insert(id, Velocity(Vec2::ZERO));
    store.move_speeds.insert(id, MoveSpeed(def.move_speed));
    store.healths.insert(id, Health::full(def.health));
    store.combat_stats.insert(
        id,
        CombatStats {
            damage: def.damage,
            armor: def.armor,
            attack_speed: def.attack_speed,
            attack_range: def.attack_range,
            attack_kind: def.attack_kind,
        },
    );
    store.attack_cooldowns.insert(id, AttackCooldown::default());
    store.factions.insert(id, def.faction);
    store.resistances.insert(id, def.resistances);
    store.status_effects.insert(id, StatusEffects::default());
    if let Some(attributes) = def.attributes {
        store.attributes.insert(id, attributes);
    }
    if def.mana > 0 {
        store.manas.insert(id, Mana::full(def.mana));
    }
    if !def.spells.is_empty() {
        store.spell_books.insert(id, SpellBook::new(def.spells.clone()));
        store.global_cooldowns.insert(id, GlobalCooldown::default());
    }
    if def.mana_regen > 0.0 || def.health_regen > 0.0 {
        store.regenerations.insert(
            id,
            Regeneration {
                mana_per_second: def.mana_regen,
                health_per_second: def.health_regen,
                ..Regeneration::default()
            },
        );
    }

    let role = match def.ai {
        CreatureAi::None => None,
        CreatureAi::Enemy => Some(AiRole::Enemy),
        CreatureAi::Ally => Some(AiRole::Ally {
            posture: AllyPosture::Follow,
        }),
    };
    if let Some(role) = role {
        store.ai_controllers.insert(
            id,
            AiController::new(
                role,
                position,
                def.aggro_range.unwrap_or(tuning.default_aggro_range),
                def.leash_range.unwrap_or(tuning.default_leash_range),
            ),
        );
    }

    debug!(
        entity = %id,
        def = %def.def_name,
        x = position.x,
        y = position.y,
        "creature_spawned"
    );
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{CreatureDef, SpellKind, SpellTargeting};
    use crate::sim::components::{AttackKind, Faction, Resistances};
    use crate::sim::map::Tilemap;
    use crate::sim::test_support::spell_def;

    fn rat_def(spells: Vec<crate::content::SpellDefId>) -> CreatureDef {
        CreatureDef {
            id: CreatureDefId(0),
            def_name: "creature.rat".to_string(),
            label: "Rat".to_string(),
            faction: Faction::Hostile,
            health: 30,
            mana: 20,
            move_speed: 5.0,
            damage: 4,
            armor: 2,
            attack_speed: 1.0,
            attack_range: 1.5,
            attack_kind: AttackKind::Melee,
            attributes: None,
            resistances: Resistances::default(),
            ai: CreatureAi::Enemy,
            aggro_range: None,
            leash_range: Some(20.0),
            spells,
            mana_regen: 2.0,
            health_regen: 0.0,
            xp_value: 5,
            gold_drop: 3,
        }
    }

    #[test]
    fn spawn_attaches_components_from_def() {
        let map = Tilemap::from_rows(&["....", "...."]).expect("map");
        let defs = DefDatabase::from_defs(
            vec![spell_def("spell.bite", SpellKind::Instant, SpellTargeting::Enemy)],
            vec![rat_def(vec![crate::content::SpellDefId(0)])],
        );
        let rat_id = defs.creature_def_id_by_name("creature.rat").expect("rat");
        let mut store = EntityStore::default();

        let rat = spawn_creature(
            &mut store,
            &defs,
            &map,
            &AiTuning::default(),
            rat_id,
            Vec2::new(1.5, 0.5),
        )
        .expect("spawn");

        assert_eq!(store.healths.get(rat).map(|h| h.current), Some(30));
        assert_eq!(store.manas.get(rat).map(|m| m.maximum), Some(20));
        assert_eq!(store.faction_of(rat), Some(Faction::Hostile));
        assert!(store.spell_books.get(rat).is_some());
        assert!(store.regenerations.get(rat).is_some());
        let controller = store.ai_controllers.get(rat).expect("controller");
        assert_eq!(controller.role, AiRole::Enemy);
        assert_eq!(controller.aggro_range, 6.0);
        assert_eq!(controller.leash_range, 20.0);
        assert_eq!(controller.home, Vec2::new(1.5, 0.5));
    }

    #[test]
    fn spawn_on_wall_or_unknown_def_fails() {
        let map = Tilemap::from_rows(&[".#", ".."]).expect("map");
        let defs = DefDatabase::from_defs(Vec::new(), vec![rat_def(Vec::new())]);
        let rat_id = defs.creature_def_id_by_name("creature.rat").expect("rat");
        let mut store = EntityStore::default();
        let tuning = AiTuning::default();

        let on_wall =
            spawn_creature(&mut store, &defs, &map, &tuning, rat_id, Vec2::new(1.5, 0.5));
        assert!(matches!(on_wall, Err(SpawnError::NotWalkable { .. })));

        let unknown = spawn_creature(
            &mut store,
            &defs,
            &map,
            &tuning,
            CreatureDefId(9),
            Vec2::new(0.5, 0.5),
        );
        assert!(matches!(unknown, Err(SpawnError::UnknownCreature(9))));
        assert!(store.is_empty());
    }
}
