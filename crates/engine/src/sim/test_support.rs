//! Builders shared by processor tests.

use super::components::{
    AttackCooldown, AttackKind, CombatStats, Faction, Health, LastValidPosition, MoveSpeed,
    Position, Resistances, StatusEffects, Velocity,
};
use super::events::Skill;
use super::map::{TileKind, Tilemap};
use super::world::{EntityId, EntityStore, Vec2};
use crate::content::{
    CreatureAi, CreatureDef, CreatureDefId, DefDatabase, SpellDef, SpellDefId, SpellKind,
    SpellTargeting,
};
use crate::sim::components::DamageType;

pub(crate) fn open_room(width: u32, height: u32) -> Tilemap {
    Tilemap::filled(width, height, TileKind::Floor)
}

/// Melee combatant with 100 health, no attributes and a ready attack.
pub(crate) fn spawn_fighter(
    store: &mut EntityStore,
    position: Vec2,
    faction: Faction,
    damage: u32,
    armor: u32,
) -> EntityId {
    let id = store.spawn();
    store.positions.insert(id, Position(position));
    store.velocities.insert(id, Velocity(Vec2::ZERO));
    store.move_speeds.insert(id, MoveSpeed(4.0));
    store.healths.insert(id, Health::full(100));
    store.combat_stats.insert(
        id,
        CombatStats {
            damage,
            armor,
            attack_speed: 1.0,
            attack_range: 1.5,
            attack_kind: AttackKind::Melee,
        },
    );
    store.factions.insert(id, faction);
    store.attack_cooldowns.insert(id, AttackCooldown::default());
    store.status_effects.insert(id, StatusEffects::default());
    store.last_valid_positions.insert(id, LastValidPosition(position));
    id
}

pub(crate) fn spell_def(def_name: &str, kind: SpellKind, targeting: SpellTargeting) -> SpellDef {
    SpellDef {
        id: SpellDefId(0),
        def_name: def_name.to_string(),
        label: def_name.to_string(),
        kind,
        targeting,
        school: Skill::CombatMagic,
        mana_cost: 10,
        cooldown: 1.0,
        global_cooldown: 0.5,
        cast_time: 0.0,
        range: 8.0,
        damage: 0,
        damage_type: DamageType::Arcane,
        heal: 0,
        projectile_speed: 12.0,
        homing: false,
        radius: 0.0,
        duration: 0.0,
        tick_interval: 0.5,
        tick_damage: 0,
        status: None,
    }
}

pub(crate) fn defs_with_spells(spells: Vec<SpellDef>) -> DefDatabase {
    DefDatabase::from_defs(spells, Vec::new())
}

/// Creature def with the compiler's defaults and no spells.
pub(crate) fn creature_def(def_name: &str, faction: Faction, ai: CreatureAi) -> CreatureDef {
    CreatureDef {
        id: CreatureDefId(0),
        def_name: def_name.to_string(),
        label: def_name.to_string(),
        faction,
        health: 100,
        mana: 0,
        move_speed: 5.0,
        damage: 5,
        armor: 0,
        attack_speed: 1.0,
        attack_range: 1.5,
        attack_kind: AttackKind::Melee,
        attributes: None,
        resistances: Resistances::default(),
        ai,
        aggro_range: None,
        leash_range: None,
        spells: Vec::new(),
        mana_regen: 0.0,
        health_regen: 0.0,
        xp_value: 0,
        gold_drop: 0,
    }
}
