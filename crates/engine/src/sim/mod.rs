//! Tactical simulation core: the entity store, the map abstraction and the
//! processors run by `Simulation::tick`.

mod ai;
mod combat;
mod components;
mod config;
mod events;
mod formulas;
mod intent;
mod los;
mod magic;
mod map;
mod movement;
mod nav;
mod party;
mod pipeline;
mod sanity;
mod spawn;
mod steering;
#[cfg(test)]
mod test_support;
mod world;

pub use ai::{AiStats, AI_QUERY};
pub use combat::COMBAT_QUERY;
pub use components::{
    AiController, AiRole, AiState, AllyPosture, AreaEffect, AttackCooldown, AttackKind,
    Attributes, CastIntent, CastTarget, Casting, CombatStats, CombatTarget, DamageType, Dead,
    Downed, Faction, GlobalCooldown, Health, InCombat, LastValidPosition, Mana, MoveSpeed, Name,
    NavPath, PlayerControlled, Position, Projectile, Regeneration, Resistances, SpellBook,
    StatusEffect, StatusEffectSpec, StatusEffects, StatusKind, Velocity, VisualEffect, VisualKind,
};
pub use config::{AiTuning, CombatTuning, MagicTuning, NavigationTuning, SanityTuning, SimConfig};
pub use events::{
    DamageDelivery, EventQueue, EventSink, EventSubscriber, SimEvent, SimEventCounts,
    SimEventKind, Skill, MAX_EVENTS_PER_FLUSH,
};
pub use formulas::{
    armor_multiplier, attack_cooldown_seconds, crit_chance, heal_amount, resolve_damage,
    DamageRoll,
};
pub use intent::{CommandApplyStats, CommandQueue, SimCommand, SimCommandKind};
pub use los::{first_wall_impact, has_clear_line, LineOfSightGate};
pub use magic::{CastRefusal, PROJECTILE_QUERY};
pub use map::{DungeonMap, TileCoord, TileKind, Tilemap, TilemapError};
pub use movement::{MovementStats, FREE_FLIGHT, MOVEMENT_QUERY};
pub use nav::{octile_distance, Pathfinder, TilePath};
pub use party::{party_members, PartyState};
pub use pipeline::{
    Simulation, SimSystemId, TickReport, MAX_TICK_SECONDS, SIM_SYSTEM_ORDER, SIM_SYSTEM_ORDER_TEXT,
};
pub use sanity::{nearest_walkable_tile, PositionRepair, RepairAction, SANITY_QUERY};
pub use spawn::{spawn_creature, SpawnError};
pub use world::{ComponentKind, ComponentSet, EntityAllocator, EntityId, EntityStore, Query, Vec2};
