use std::collections::BTreeMap;

use serde::Deserialize;

use super::world::{EntityId, Vec2};
use crate::content::SpellDefId;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position(pub Vec2);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Velocity(pub Vec2);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveSpeed(pub f32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    pub current: u32,
    pub maximum: u32,
    pub last_hit_by: Option<EntityId>,
}

impl Health {
    pub fn full(maximum: u32) -> Self {
        Self {
            current: maximum,
            maximum,
            last_hit_by: None,
        }
    }

    pub fn is_depleted(&self) -> bool {
        self.current == 0
    }

    pub fn fraction(&self) -> f32 {
        if self.maximum == 0 {
            return 0.0;
        }
        self.current as f32 / self.maximum as f32
    }

    /// Returns the amount actually removed; health never drops below zero.
    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        let applied = amount.min(self.current);
        self.current -= applied;
        applied
    }

    pub fn restore(&mut self, amount: u32) -> u32 {
        debug_assert!(self.current <= self.maximum, "health above maximum");
        self.current = self.current.min(self.maximum);
        let applied = amount.min(self.maximum - self.current);
        self.current += applied;
        applied
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mana {
    pub current: u32,
    pub maximum: u32,
}

impl Mana {
    pub fn full(maximum: u32) -> Self {
        Self {
            current: maximum,
            maximum,
        }
    }

    pub fn can_afford(&self, cost: u32) -> bool {
        self.current >= cost
    }

    pub fn try_spend(&mut self, cost: u32) -> bool {
        if !self.can_afford(cost) {
            return false;
        }
        self.current -= cost;
        true
    }

    pub fn restore(&mut self, amount: u32) -> u32 {
        self.current = self.current.min(self.maximum);
        let applied = amount.min(self.maximum - self.current);
        self.current += applied;
        applied
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackKind {
    Melee,
    Ranged,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombatStats {
    pub damage: u32,
    pub armor: u32,
    pub attack_speed: f32,
    pub attack_range: f32,
    pub attack_kind: AttackKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attributes {
    pub strength: u32,
    pub dexterity: u32,
    pub intelligence: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DamageType {
    Physical,
    Fire,
    Ice,
    Lightning,
    Poison,
    Arcane,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Resistances {
    pub fire: f32,
    pub ice: f32,
    pub lightning: f32,
    pub poison: f32,
}

impl Resistances {
    /// Resistance fraction for `damage_type`, clamped to [-1, 1].
    pub fn against(&self, damage_type: DamageType) -> f32 {
        let raw = match damage_type {
            DamageType::Physical | DamageType::Arcane => 0.0,
            DamageType::Fire => self.fire,
            DamageType::Ice => self.ice,
            DamageType::Lightning => self.lightning,
            DamageType::Poison => self.poison,
        };
        raw.clamp(-1.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Faction {
    Party,
    Hostile,
}

impl Faction {
    pub fn is_hostile_to(self, other: Faction) -> bool {
        self != other
    }
}

/// Weak reference; the target may have been despawned since it was set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombatTarget(pub EntityId);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AttackCooldown {
    pub remaining: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpellBook {
    pub known: Vec<SpellDefId>,
    cooldowns: BTreeMap<SpellDefId, f32>,
}

impl SpellBook {
    pub fn new(known: Vec<SpellDefId>) -> Self {
        Self {
            known,
            cooldowns: BTreeMap::new(),
        }
    }

    pub fn knows(&self, spell: SpellDefId) -> bool {
        self.known.contains(&spell)
    }

    pub fn cooldown_remaining(&self, spell: SpellDefId) -> f32 {
        self.cooldowns.get(&spell).copied().unwrap_or(0.0)
    }

    pub fn start_cooldown(&mut self, spell: SpellDefId, seconds: f32) {
        if seconds > 0.0 {
            self.cooldowns.insert(spell, seconds);
        }
    }

    pub fn tick(&mut self, dt_seconds: f32) {
        for remaining in self.cooldowns.values_mut() {
            *remaining = (*remaining - dt_seconds).max(0.0);
        }
        self.cooldowns.retain(|_, remaining| *remaining > 0.0);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlobalCooldown {
    pub remaining: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CastTarget {
    /// Pick the nearest valid target for the spell's targeting mode.
    Auto,
    Entity(EntityId),
    Point(Vec2),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CastIntent {
    pub spell: SpellDefId,
    pub target: CastTarget,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Casting {
    pub spell: SpellDefId,
    pub target: Option<EntityId>,
    pub point: Vec2,
    pub remaining: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavPath {
    pub goal: Vec2,
    pub waypoints: Vec<Vec2>,
    pub next_waypoint_index: usize,
}

impl NavPath {
    pub fn new(goal: Vec2, waypoints: Vec<Vec2>) -> Self {
        Self {
            goal,
            waypoints,
            next_waypoint_index: 0,
        }
    }

    pub fn current_waypoint(&self) -> Option<Vec2> {
        self.waypoints.get(self.next_waypoint_index).copied()
    }

    pub fn advance_waypoint(&mut self) {
        if self.next_waypoint_index < self.waypoints.len() {
            self.next_waypoint_index = self.next_waypoint_index.saturating_add(1);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.next_waypoint_index >= self.waypoints.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AiState {
    #[default]
    Idle,
    Chase,
    Attack,
    Return,
    Flee,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
pub enum AllyPosture {
    #[default]
    Follow,
    Aggressive,
    Defensive,
    Passive,
}

impl AllyPosture {
    pub fn may_chase(self) -> bool {
        matches!(self, Self::Aggressive | Self::Defensive)
    }

    pub fn may_attack(self) -> bool {
        !matches!(self, Self::Passive)
    }

    pub fn flees_on_low_health(self) -> bool {
        !matches!(self, Self::Aggressive)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiRole {
    Enemy,
    Ally { posture: AllyPosture },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiController {
    pub role: AiRole,
    pub state: AiState,
    pub home: Vec2,
    pub aggro_range: f32,
    pub leash_range: f32,
    pub decision_timer: f32,
    pub target: Option<EntityId>,
    pub autocast_timers: BTreeMap<SpellDefId, f32>,
}

impl AiController {
    pub fn new(role: AiRole, home: Vec2, aggro_range: f32, leash_range: f32) -> Self {
        Self {
            role,
            state: AiState::Idle,
            home,
            aggro_range,
            leash_range,
            decision_timer: 0.0,
            target: None,
            autocast_timers: BTreeMap::new(),
        }
    }

    pub fn posture(&self) -> Option<AllyPosture> {
        match self.role {
            AiRole::Enemy => None,
            AiRole::Ally { posture } => Some(posture),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    Slow,
    Root,
    Stun,
    Burn,
    Poison,
    Regen,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusEffectSpec {
    pub kind: StatusKind,
    pub duration: f32,
    pub magnitude: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusEffect {
    pub kind: StatusKind,
    pub source: Option<EntityId>,
    pub remaining: f32,
    pub magnitude: f32,
    /// Fractional damage or healing carried between ticks.
    pub carry: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusEffects {
    pub active: Vec<StatusEffect>,
}

impl StatusEffects {
    /// Replaces an existing effect of the same kind from the same source.
    pub fn apply(&mut self, spec: StatusEffectSpec, source: Option<EntityId>) {
        self.active
            .retain(|effect| !(effect.kind == spec.kind && effect.source == source));
        self.active.push(StatusEffect {
            kind: spec.kind,
            source,
            remaining: spec.duration,
            magnitude: spec.magnitude,
            carry: 0.0,
        });
    }

    pub fn has(&self, kind: StatusKind) -> bool {
        self.active.iter().any(|effect| effect.kind == kind)
    }

    pub fn is_stunned(&self) -> bool {
        self.has(StatusKind::Stun)
    }

    pub fn speed_multiplier(&self) -> f32 {
        let mut multiplier = 1.0f32;
        for effect in &self.active {
            match effect.kind {
                StatusKind::Root | StatusKind::Stun => return 0.0,
                StatusKind::Slow => multiplier *= (1.0 - effect.magnitude).clamp(0.0, 1.0),
                _ => {}
            }
        }
        multiplier
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Regeneration {
    pub mana_per_second: f32,
    pub health_per_second: f32,
    pub mana_carry: f32,
    pub health_carry: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InCombat {
    pub idle_seconds: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerControlled;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projectile {
    pub spell: SpellDefId,
    pub caster: EntityId,
    pub faction: Faction,
    /// Homing target; cleared when the reference goes stale.
    pub homing_target: Option<EntityId>,
    pub aim_point: Vec2,
    pub targets_ground: bool,
    pub speed: f32,
    pub damage: u32,
    pub damage_type: DamageType,
    pub splash_radius: f32,
    pub status: Option<StatusEffectSpec>,
    pub lifetime_remaining: f32,
    pub last_position: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaEffect {
    pub spell: SpellDefId,
    pub caster: EntityId,
    pub faction: Faction,
    pub radius: f32,
    pub tick_interval: f32,
    pub next_tick_in: f32,
    pub tick_damage: u32,
    pub damage_type: DamageType,
    pub remaining: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisualKind {
    CastFlash,
    Hit,
    Impact,
    AreaGlow,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualEffect {
    pub kind: VisualKind,
    pub remaining: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Downed {
    pub elapsed: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Dead {
    pub elapsed: f32,
    pub killer: Option<EntityId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastValidPosition(pub Vec2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_damage_saturates_at_zero() {
        let mut health = Health::full(10);
        assert_eq!(health.apply_damage(25), 10);
        assert_eq!(health.current, 0);
        assert!(health.is_depleted());
    }

    #[test]
    fn health_restore_caps_at_maximum() {
        let mut health = Health::full(10);
        health.apply_damage(4);
        assert_eq!(health.restore(100), 4);
        assert_eq!(health.current, 10);
    }

    #[test]
    fn mana_spend_refuses_when_short() {
        let mut mana = Mana {
            current: 5,
            maximum: 50,
        };
        assert!(!mana.try_spend(10));
        assert_eq!(mana.current, 5);
        assert!(mana.try_spend(5));
        assert_eq!(mana.current, 0);
    }

    #[test]
    fn status_from_same_source_replaces_previous() {
        let mut statuses = StatusEffects::default();
        let spec = StatusEffectSpec {
            kind: StatusKind::Slow,
            duration: 2.0,
            magnitude: 0.5,
        };
        statuses.apply(spec, None);
        statuses.apply(
            StatusEffectSpec {
                duration: 4.0,
                ..spec
            },
            None,
        );
        assert_eq!(statuses.active.len(), 1);
        assert!((statuses.active[0].remaining - 4.0).abs() < f32::EPSILON);
    }

    #[test]
    fn slows_stack_multiplicatively_and_root_zeroes_speed() {
        let mut statuses = StatusEffects::default();
        let slow = StatusEffectSpec {
            kind: StatusKind::Slow,
            duration: 2.0,
            magnitude: 0.5,
        };
        statuses.apply(slow, None);
        let mut allocator = crate::sim::world::EntityAllocator::default();
        statuses.apply(slow, Some(allocator.allocate()));
        assert!((statuses.speed_multiplier() - 0.25).abs() < 1e-6);

        statuses.apply(
            StatusEffectSpec {
                kind: StatusKind::Root,
                duration: 1.0,
                magnitude: 0.0,
            },
            None,
        );
        assert_eq!(statuses.speed_multiplier(), 0.0);
    }

    #[test]
    fn spell_book_cooldowns_tick_down_and_clear() {
        let spell = SpellDefId(3);
        let mut book = SpellBook::new(vec![spell]);
        book.start_cooldown(spell, 1.0);
        book.tick(0.6);
        assert!((book.cooldown_remaining(spell) - 0.4).abs() < 1e-6);
        book.tick(0.6);
        assert_eq!(book.cooldown_remaining(spell), 0.0);
    }
}
