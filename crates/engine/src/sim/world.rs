use std::fmt;
use std::ops::{Add, Mul, Sub};

use super::components::{
    AiController, AreaEffect, AttackCooldown, Attributes, CastIntent, Casting, CombatStats,
    CombatTarget, Dead, Downed, Faction, GlobalCooldown, Health, InCombat, LastValidPosition, Mana,
    MoveSpeed, Name, NavPath, PlayerControlled, Position, Projectile, Regeneration, Resistances,
    SpellBook, StatusEffects, Velocity, VisualEffect,
};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(self, other: Vec2) -> f32 {
        (other - self).length()
    }

    pub fn distance_squared(self, other: Vec2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }

    /// Unit vector, or zero when the length is below `min_length`.
    pub fn normalized_or_zero(self, min_length: f32) -> Vec2 {
        let length = self.length();
        if length <= min_length || !length.is_finite() {
            return Vec2::ZERO;
        }
        Vec2::new(self.x / length, self.y / length)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Generational handle. A freed slot bumps its generation, so old handles
/// stop resolving instead of aliasing whatever reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    index: u32,
    generation: u32,
}

impl EntityId {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    pub fn to_bits(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Default)]
pub struct EntityAllocator {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free: Vec<u32>,
    live_count: usize,
}

impl EntityAllocator {
    pub fn allocate(&mut self) -> EntityId {
        self.live_count = self.live_count.saturating_add(1);
        if let Some(index) = self.free.pop() {
            let slot = index as usize;
            self.alive[slot] = true;
            return EntityId {
                index,
                generation: self.generations[slot],
            };
        }

        let index = self.generations.len() as u32;
        self.generations.push(0);
        self.alive.push(true);
        EntityId {
            index,
            generation: 0,
        }
    }

    pub fn free(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let slot = id.index as usize;
        self.alive[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free.push(id.index);
        self.live_count = self.live_count.saturating_sub(1);
        true
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        let slot = id.index as usize;
        self.alive.get(slot).copied().unwrap_or(false) && self.generations[slot] == id.generation
    }

    pub fn live_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(slot, _)| EntityId {
                index: slot as u32,
                generation: self.generations[slot],
            })
    }

    pub fn live_count(&self) -> usize {
        self.live_count
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    value: T,
}

/// Sparse per-component storage indexed by entity slot. Iteration follows
/// slot order, which keeps every processor deterministic.
#[derive(Debug, Clone)]
pub struct ComponentTable<T> {
    slots: Vec<Option<Slot<T>>>,
    len: usize,
}

impl<T> Default for ComponentTable<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            len: 0,
        }
    }
}

impl<T> ComponentTable<T> {
    pub fn insert(&mut self, id: EntityId, value: T) -> Option<T> {
        let slot = id.index as usize;
        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, || None);
        }
        let previous = self.slots[slot].take();
        self.slots[slot] = Some(Slot {
            generation: id.generation,
            value,
        });
        match previous {
            Some(previous) if previous.generation == id.generation => Some(previous.value),
            Some(_) => None,
            None => {
                self.len = self.len.saturating_add(1);
                None
            }
        }
    }

    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.as_ref()?.generation != id.generation {
            return None;
        }
        self.len = self.len.saturating_sub(1);
        slot.take().map(|slot| slot.value)
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        match self.slots.get(id.index as usize)? {
            Some(slot) if slot.generation == id.generation => Some(&slot.value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        match self.slots.get_mut(id.index as usize)? {
            Some(slot) if slot.generation == id.generation => Some(&mut slot.value),
            _ => None,
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref().map(|slot| {
                (
                    EntityId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    &slot.value,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.as_mut().map(|slot| {
                    (
                        EntityId {
                            index: index as u32,
                            generation: slot.generation,
                        },
                        &mut slot.value,
                    )
                })
            })
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.iter().map(|(id, _)| id).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentSet(u64);

impl ComponentSet {
    pub const EMPTY: ComponentSet = ComponentSet(0);

    pub const fn with(self, kind: ComponentKind) -> Self {
        Self(self.0 | (1u64 << kind as u32))
    }

    pub const fn contains(self, kind: ComponentKind) -> bool {
        self.0 & (1u64 << kind as u32) != 0
    }

    pub const fn union(self, other: ComponentSet) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersects(self, other: ComponentSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn iter(self) -> impl Iterator<Item = ComponentKind> {
        ComponentKind::ALL
            .iter()
            .copied()
            .filter(move |kind| self.contains(*kind))
    }
}

/// Component combination a processor iterates: every kind in `with`, none in
/// `without`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Query {
    pub with: ComponentSet,
    pub without: ComponentSet,
}

impl Query {
    pub const fn new(with: ComponentSet, without: ComponentSet) -> Self {
        Self { with, without }
    }
}

macro_rules! entity_store {
    ($($field:ident: $ty:ty => $kind:ident,)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ComponentKind {
            $($kind,)*
        }

        impl ComponentKind {
            pub const ALL: &'static [ComponentKind] = &[$(ComponentKind::$kind,)*];
        }

        /// All simulation state. Each table is a separate field so a processor
        /// can borrow the tables it writes mutably and the rest shared.
        #[derive(Debug, Default)]
        pub struct EntityStore {
            allocator: EntityAllocator,
            pending_despawns: Vec<EntityId>,
            $(pub $field: ComponentTable<$ty>,)*
        }

        impl EntityStore {
            pub fn has(&self, id: EntityId, kind: ComponentKind) -> bool {
                match kind {
                    $(ComponentKind::$kind => self.$field.contains(id),)*
                }
            }

            fn strip_components(&mut self, id: EntityId) {
                $(self.$field.remove(id);)*
            }
        }
    };
}

entity_store! {
    positions: Position => Position,
    velocities: Velocity => Velocity,
    move_speeds: MoveSpeed => MoveSpeed,
    healths: Health => Health,
    manas: Mana => Mana,
    combat_stats: CombatStats => CombatStats,
    attributes: Attributes => Attributes,
    resistances: Resistances => Resistances,
    factions: Faction => Faction,
    combat_targets: CombatTarget => CombatTarget,
    attack_cooldowns: AttackCooldown => AttackCooldown,
    spell_books: SpellBook => SpellBook,
    global_cooldowns: GlobalCooldown => GlobalCooldown,
    cast_intents: CastIntent => CastIntent,
    castings: Casting => Casting,
    ai_controllers: AiController => AiController,
    nav_paths: NavPath => NavPath,
    status_effects: StatusEffects => StatusEffects,
    regenerations: Regeneration => Regeneration,
    in_combat: InCombat => InCombat,
    player_controlled: PlayerControlled => PlayerControlled,
    projectiles: Projectile => Projectile,
    area_effects: AreaEffect => AreaEffect,
    visual_effects: VisualEffect => VisualEffect,
    downed: Downed => Downed,
    dead: Dead => Dead,
    last_valid_positions: LastValidPosition => LastValidPosition,
    names: Name => Name,
}

impl EntityStore {
    pub fn spawn(&mut self) -> EntityId {
        self.allocator.allocate()
    }

    /// Queues removal; the id keeps resolving until `apply_pending`.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        if !self.allocator.is_alive(id) {
            return false;
        }
        self.pending_despawns.push(id);
        true
    }

    pub fn is_pending_despawn(&self, id: EntityId) -> bool {
        self.pending_despawns.contains(&id)
    }

    pub fn apply_pending(&mut self) -> usize {
        if self.pending_despawns.is_empty() {
            return 0;
        }
        let mut pending = std::mem::take(&mut self.pending_despawns);
        pending.sort();
        pending.dedup();
        let mut removed = 0usize;
        for id in pending {
            self.strip_components(id);
            if self.allocator.free(id) {
                removed += 1;
            }
        }
        removed
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.allocator.is_alive(id)
    }

    pub fn len(&self) -> usize {
        self.allocator.live_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.allocator.live_ids().collect()
    }

    pub fn component_set(&self, id: EntityId) -> ComponentSet {
        ComponentKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.has(id, *kind))
            .fold(ComponentSet::EMPTY, ComponentSet::with)
    }

    pub fn matches(&self, id: EntityId, query: Query) -> bool {
        self.allocator.is_alive(id)
            && query.with.iter().all(|kind| self.has(id, kind))
            && !query.without.iter().any(|kind| self.has(id, kind))
    }

    /// Live entities matching `query`, in slot order.
    pub fn query(&self, query: Query) -> Vec<EntityId> {
        self.allocator
            .live_ids()
            .filter(|id| self.matches(*id, query))
            .collect()
    }

    pub fn position_of(&self, id: EntityId) -> Option<Vec2> {
        self.positions.get(id).map(|position| position.0)
    }

    pub fn faction_of(&self, id: EntityId) -> Option<Faction> {
        self.factions.get(id).copied()
    }

    /// Alive, with health, and neither dead nor downed.
    pub fn is_standing(&self, id: EntityId) -> bool {
        self.is_alive(id)
            && self.healths.contains(id)
            && !self.dead.contains(id)
            && !self.downed.contains(id)
    }

    pub fn label(&self, id: EntityId) -> String {
        match self.names.get(id) {
            Some(name) => format!("{}#{}", name.0, id),
            None => format!("#{id}"),
        }
    }
}
