use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, trace};

use super::components::{
    AttackCooldown, AttackKind, CombatTarget, DamageType, Dead, Downed, Faction, InCombat,
};
use super::config::CombatTuning;
use super::events::{DamageDelivery, EventSink, SimEvent};
use super::formulas::{
    attack_cooldown_seconds, crit_chance, resolve_damage, strength_coefficient, DamageRoll,
};
use super::intent::halt;
use super::map::DungeonMap;
use super::party::{party_members, PartyState};
use super::world::{ComponentKind, ComponentSet, EntityId, EntityStore, Query};

pub const COMBAT_QUERY: Query = Query::new(
    ComponentSet::EMPTY
        .with(ComponentKind::CombatTarget)
        .with(ComponentKind::CombatStats)
        .with(ComponentKind::Position),
    ComponentSet::EMPTY
        .with(ComponentKind::Dead)
        .with(ComponentKind::Downed),
);

/// One resolved damage application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Hit {
    pub source: EntityId,
    /// Faction the damage is dealt on behalf of; same-faction targets are
    /// never harmed. Carried separately so a despawned caster's projectile
    /// still knows its side.
    pub source_faction: Option<Faction>,
    pub target: EntityId,
    pub amount: u32,
    pub damage_type: DamageType,
    pub delivery: DamageDelivery,
    pub critical: bool,
}

/// The single damage path. Returns the health actually removed, or `None`
/// when the hit was filtered (target not standing, or friendly fire).
pub(crate) fn apply_hit(
    store: &mut EntityStore,
    events: &mut dyn EventSink,
    hit: Hit,
) -> Option<u32> {
    if !store.is_standing(hit.target) {
        return None;
    }
    let target_faction = store.faction_of(hit.target);
    if hit.source != hit.target
        && hit.source_faction.is_some()
        && hit.source_faction == target_faction
    {
        trace!(source = %hit.source, target = %hit.target, "friendly_hit_filtered");
        return None;
    }

    let health = store.healths.get_mut(hit.target)?;
    let applied = health.apply_damage(hit.amount);
    if hit.source != hit.target {
        health.last_hit_by = Some(hit.source);
    }
    let depleted = health.is_depleted();

    events.emit(SimEvent::DamageDealt {
        source: hit.source,
        target: hit.target,
        amount: applied,
        damage_type: hit.damage_type,
        delivery: hit.delivery,
        critical: hit.critical,
    });
    if hit.source != hit.target {
        mark_in_combat(store, events, hit.source);
    }
    mark_in_combat(store, events, hit.target);

    if depleted {
        settle_zero_health(store, events, hit.target);
    }
    Some(applied)
}

/// Heals a standing entity. Emits only when something was restored.
pub(crate) fn apply_heal(
    store: &mut EntityStore,
    events: &mut dyn EventSink,
    source: EntityId,
    target: EntityId,
    amount: u32,
) -> Option<u32> {
    if !store.is_standing(target) {
        return None;
    }
    let applied = store.healths.get_mut(target)?.restore(amount);
    if applied > 0 {
        events.emit(SimEvent::HealthRestored {
            source,
            target,
            amount: applied,
        });
    }
    Some(applied)
}

pub(crate) fn mark_in_combat(store: &mut EntityStore, events: &mut dyn EventSink, id: EntityId) {
    if !store.healths.contains(id) || store.dead.contains(id) {
        return;
    }
    match store.in_combat.get_mut(id) {
        Some(in_combat) => in_combat.idle_seconds = 0.0,
        None => {
            store.in_combat.insert(id, InCombat::default());
            events.emit(SimEvent::CombatStarted { entity: id });
        }
    }
}

/// Runs exactly once per depletion: callers only reach it from a standing
/// target, and both outcomes make the target non-standing.
fn settle_zero_health(store: &mut EntityStore, events: &mut dyn EventSink, target: EntityId) {
    let killer = store.healths.get(target).and_then(|health| health.last_hit_by);
    store.combat_targets.remove(target);
    store.cast_intents.remove(target);
    if let Some(casting) = store.castings.remove(target) {
        events.emit(SimEvent::CastInterrupted {
            caster: target,
            spell: casting.spell,
        });
    }
    if let Some(statuses) = store.status_effects.get_mut(target) {
        statuses.active.clear();
    }
    halt(store, target);

    if store.faction_of(target) == Some(Faction::Party) {
        store.downed.insert(target, Downed::default());
        events.emit(SimEvent::EntityDowned { entity: target });
    } else {
        store.in_combat.remove(target);
        store.dead.insert(
            target,
            Dead {
                elapsed: 0.0,
                killer,
            },
        );
        events.emit(SimEvent::EntityDied {
            entity: target,
            killer,
        });
    }
}

pub(crate) struct CombatContext<'a> {
    pub map: &'a dyn DungeonMap,
    pub tuning: &'a CombatTuning,
    pub store: &'a mut EntityStore,
    pub events: &'a mut dyn EventSink,
    pub rng: &'a mut ChaCha8Rng,
}

/// Cooldowns and combat timers first, then one attack attempt per entity
/// with a target. Returns how many attacks landed.
pub(crate) fn run_combat(context: &mut CombatContext<'_>, dt_seconds: f32) -> u32 {
    let store = &mut *context.store;
    for (_, cooldown) in store.attack_cooldowns.iter_mut() {
        cooldown.remaining = (cooldown.remaining - dt_seconds).max(0.0);
    }

    let mut left_combat = Vec::new();
    for (id, in_combat) in store.in_combat.iter_mut() {
        in_combat.idle_seconds += dt_seconds;
        if in_combat.idle_seconds >= context.tuning.combat_timeout {
            left_combat.push(id);
        }
    }
    for id in left_combat {
        store.in_combat.remove(id);
        context.events.emit(SimEvent::CombatEnded { entity: id });
    }

    let mut landed = 0u32;
    for attacker in store.query(COMBAT_QUERY) {
        let Some(CombatTarget(target)) = store.combat_targets.get(attacker).copied() else {
            continue;
        };
        if !store.is_standing(target) {
            trace!(attacker = %attacker, target = %target, "stale_target_cleared");
            store.combat_targets.remove(attacker);
            continue;
        }
        let own_faction = store.faction_of(attacker);
        if own_faction.is_some() && own_faction == store.faction_of(target) {
            store.combat_targets.remove(attacker);
            continue;
        }
        if store
            .status_effects
            .get(attacker)
            .is_some_and(|statuses| statuses.is_stunned())
        {
            continue;
        }
        if store
            .attack_cooldowns
            .get(attacker)
            .is_some_and(|cooldown| cooldown.remaining > 0.0)
        {
            continue;
        }
        let (Some(stats), Some(from), Some(to)) = (
            store.combat_stats.get(attacker).copied(),
            store.position_of(attacker),
            store.position_of(target),
        ) else {
            continue;
        };
        if from.distance(to) > stats.attack_range {
            continue;
        }
        if !context.map.has_line_of_sight(from, to) {
            trace!(attacker = %attacker, target = %target, "attack_blocked_by_los");
            continue;
        }

        let (coefficient, critical) = match store.attributes.get(attacker) {
            Some(attributes) => (
                strength_coefficient(attributes.strength),
                context.rng.random::<f32>() < crit_chance(attributes.dexterity),
            ),
            None => (0.0, false),
        };
        let armor = store
            .combat_stats
            .get(target)
            .map(|target_stats| target_stats.armor)
            .unwrap_or(0);
        let amount = resolve_damage(DamageRoll {
            base: stats.damage,
            coefficient,
            armor,
            resistance: 0.0,
            critical,
        });
        let delivery = match stats.attack_kind {
            AttackKind::Melee => DamageDelivery::Melee,
            AttackKind::Ranged => DamageDelivery::Ranged,
        };
        let hit = Hit {
            source: attacker,
            source_faction: own_faction,
            target,
            amount,
            damage_type: DamageType::Physical,
            delivery,
            critical,
        };
        if apply_hit(store, &mut *context.events, hit).is_some() {
            landed += 1;
        }
        store.attack_cooldowns.insert(
            attacker,
            AttackCooldown {
                remaining: attack_cooldown_seconds(stats.attack_speed),
            },
        );
    }
    landed
}

/// Party wipe detection and out-of-combat revival of downed members.
pub(crate) fn run_party_watch(
    store: &mut EntityStore,
    events: &mut dyn EventSink,
    party: &mut PartyState,
    tuning: &CombatTuning,
    dt_seconds: f32,
) {
    party.wipe_cooldown = (party.wipe_cooldown - dt_seconds).max(0.0);
    for (_, downed) in store.downed.iter_mut() {
        downed.elapsed += dt_seconds;
    }

    let members = party_members(store);
    if members.is_empty() {
        return;
    }
    let standing = members
        .iter()
        .copied()
        .filter(|id| !store.downed.contains(*id))
        .collect::<Vec<_>>();

    if standing.is_empty() {
        if party.wipe_cooldown <= 0.0 {
            info!(members = members.len(), "party_wiped");
            events.emit(SimEvent::PartyWiped);
            party.wipe_cooldown = tuning.party_wipe_cooldown;
        }
        return;
    }

    let threatened = store.factions.iter().any(|(id, faction)| {
        *faction == Faction::Hostile
            && store.is_standing(id)
            && store.position_of(id).is_some_and(|hostile| {
                standing.iter().any(|member| {
                    store.position_of(*member).is_some_and(|position| {
                        position.distance(hostile) <= tuning.revive_safe_distance
                    })
                })
            })
    });
    if threatened {
        return;
    }

    for member in members {
        if !store.downed.contains(member) {
            continue;
        }
        // A zero-health pool has nothing to come back with.
        if store
            .healths
            .get(member)
            .is_some_and(|health| health.maximum == 0)
        {
            trace!(entity = %member, "revive_skipped_empty_health_pool");
            continue;
        }
        store.downed.remove(member);
        if let Some(health) = store.healths.get_mut(member) {
            let revived = (health.maximum as f32 * tuning.revive_health_fraction) as u32;
            health.current = revived.clamp(1, health.maximum);
            health.last_hit_by = None;
        }
        events.emit(SimEvent::EntityRevived { entity: member });
    }
}

/// Ages corpses and despawns the ones that have lingered long enough.
pub(crate) fn run_corpse_cleanup(
    store: &mut EntityStore,
    tuning: &CombatTuning,
    dt_seconds: f32,
) -> usize {
    let mut expired = Vec::new();
    for (id, dead) in store.dead.iter_mut() {
        dead.elapsed += dt_seconds;
        if dead.elapsed >= tuning.corpse_linger_seconds {
            expired.push(id);
        }
    }
    expired
        .into_iter()
        .filter(|id| store.despawn(*id))
        .count()
}
