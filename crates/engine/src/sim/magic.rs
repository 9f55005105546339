use tracing::trace;

use super::combat::{apply_heal, apply_hit, Hit};
use super::components::{
    AreaEffect, CastIntent, CastTarget, Casting, DamageType, Faction, GlobalCooldown, Position,
    Projectile, StatusEffectSpec, StatusEffects, StatusKind, Velocity, VisualEffect, VisualKind,
};
use super::config::MagicTuning;
use super::events::{DamageDelivery, EventSink, SimEvent};
use super::formulas::{heal_amount, intelligence_coefficient, resolve_damage, DamageRoll};
use super::los::first_wall_impact;
use super::map::DungeonMap;
use super::world::{ComponentKind, ComponentSet, EntityId, EntityStore, Query, Vec2};
use crate::content::{DefDatabase, SpellDef, SpellDefId, SpellKind, SpellTargeting};

const MIN_DIRECTION_LENGTH: f32 = 1e-6;
/// Wall impacts rest this far back from the wall face.
const WALL_STANDOFF: f32 = 0.01;

pub const PROJECTILE_QUERY: Query = Query::new(
    ComponentSet::EMPTY
        .with(ComponentKind::Projectile)
        .with(ComponentKind::Position),
    ComponentSet::EMPTY,
);

pub const AREA_EFFECT_QUERY: Query = Query::new(
    ComponentSet::EMPTY
        .with(ComponentKind::AreaEffect)
        .with(ComponentKind::Position),
    ComponentSet::EMPTY,
);

pub const VISUAL_EFFECT_QUERY: Query = Query::new(
    ComponentSet::EMPTY.with(ComponentKind::VisualEffect),
    ComponentSet::EMPTY,
);

const INCAPACITATED: ComponentSet = ComponentSet::EMPTY
    .with(ComponentKind::Dead)
    .with(ComponentKind::Downed);

pub const STATUS_QUERY: Query = Query::new(
    ComponentSet::EMPTY.with(ComponentKind::StatusEffects),
    INCAPACITATED,
);

pub const REGENERATION_QUERY: Query = Query::new(
    ComponentSet::EMPTY.with(ComponentKind::Regeneration),
    INCAPACITATED,
);

pub const CASTING_QUERY: Query =
    Query::new(ComponentSet::EMPTY.with(ComponentKind::Casting), INCAPACITATED);

pub const CAST_INTENT_QUERY: Query = Query::new(
    ComponentSet::EMPTY.with(ComponentKind::CastIntent),
    ComponentSet::EMPTY,
);

/// Why a cast was silently dropped. Never surfaced as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastRefusal {
    Incapacitated,
    Busy,
    UnknownSpell,
    GlobalCooldown,
    SpellCooldown,
    InsufficientMana,
    InvalidTarget,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ResolvedCast {
    pub spell: SpellDefId,
    pub target: Option<EntityId>,
    pub point: Vec2,
}

pub(crate) struct MagicContext<'a> {
    pub map: &'a dyn DungeonMap,
    pub defs: &'a DefDatabase,
    pub tuning: &'a MagicTuning,
    pub store: &'a mut EntityStore,
    pub events: &'a mut dyn EventSink,
}

pub(crate) fn run_magic(context: &mut MagicContext<'_>, dt_seconds: f32) {
    tick_cooldowns(context.store, dt_seconds);
    run_projectiles(context, dt_seconds);
    run_area_effects(context, dt_seconds);
    run_visual_effects(context.store, dt_seconds);
    run_status_effects(context.store, context.events, dt_seconds);
    run_regeneration(context.store, context.tuning, dt_seconds);
    run_casting(context, dt_seconds);
    run_cast_intents(context);
}

fn tick_cooldowns(store: &mut EntityStore, dt_seconds: f32) {
    for (_, book) in store.spell_books.iter_mut() {
        book.tick(dt_seconds);
    }
    for (_, cooldown) in store.global_cooldowns.iter_mut() {
        cooldown.remaining = (cooldown.remaining - dt_seconds).max(0.0);
    }
}

pub(crate) fn spawn_visual(
    store: &mut EntityStore,
    kind: VisualKind,
    position: Vec2,
    seconds: f32,
) -> EntityId {
    let id = store.spawn();
    store.positions.insert(id, Position(position));
    store.visual_effects.insert(
        id,
        VisualEffect {
            kind,
            remaining: seconds,
        },
    );
    id
}

/// Launches from `origin` toward `projectile.aim_point` at its speed.
pub(crate) fn spawn_projectile(
    store: &mut EntityStore,
    origin: Vec2,
    mut projectile: Projectile,
) -> EntityId {
    let direction = (projectile.aim_point - origin).normalized_or_zero(MIN_DIRECTION_LENGTH);
    projectile.last_position = origin;
    let id = store.spawn();
    store.positions.insert(id, Position(origin));
    store
        .velocities
        .insert(id, Velocity(direction * projectile.speed));
    store.projectiles.insert(id, projectile);
    id
}

pub(crate) fn apply_status(
    store: &mut EntityStore,
    events: &mut dyn EventSink,
    target: EntityId,
    spec: StatusEffectSpec,
    source: Option<EntityId>,
) {
    if !store.is_standing(target) {
        return;
    }
    match store.status_effects.get_mut(target) {
        Some(statuses) => statuses.apply(spec, source),
        None => {
            let mut statuses = StatusEffects::default();
            statuses.apply(spec, source);
            store.status_effects.insert(target, statuses);
        }
    }
    events.emit(SimEvent::StatusApplied {
        entity: target,
        status: spec.kind,
    });
}

/// Offensive payload delivered by spells, projectiles and areas.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Payload {
    caster: EntityId,
    faction: Faction,
    base_damage: u32,
    damage_type: DamageType,
    delivery: DamageDelivery,
    status: Option<StatusEffectSpec>,
}

fn spell_damage(store: &EntityStore, caster: EntityId, target: EntityId, payload: Payload) -> u32 {
    let coefficient = store
        .attributes
        .get(caster)
        .map(|attributes| intelligence_coefficient(attributes.intelligence))
        .unwrap_or(0.0);
    let armor = store
        .combat_stats
        .get(target)
        .map(|stats| stats.armor)
        .unwrap_or(0);
    let resistance = store
        .resistances
        .get(target)
        .map(|resistances| resistances.against(payload.damage_type))
        .unwrap_or(0.0);
    resolve_damage(DamageRoll {
        base: payload.base_damage,
        coefficient,
        armor,
        resistance,
        critical: false,
    })
}

/// Damage plus optional status on one target. False when filtered.
fn strike(
    store: &mut EntityStore,
    events: &mut dyn EventSink,
    target: EntityId,
    payload: Payload,
) -> bool {
    if !store.is_standing(target) || store.faction_of(target) == Some(payload.faction) {
        return false;
    }
    if payload.base_damage > 0 {
        let amount = spell_damage(store, payload.caster, target, payload);
        let hit = Hit {
            source: payload.caster,
            source_faction: Some(payload.faction),
            target,
            amount,
            damage_type: payload.damage_type,
            delivery: payload.delivery,
            critical: false,
        };
        if apply_hit(store, events, hit).is_none() {
            return false;
        }
    }
    if let Some(spec) = payload.status {
        apply_status(store, events, target, spec, Some(payload.caster));
    }
    true
}

/// Hits every standing hostile within `radius` of `center` that the centre
/// can see. Returns the number struck.
fn burst(
    store: &mut EntityStore,
    events: &mut dyn EventSink,
    map: &dyn DungeonMap,
    center: Vec2,
    radius: f32,
    payload: Payload,
) -> u32 {
    let targets = store
        .healths
        .ids()
        .into_iter()
        .filter(|id| {
            store.is_standing(*id)
                && store
                    .faction_of(*id)
                    .is_some_and(|faction| payload.faction.is_hostile_to(faction))
                && store.position_of(*id).is_some_and(|position| {
                    position.distance(center) <= radius && map.has_line_of_sight(center, position)
                })
        })
        .collect::<Vec<_>>();
    targets
        .into_iter()
        .filter(|target| strike(store, events, *target, payload))
        .count() as u32
}

fn run_projectiles(context: &mut MagicContext<'_>, dt_seconds: f32) {
    let store = &mut *context.store;
    let tuning = context.tuning;
    for id in store.query(PROJECTILE_QUERY) {
        if store.is_pending_despawn(id) {
            continue;
        }
        let (Some(mut projectile), Some(position)) =
            (store.projectiles.get(id).copied(), store.position_of(id))
        else {
            continue;
        };
        let payload = Payload {
            caster: projectile.caster,
            faction: projectile.faction,
            base_damage: projectile.damage,
            damage_type: projectile.damage_type,
            delivery: DamageDelivery::Spell,
            status: projectile.status,
        };

        // The step is swept from last tick's position, stopping short of the
        // first wall it crosses.
        let step_from = projectile.last_position;
        let wall_rest = first_wall_impact(context.map, step_from, position).map(|impact| {
            let back = (step_from - impact).normalized_or_zero(MIN_DIRECTION_LENGTH);
            impact + back * WALL_STANDOFF
        });
        let step_to = wall_rest.unwrap_or(position);

        let hostile_contact = first_hostile_along(
            store,
            step_from,
            step_to,
            projectile.faction,
            tuning.projectile_hit_radius,
        );
        let ground_contact = if projectile.targets_ground {
            Some(closest_on_segment(step_from, step_to, projectile.aim_point)).filter(
                |(point, _)| point.distance(projectile.aim_point) <= tuning.ground_arrival_radius,
            )
        } else {
            None
        };

        match (hostile_contact, ground_contact) {
            (Some((target, contact, along)), ground)
                if ground.map_or(true, |(_, ground_along)| along <= ground_along) =>
            {
                store.positions.insert(id, Position(contact));
                if projectile.splash_radius > 0.0 {
                    burst(
                        store,
                        &mut *context.events,
                        context.map,
                        contact,
                        projectile.splash_radius,
                        Payload {
                            delivery: DamageDelivery::Area,
                            ..payload
                        },
                    );
                } else {
                    strike(store, &mut *context.events, target, payload);
                }
                context.events.emit(SimEvent::ProjectileHit {
                    projectile: id,
                    caster: projectile.caster,
                    target,
                });
                spawn_visual(store, VisualKind::Hit, contact, tuning.hit_flash_seconds);
                store.despawn(id);
                continue;
            }
            (_, Some((landing, _))) => {
                store.positions.insert(id, Position(landing));
                if projectile.splash_radius > 0.0 {
                    burst(
                        store,
                        &mut *context.events,
                        context.map,
                        landing,
                        projectile.splash_radius,
                        Payload {
                            delivery: DamageDelivery::Area,
                            ..payload
                        },
                    );
                }
                spawn_visual(store, VisualKind::Impact, landing, tuning.impact_flash_seconds);
                store.despawn(id);
                continue;
            }
            _ => {}
        }

        if let Some(rest) = wall_rest {
            store.positions.insert(id, Position(rest));
            if projectile.splash_radius > 0.0 {
                burst(
                    store,
                    &mut *context.events,
                    context.map,
                    rest,
                    projectile.splash_radius,
                    Payload {
                        delivery: DamageDelivery::Area,
                        ..payload
                    },
                );
            }
            spawn_visual(store, VisualKind::Impact, rest, tuning.impact_flash_seconds);
            store.despawn(id);
            continue;
        }

        if let Some(target) = projectile.homing_target {
            match store.position_of(target).filter(|_| store.is_standing(target)) {
                Some(target_position) => {
                    projectile.aim_point = target_position;
                    let direction =
                        (target_position - position).normalized_or_zero(MIN_DIRECTION_LENGTH);
                    store
                        .velocities
                        .insert(id, Velocity(direction * projectile.speed));
                }
                None => projectile.homing_target = None,
            }
        }

        projectile.lifetime_remaining -= dt_seconds;
        if projectile.lifetime_remaining <= 0.0 {
            trace!(projectile = %id, "projectile_expired");
            store.despawn(id);
            continue;
        }
        projectile.last_position = position;
        store.projectiles.insert(id, projectile);
    }
}

/// Point of segment `from -> to` closest to `point`, with its fraction along
/// the segment.
fn closest_on_segment(from: Vec2, to: Vec2, point: Vec2) -> (Vec2, f32) {
    let segment = to - from;
    let length_squared = segment.x * segment.x + segment.y * segment.y;
    if length_squared <= MIN_DIRECTION_LENGTH {
        return (from, 0.0);
    }
    let offset = point - from;
    let along = ((offset.x * segment.x + offset.y * segment.y) / length_squared).clamp(0.0, 1.0);
    (from + segment * along, along)
}

/// First standing hostile whose hit circle the step `from -> to` touches,
/// with the contact point and its fraction along the step. Ties go to the
/// closer target.
fn first_hostile_along(
    store: &EntityStore,
    from: Vec2,
    to: Vec2,
    faction: Faction,
    radius: f32,
) -> Option<(EntityId, Vec2, f32)> {
    store
        .healths
        .ids()
        .into_iter()
        .filter(|id| {
            store.is_standing(*id)
                && store
                    .faction_of(*id)
                    .is_some_and(|other| faction.is_hostile_to(other))
        })
        .filter_map(|id| {
            let target_position = store.position_of(id)?;
            let (contact, along) = closest_on_segment(from, to, target_position);
            let miss = contact.distance(target_position);
            (miss <= radius).then_some((id, contact, along, miss))
        })
        .min_by(|a, b| a.2.total_cmp(&b.2).then(a.3.total_cmp(&b.3)))
        .map(|(id, contact, along, _)| (id, contact, along))
}

fn run_area_effects(context: &mut MagicContext<'_>, dt_seconds: f32) {
    let store = &mut *context.store;
    for id in store.query(AREA_EFFECT_QUERY) {
        let (Some(mut area), Some(center)) =
            (store.area_effects.get(id).copied(), store.position_of(id))
        else {
            continue;
        };
        area.remaining -= dt_seconds;
        if area.remaining <= 0.0 {
            store.despawn(id);
            continue;
        }

        let interval = area.tick_interval.max(MIN_DIRECTION_LENGTH);
        area.next_tick_in -= dt_seconds;
        while area.next_tick_in <= 0.0 {
            area.next_tick_in += interval;
            if area.tick_damage == 0 {
                continue;
            }
            burst(
                store,
                &mut *context.events,
                context.map,
                center,
                area.radius,
                Payload {
                    caster: area.caster,
                    faction: area.faction,
                    base_damage: area.tick_damage,
                    damage_type: area.damage_type,
                    delivery: DamageDelivery::Area,
                    status: None,
                },
            );
        }
        store.area_effects.insert(id, area);
    }
}

fn run_visual_effects(store: &mut EntityStore, dt_seconds: f32) {
    let mut expired = Vec::new();
    for (id, visual) in store.visual_effects.iter_mut() {
        visual.remaining -= dt_seconds;
        if visual.remaining <= 0.0 {
            expired.push(id);
        }
    }
    for id in expired {
        store.despawn(id);
    }
}

fn run_status_effects(store: &mut EntityStore, events: &mut dyn EventSink, dt_seconds: f32) {
    for id in store.query(STATUS_QUERY) {
        let Some(mut statuses) = store.status_effects.get(id).cloned() else {
            continue;
        };
        if statuses.active.is_empty() {
            continue;
        }

        let mut damage_ticks = Vec::new();
        let mut heal_ticks = Vec::new();
        for effect in &mut statuses.active {
            let active_seconds = dt_seconds.min(effect.remaining.max(0.0));
            effect.remaining -= dt_seconds;
            let damage_type = match effect.kind {
                StatusKind::Burn => Some(DamageType::Fire),
                StatusKind::Poison => Some(DamageType::Poison),
                StatusKind::Regen | StatusKind::Slow | StatusKind::Root | StatusKind::Stun => None,
            };
            if damage_type.is_none() && effect.kind != StatusKind::Regen {
                continue;
            }
            effect.carry += effect.magnitude * active_seconds;
            let whole = effect.carry.floor();
            if whole < 1.0 {
                continue;
            }
            effect.carry -= whole;
            let source = effect.source.unwrap_or(id);
            match damage_type {
                Some(damage_type) => damage_ticks.push((source, whole as u32, damage_type)),
                None => heal_ticks.push((source, whole as u32)),
            }
        }
        let expired = statuses
            .active
            .iter()
            .filter(|effect| effect.remaining <= 0.0)
            .map(|effect| effect.kind)
            .collect::<Vec<_>>();
        statuses.active.retain(|effect| effect.remaining > 0.0);
        store.status_effects.insert(id, statuses);

        for (source, amount, damage_type) in damage_ticks {
            let source_faction = store.faction_of(source);
            apply_hit(
                store,
                events,
                Hit {
                    source,
                    source_faction,
                    target: id,
                    amount,
                    damage_type,
                    delivery: DamageDelivery::Status,
                    critical: false,
                },
            );
        }
        for (source, amount) in heal_ticks {
            apply_heal(store, events, source, id, amount);
        }
        if !store.is_standing(id) {
            // Death cleared the list already.
            continue;
        }
        for status in expired {
            events.emit(SimEvent::StatusExpired { entity: id, status });
        }
    }
}

fn run_regeneration(store: &mut EntityStore, tuning: &MagicTuning, dt_seconds: f32) {
    for id in store.query(REGENERATION_QUERY) {
        let in_combat = store.in_combat.contains(id);
        let Some(regen) = store.regenerations.get_mut(id) else {
            continue;
        };

        if let Some(mana) = store.manas.get_mut(id) {
            let factor = if in_combat {
                tuning.in_combat_mana_regen_factor
            } else {
                1.0
            };
            if mana.current >= mana.maximum {
                regen.mana_carry = 0.0;
            } else {
                regen.mana_carry += regen.mana_per_second * factor * dt_seconds;
                let whole = regen.mana_carry.floor();
                if whole >= 1.0 {
                    regen.mana_carry -= whole;
                    mana.restore(whole as u32);
                }
            }
        }

        if in_combat {
            continue;
        }
        if let Some(health) = store.healths.get_mut(id) {
            if health.current >= health.maximum {
                regen.health_carry = 0.0;
            } else {
                regen.health_carry += regen.health_per_second * dt_seconds;
                let whole = regen.health_carry.floor();
                if whole >= 1.0 {
                    regen.health_carry -= whole;
                    health.restore(whole as u32);
                }
            }
        }
    }
}

fn run_casting(context: &mut MagicContext<'_>, dt_seconds: f32) {
    for caster in context.store.query(CASTING_QUERY) {
        let Some(mut casting) = context.store.castings.get(caster).copied() else {
            continue;
        };
        let stunned = context
            .store
            .status_effects
            .get(caster)
            .is_some_and(|statuses| statuses.is_stunned());
        if stunned {
            context.store.castings.remove(caster);
            context.events.emit(SimEvent::CastInterrupted {
                caster,
                spell: casting.spell,
            });
            continue;
        }

        casting.remaining -= dt_seconds;
        if casting.remaining > 0.0 {
            context.store.castings.insert(caster, casting);
            continue;
        }
        context.store.castings.remove(caster);
        let intent = CastIntent {
            spell: casting.spell,
            target: casting
                .target
                .map(CastTarget::Entity)
                .unwrap_or(CastTarget::Point(casting.point)),
        };
        match validate_cast(context.store, context.map, context.defs, caster, intent) {
            Ok(resolved) => commit_cast(context, caster, resolved),
            Err(refusal) => {
                trace!(caster = %caster, refusal = ?refusal, "cast_fizzled");
                context.events.emit(SimEvent::CastInterrupted {
                    caster,
                    spell: casting.spell,
                });
            }
        }
    }
}

fn run_cast_intents(context: &mut MagicContext<'_>) {
    for caster in context.store.query(CAST_INTENT_QUERY) {
        let Some(intent) = context.store.cast_intents.remove(caster) else {
            continue;
        };
        let resolved = match validate_cast(context.store, context.map, context.defs, caster, intent)
        {
            Ok(resolved) => resolved,
            Err(refusal) => {
                trace!(caster = %caster, spell = intent.spell.0, refusal = ?refusal, "cast_refused");
                continue;
            }
        };
        let Some(def) = context.defs.spell_def(resolved.spell) else {
            continue;
        };
        if def.cast_time > 0.0 {
            context.store.castings.insert(
                caster,
                Casting {
                    spell: resolved.spell,
                    target: resolved.target,
                    point: resolved.point,
                    remaining: def.cast_time,
                },
            );
        } else {
            commit_cast(context, caster, resolved);
        }
    }
}

/// Checks, in order: caster able, spell known, global cooldown, spell
/// cooldown, mana, then the target for the spell's targeting mode.
pub(crate) fn validate_cast(
    store: &EntityStore,
    map: &dyn DungeonMap,
    defs: &DefDatabase,
    caster: EntityId,
    intent: CastIntent,
) -> Result<ResolvedCast, CastRefusal> {
    if !store.is_standing(caster)
        || store
            .status_effects
            .get(caster)
            .is_some_and(|statuses| statuses.is_stunned())
    {
        return Err(CastRefusal::Incapacitated);
    }
    if store.castings.contains(caster) {
        return Err(CastRefusal::Busy);
    }
    let book = store
        .spell_books
        .get(caster)
        .filter(|book| book.knows(intent.spell))
        .ok_or(CastRefusal::UnknownSpell)?;
    let def = defs
        .spell_def(intent.spell)
        .ok_or(CastRefusal::UnknownSpell)?;
    if store
        .global_cooldowns
        .get(caster)
        .is_some_and(|cooldown| cooldown.remaining > 0.0)
    {
        return Err(CastRefusal::GlobalCooldown);
    }
    if book.cooldown_remaining(intent.spell) > 0.0 {
        return Err(CastRefusal::SpellCooldown);
    }
    if def.mana_cost > 0
        && !store
            .manas
            .get(caster)
            .is_some_and(|mana| mana.can_afford(def.mana_cost))
    {
        return Err(CastRefusal::InsufficientMana);
    }
    resolve_target(store, map, caster, def, intent.target)
}

fn resolve_target(
    store: &EntityStore,
    map: &dyn DungeonMap,
    caster: EntityId,
    def: &SpellDef,
    target: CastTarget,
) -> Result<ResolvedCast, CastRefusal> {
    let origin = store.position_of(caster).ok_or(CastRefusal::InvalidTarget)?;
    let faction = store.faction_of(caster).ok_or(CastRefusal::InvalidTarget)?;
    let reachable =
        |point: Vec2| origin.distance(point) <= def.range && map.has_line_of_sight(origin, point);
    let on_entity = |id: EntityId| -> Result<ResolvedCast, CastRefusal> {
        let point = store.position_of(id).ok_or(CastRefusal::InvalidTarget)?;
        Ok(ResolvedCast {
            spell: def.id,
            target: Some(id),
            point,
        })
    };
    let valid_enemy = |id: EntityId| {
        id != caster
            && store.is_standing(id)
            && store
                .faction_of(id)
                .is_some_and(|other| faction.is_hostile_to(other))
            && store.position_of(id).is_some_and(reachable)
    };
    let valid_ally = |id: EntityId| {
        store.is_standing(id)
            && store.faction_of(id) == Some(faction)
            && (id == caster || store.position_of(id).is_some_and(reachable))
    };
    let nearest_enemy = || {
        store
            .healths
            .ids()
            .into_iter()
            .filter(|id| valid_enemy(*id))
            .filter_map(|id| Some((id, store.position_of(id)?.distance(origin))))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    };

    match def.targeting {
        SpellTargeting::Caster => on_entity(caster),
        SpellTargeting::Enemy => match target {
            CastTarget::Entity(id) if valid_enemy(id) => on_entity(id),
            CastTarget::Auto => nearest_enemy()
                .ok_or(CastRefusal::InvalidTarget)
                .and_then(on_entity),
            _ => Err(CastRefusal::InvalidTarget),
        },
        SpellTargeting::Ally => match target {
            CastTarget::Entity(id) if valid_ally(id) => on_entity(id),
            CastTarget::Auto => {
                let weakest = store
                    .healths
                    .iter()
                    .filter(|(id, _)| valid_ally(*id))
                    .min_by(|a, b| a.1.fraction().total_cmp(&b.1.fraction()))
                    .map(|(id, _)| id)
                    .unwrap_or(caster);
                on_entity(weakest)
            }
            _ => Err(CastRefusal::InvalidTarget),
        },
        SpellTargeting::Ground => {
            let point = match target {
                CastTarget::Point(point) => point,
                CastTarget::Entity(id) if store.is_alive(id) => {
                    store.position_of(id).ok_or(CastRefusal::InvalidTarget)?
                }
                CastTarget::Auto => {
                    let id = nearest_enemy().ok_or(CastRefusal::InvalidTarget)?;
                    store.position_of(id).ok_or(CastRefusal::InvalidTarget)?
                }
                CastTarget::Entity(_) => return Err(CastRefusal::InvalidTarget),
            };
            if !point.is_finite() || !reachable(point) {
                return Err(CastRefusal::InvalidTarget);
            }
            Ok(ResolvedCast {
                spell: def.id,
                target: None,
                point,
            })
        }
    }
}

/// Pays for the spell, starts its cooldowns, announces it and applies its
/// effect. Only reached with a validated cast.
pub(crate) fn commit_cast(context: &mut MagicContext<'_>, caster: EntityId, cast: ResolvedCast) {
    let Some(def) = context.defs.spell_def(cast.spell) else {
        return;
    };
    let store = &mut *context.store;
    let (Some(origin), Some(faction)) = (store.position_of(caster), store.faction_of(caster))
    else {
        return;
    };
    if def.mana_cost > 0 {
        let paid = store
            .manas
            .get_mut(caster)
            .is_some_and(|mana| mana.try_spend(def.mana_cost));
        if !paid {
            return;
        }
    }
    if let Some(book) = store.spell_books.get_mut(caster) {
        book.start_cooldown(def.id, def.cooldown);
    }
    store.global_cooldowns.insert(
        caster,
        GlobalCooldown {
            remaining: def.global_cooldown,
        },
    );
    context.events.emit(SimEvent::SpellCast {
        caster,
        spell: def.id,
    });
    spawn_visual(
        store,
        VisualKind::CastFlash,
        origin,
        context.tuning.cast_flash_seconds,
    );

    let payload = Payload {
        caster,
        faction,
        base_damage: def.damage,
        damage_type: def.damage_type,
        delivery: DamageDelivery::Spell,
        status: def.status,
    };
    let intelligence = store
        .attributes
        .get(caster)
        .map(|attributes| attributes.intelligence)
        .unwrap_or(0);
    let events = &mut *context.events;

    match def.kind {
        SpellKind::Projectile => {
            spawn_projectile(
                store,
                origin,
                Projectile {
                    spell: def.id,
                    caster,
                    faction,
                    homing_target: cast.target.filter(|_| def.homing),
                    aim_point: cast.point,
                    targets_ground: def.targeting == SpellTargeting::Ground,
                    speed: def.projectile_speed,
                    damage: def.damage,
                    damage_type: def.damage_type,
                    splash_radius: def.radius,
                    status: def.status,
                    lifetime_remaining: context.tuning.projectile_lifetime,
                    last_position: origin,
                },
            );
        }
        SpellKind::Instant | SpellKind::Buff => {
            let target = cast.target.unwrap_or(caster);
            let hostile = store
                .faction_of(target)
                .is_some_and(|other| faction.is_hostile_to(other));
            if hostile {
                strike(store, events, target, payload);
            } else {
                if def.heal > 0 {
                    apply_heal(
                        store,
                        events,
                        caster,
                        target,
                        heal_amount(def.heal, intelligence),
                    );
                }
                if let Some(spec) = def.status {
                    apply_status(store, events, target, spec, Some(caster));
                }
            }
        }
        SpellKind::Area => {
            if def.heal > 0 {
                let amount = heal_amount(def.heal, intelligence);
                let allies = store
                    .healths
                    .ids()
                    .into_iter()
                    .filter(|id| {
                        store.faction_of(*id) == Some(faction)
                            && store.position_of(*id).is_some_and(|position| {
                                position.distance(cast.point) <= def.radius
                                    && context.map.has_line_of_sight(cast.point, position)
                            })
                    })
                    .collect::<Vec<_>>();
                for ally in allies {
                    apply_heal(store, events, caster, ally, amount);
                }
            }
            if def.damage > 0 || def.status.is_some() {
                burst(
                    store,
                    events,
                    context.map,
                    cast.point,
                    def.radius,
                    Payload {
                        delivery: DamageDelivery::Area,
                        ..payload
                    },
                );
            }
            if def.duration > 0.0 {
                let area = store.spawn();
                store.positions.insert(area, Position(cast.point));
                store.area_effects.insert(
                    area,
                    AreaEffect {
                        spell: def.id,
                        caster,
                        faction,
                        radius: def.radius,
                        tick_interval: def.tick_interval,
                        next_tick_in: def.tick_interval,
                        tick_damage: def.tick_damage,
                        damage_type: def.damage_type,
                        remaining: def.duration,
                    },
                );
                spawn_visual(store, VisualKind::AreaGlow, cast.point, def.duration);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::components::{Attributes, Health, InCombat, Mana, Regeneration, SpellBook};
    use crate::sim::map::Tilemap;
    use crate::sim::movement::run_movement;
    use crate::sim::test_support::{defs_with_spells, open_room, spawn_fighter, spell_def};

    fn give_spells(store: &mut EntityStore, id: EntityId, spells: Vec<SpellDefId>, mana: u32) {
        store.spell_books.insert(id, SpellBook::new(spells));
        store.global_cooldowns.insert(id, GlobalCooldown::default());
        store.manas.insert(id, Mana::full(mana));
    }

    fn magic_tick(
        map: &Tilemap,
        defs: &DefDatabase,
        store: &mut EntityStore,
        events: &mut Vec<SimEvent>,
        dt: f32,
    ) {
        let tuning = MagicTuning::default();
        let mut context = MagicContext {
            map,
            defs,
            tuning: &tuning,
            store,
            events,
        };
        run_magic(&mut context, dt);
    }

    fn bolt_def() -> SpellDef {
        let mut bolt = spell_def("spell.bolt", SpellKind::Instant, SpellTargeting::Enemy);
        bolt.damage = 10;
        bolt
    }

    #[test]
    fn cast_without_enough_mana_is_silently_refused() {
        let map = open_room(8, 8);
        let defs = defs_with_spells(vec![bolt_def()]);
        let bolt = defs.spell_def_id_by_name("spell.bolt").expect("bolt");
        let mut store = EntityStore::default();
        let mut events = Vec::new();
        let mage = spawn_fighter(&mut store, Vec2::new(1.5, 1.5), Faction::Party, 1, 0);
        give_spells(&mut store, mage, vec![bolt], 50);
        store.manas.insert(
            mage,
            Mana {
                current: 5,
                maximum: 50,
            },
        );
        let rat = spawn_fighter(&mut store, Vec2::new(4.5, 1.5), Faction::Hostile, 1, 0);
        store.cast_intents.insert(
            mage,
            CastIntent {
                spell: bolt,
                target: CastTarget::Entity(rat),
            },
        );

        magic_tick(&map, &defs, &mut store, &mut events, 0.016);

        assert!(events.is_empty());
        assert_eq!(store.manas.get(mage).map(|m| m.current), Some(5));
        let book = store.spell_books.get(mage).expect("book");
        assert_eq!(book.cooldown_remaining(bolt), 0.0);
        assert_eq!(
            store.global_cooldowns.get(mage).map(|c| c.remaining),
            Some(0.0)
        );
        assert!(store.cast_intents.get(mage).is_none());
    }

    #[test]
    fn successful_cast_pays_and_starts_cooldowns() {
        let map = open_room(8, 8);
        let defs = defs_with_spells(vec![bolt_def()]);
        let bolt = defs.spell_def_id_by_name("spell.bolt").expect("bolt");
        let mut store = EntityStore::default();
        let mut events = Vec::new();
        let mage = spawn_fighter(&mut store, Vec2::new(1.5, 1.5), Faction::Party, 1, 0);
        give_spells(&mut store, mage, vec![bolt], 50);
        let rat = spawn_fighter(&mut store, Vec2::new(4.5, 1.5), Faction::Hostile, 1, 0);
        store.cast_intents.insert(
            mage,
            CastIntent {
                spell: bolt,
                target: CastTarget::Auto,
            },
        );

        magic_tick(&map, &defs, &mut store, &mut events, 0.016);

        assert_eq!(events[0], SimEvent::SpellCast { caster: mage, spell: bolt });
        assert_eq!(store.manas.get(mage).map(|m| m.current), Some(40));
        assert_eq!(store.healths.get(rat).map(|h| h.current), Some(90));
        assert!(store.spell_books.get(mage).expect("book").cooldown_remaining(bolt) > 0.0);
        assert_eq!(
            store.global_cooldowns.get(mage).map(|c| c.remaining),
            Some(0.5)
        );
    }

    #[test]
    fn global_cooldown_blocks_a_second_cast() {
        let map = open_room(8, 8);
        let mut quick = bolt_def();
        quick.cooldown = 0.0;
        let defs = defs_with_spells(vec![quick]);
        let bolt = defs.spell_def_id_by_name("spell.bolt").expect("bolt");
        let mut store = EntityStore::default();
        let mut events = Vec::new();
        let mage = spawn_fighter(&mut store, Vec2::new(1.5, 1.5), Faction::Party, 1, 0);
        give_spells(&mut store, mage, vec![bolt], 100);
        spawn_fighter(&mut store, Vec2::new(4.5, 1.5), Faction::Hostile, 1, 0);

        for _ in 0..2 {
            store.cast_intents.insert(
                mage,
                CastIntent {
                    spell: bolt,
                    target: CastTarget::Auto,
                },
            );
            magic_tick(&map, &defs, &mut store, &mut events, 0.1);
        }

        let casts = events
            .iter()
            .filter(|event| matches!(event, SimEvent::SpellCast { .. }))
            .count();
        assert_eq!(casts, 1);
    }

    #[test]
    fn enemy_behind_wall_is_not_a_valid_target() {
        let map = Tilemap::from_rows(&["..#...", "..#..."]).expect("map");
        let defs = defs_with_spells(vec![bolt_def()]);
        let bolt = defs.spell_def_id_by_name("spell.bolt").expect("bolt");
        let mut store = EntityStore::default();
        let mage = spawn_fighter(&mut store, Vec2::new(0.5, 0.5), Faction::Party, 1, 0);
        give_spells(&mut store, mage, vec![bolt], 50);
        let rat = spawn_fighter(&mut store, Vec2::new(4.5, 0.5), Faction::Hostile, 1, 0);

        let refusal = validate_cast(
            &store,
            &map,
            &defs,
            mage,
            CastIntent {
                spell: bolt,
                target: CastTarget::Entity(rat),
            },
        );

        assert_eq!(refusal, Err(CastRefusal::InvalidTarget));
    }

    #[test]
    fn validation_checks_known_spell_before_anything_else() {
        let map = open_room(4, 4);
        let defs = defs_with_spells(vec![bolt_def()]);
        let bolt = defs.spell_def_id_by_name("spell.bolt").expect("bolt");
        let mut store = EntityStore::default();
        let mage = spawn_fighter(&mut store, Vec2::new(0.5, 0.5), Faction::Party, 1, 0);
        give_spells(&mut store, mage, Vec::new(), 0);
        store.global_cooldowns.insert(mage, GlobalCooldown { remaining: 1.0 });

        let refusal = validate_cast(
            &store,
            &map,
            &defs,
            mage,
            CastIntent {
                spell: bolt,
                target: CastTarget::Auto,
            },
        );

        assert_eq!(refusal, Err(CastRefusal::UnknownSpell));
    }

    #[test]
    fn ally_auto_target_prefers_lowest_health_fraction() {
        let map = open_room(8, 8);
        let mut mend = spell_def("spell.mend", SpellKind::Instant, SpellTargeting::Ally);
        mend.heal = 20;
        let defs = defs_with_spells(vec![mend]);
        let mend = defs.spell_def_id_by_name("spell.mend").expect("mend");
        let mut store = EntityStore::default();
        let priest = spawn_fighter(&mut store, Vec2::new(1.5, 1.5), Faction::Party, 1, 0);
        give_spells(&mut store, priest, vec![mend], 50);
        let scratched = spawn_fighter(&mut store, Vec2::new(2.5, 1.5), Faction::Party, 1, 0);
        let wounded = spawn_fighter(&mut store, Vec2::new(3.5, 1.5), Faction::Party, 1, 0);
        store.healths.get_mut(scratched).expect("health").current = 90;
        store.healths.get_mut(wounded).expect("health").current = 30;

        let resolved = validate_cast(
            &store,
            &map,
            &defs,
            priest,
            CastIntent {
                spell: mend,
                target: CastTarget::Auto,
            },
        )
        .expect("valid");

        assert_eq!(resolved.target, Some(wounded));
    }

    #[test]
    fn heal_scales_with_intelligence_and_caps_at_maximum() {
        let map = open_room(8, 8);
        let mut mend = spell_def("spell.mend", SpellKind::Instant, SpellTargeting::Ally);
        mend.heal = 20;
        let defs = defs_with_spells(vec![mend]);
        let mend = defs.spell_def_id_by_name("spell.mend").expect("mend");
        let mut store = EntityStore::default();
        let mut events = Vec::new();
        let priest = spawn_fighter(&mut store, Vec2::new(1.5, 1.5), Faction::Party, 1, 0);
        give_spells(&mut store, priest, vec![mend], 50);
        store.attributes.insert(
            priest,
            Attributes {
                strength: 0,
                dexterity: 0,
                intelligence: 10,
            },
        );
        let wounded = spawn_fighter(&mut store, Vec2::new(2.5, 1.5), Faction::Party, 1, 0);
        store.healths.get_mut(wounded).expect("health").current = 50;
        store.cast_intents.insert(
            priest,
            CastIntent {
                spell: mend,
                target: CastTarget::Entity(wounded),
            },
        );

        magic_tick(&map, &defs, &mut store, &mut events, 0.016);

        // 20 * (1 + 10 * 0.03) = 26
        assert_eq!(store.healths.get(wounded).map(|h| h.current), Some(76));
        assert!(events.contains(&SimEvent::HealthRestored {
            source: priest,
            target: wounded,
            amount: 26,
        }));
    }

    fn launch_bolt(
        store: &mut EntityStore,
        caster: EntityId,
        from: Vec2,
        to: Vec2,
        speed: f32,
    ) -> EntityId {
        spawn_projectile(
            store,
            from,
            Projectile {
                spell: SpellDefId(0),
                caster,
                faction: Faction::Party,
                homing_target: None,
                aim_point: to,
                targets_ground: false,
                speed,
                damage: 10,
                damage_type: DamageType::Fire,
                splash_radius: 0.0,
                status: None,
                lifetime_remaining: 5.0,
                last_position: from,
            },
        )
    }

    #[test]
    fn projectile_never_passes_a_thin_wall() {
        let map =
            Tilemap::from_rows(&[".....#.....", "...........", "..........."]).expect("map");
        let defs = DefDatabase::default();
        for dt in [0.1f32, 0.3] {
            let mut store = EntityStore::default();
            let mut events = Vec::new();
            let caster = spawn_fighter(&mut store, Vec2::new(0.5, 2.5), Faction::Party, 1, 0);
            let bolt = launch_bolt(
                &mut store,
                caster,
                Vec2::new(0.0, 0.5),
                Vec2::new(10.0, 0.5),
                10.0,
            );

            let mut destroyed_at = None;
            for tick in 0..20 {
                run_movement(&mut store, &map, dt);
                magic_tick(&map, &defs, &mut store, &mut events, dt);
                if let Some(position) = store.position_of(bolt) {
                    assert!(position.x < 5.0, "dt {dt}: observed x {}", position.x);
                }
                if store.is_pending_despawn(bolt) {
                    destroyed_at = Some(tick);
                    break;
                }
                store.apply_pending();
            }

            let tick = destroyed_at.expect("projectile destroyed at the wall");
            let crossing_tick = (5.0 / (10.0 * dt)).ceil() as usize - 1;
            assert_eq!(tick, crossing_tick, "dt {dt}");
            let rest = store.position_of(bolt).expect("position");
            assert!(rest.x > 4.9, "dt {dt}: rest x {}", rest.x);
            assert!(store
                .visual_effects
                .iter()
                .any(|(_, visual)| visual.kind == VisualKind::Impact));
        }
    }

    #[test]
    fn projectile_hits_nearest_hostile_once() {
        let map = open_room(12, 3);
        let defs = DefDatabase::default();
        let mut store = EntityStore::default();
        let mut events = Vec::new();
        let caster = spawn_fighter(&mut store, Vec2::new(0.5, 1.5), Faction::Party, 1, 0);
        let friend = spawn_fighter(&mut store, Vec2::new(2.5, 1.5), Faction::Party, 1, 0);
        let rat = spawn_fighter(&mut store, Vec2::new(5.5, 1.5), Faction::Hostile, 1, 0);
        let bolt = launch_bolt(
            &mut store,
            caster,
            Vec2::new(1.0, 1.5),
            Vec2::new(11.0, 1.5),
            10.0,
        );

        for _ in 0..10 {
            run_movement(&mut store, &map, 0.1);
            magic_tick(&map, &defs, &mut store, &mut events, 0.1);
            store.apply_pending();
        }

        assert!(!store.is_alive(bolt));
        assert_eq!(store.healths.get(friend).map(|h| h.current), Some(100));
        assert_eq!(store.healths.get(rat).map(|h| h.current), Some(90));
        let hits = events
            .iter()
            .filter(|event| matches!(event, SimEvent::ProjectileHit { .. }))
            .count();
        assert_eq!(hits, 1);
    }

    #[test]
    fn homing_projectile_drops_stale_target_and_flies_straight() {
        let map = open_room(20, 20);
        let defs = DefDatabase::default();
        let mut store = EntityStore::default();
        let mut events = Vec::new();
        let caster = spawn_fighter(&mut store, Vec2::new(0.5, 0.5), Faction::Party, 1, 0);
        let rat = spawn_fighter(&mut store, Vec2::new(15.5, 10.5), Faction::Hostile, 1, 0);
        let bolt = launch_bolt(
            &mut store,
            caster,
            Vec2::new(1.0, 1.0),
            Vec2::new(15.5, 10.5),
            5.0,
        );
        store.projectiles.get_mut(bolt).expect("bolt").homing_target = Some(rat);

        store.despawn(rat);
        store.apply_pending();
        let before = store.velocities.get(bolt).expect("velocity").0;
        run_movement(&mut store, &map, 0.1);
        magic_tick(&map, &defs, &mut store, &mut events, 0.1);

        let projectile = store.projectiles.get(bolt).expect("bolt");
        assert_eq!(projectile.homing_target, None);
        assert_eq!(store.velocities.get(bolt).map(|v| v.0), Some(before));
    }

    #[test]
    fn fast_projectile_cannot_skip_over_a_target() {
        let map = open_room(20, 3);
        let defs = DefDatabase::default();
        let mut store = EntityStore::default();
        let mut events = Vec::new();
        let caster = spawn_fighter(&mut store, Vec2::new(0.5, 1.5), Faction::Party, 1, 0);
        let rat = spawn_fighter(&mut store, Vec2::new(3.0, 1.5), Faction::Hostile, 1, 0);
        let bolt = launch_bolt(
            &mut store,
            caster,
            Vec2::new(1.0, 1.5),
            Vec2::new(19.0, 1.5),
            40.0,
        );

        run_movement(&mut store, &map, 0.1);
        let after_step = store.position_of(bolt).expect("bolt position");
        assert!(after_step.distance(Vec2::new(5.0, 1.5)) < 1e-3);
        magic_tick(&map, &defs, &mut store, &mut events, 0.1);

        assert!(store.is_pending_despawn(bolt));
        assert_eq!(store.healths.get(rat).map(|h| h.current), Some(90));
        assert!(events.contains(&SimEvent::ProjectileHit {
            projectile: bolt,
            caster,
            target: rat,
        }));
        let contact = store.position_of(bolt).expect("contact");
        assert!(contact.distance(Vec2::new(3.0, 1.5)) <= 0.6);
    }

    #[test]
    fn fast_ground_shot_lands_on_its_point_instead_of_overshooting() {
        let map = open_room(20, 3);
        let defs = DefDatabase::default();
        let mut store = EntityStore::default();
        let mut events = Vec::new();
        let caster = spawn_fighter(&mut store, Vec2::new(0.5, 1.5), Faction::Party, 1, 0);
        let shot = launch_bolt(
            &mut store,
            caster,
            Vec2::new(1.0, 1.5),
            Vec2::new(3.0, 1.5),
            40.0,
        );
        store.projectiles.get_mut(shot).expect("shot").targets_ground = true;

        run_movement(&mut store, &map, 0.1);
        magic_tick(&map, &defs, &mut store, &mut events, 0.1);

        assert!(store.is_pending_despawn(shot));
        let landing = store.position_of(shot).expect("landing");
        assert!(landing.distance(Vec2::new(3.0, 1.5)) < 1e-3);
        assert!(store
            .visual_effects
            .iter()
            .any(|(_, visual)| visual.kind == VisualKind::Impact));
    }

    #[test]
    fn projectile_times_out() {
        let map = open_room(200, 3);
        let defs = DefDatabase::default();
        let mut store = EntityStore::default();
        let mut events = Vec::new();
        let caster = spawn_fighter(&mut store, Vec2::new(0.5, 1.5), Faction::Party, 1, 0);
        let bolt = launch_bolt(
            &mut store,
            caster,
            Vec2::new(1.0, 1.5),
            Vec2::new(199.0, 1.5),
            1.0,
        );

        for _ in 0..49 {
            run_movement(&mut store, &map, 0.1);
            magic_tick(&map, &defs, &mut store, &mut events, 0.1);
        }
        assert!(!store.is_pending_despawn(bolt));
        for _ in 0..2 {
            run_movement(&mut store, &map, 0.1);
            magic_tick(&map, &defs, &mut store, &mut events, 0.1);
        }
        assert!(store.is_pending_despawn(bolt));
    }

    #[test]
    fn area_effect_ticks_visible_hostiles_then_expires() {
        let map = Tilemap::from_rows(&[".......", "...#...", "......."]).expect("map");
        let mut pool = spell_def("spell.pool", SpellKind::Area, SpellTargeting::Ground);
        pool.radius = 3.0;
        pool.duration = 1.0;
        pool.tick_damage = 4;
        let defs = defs_with_spells(vec![pool]);
        let pool = defs.spell_def_id_by_name("spell.pool").expect("pool");
        let mut store = EntityStore::default();
        let mut events = Vec::new();
        let mage = spawn_fighter(&mut store, Vec2::new(0.5, 1.5), Faction::Party, 1, 0);
        give_spells(&mut store, mage, vec![pool], 50);
        let exposed = spawn_fighter(&mut store, Vec2::new(2.5, 0.5), Faction::Hostile, 1, 0);
        let sheltered = spawn_fighter(&mut store, Vec2::new(4.5, 1.5), Faction::Hostile, 1, 0);
        store.cast_intents.insert(
            mage,
            CastIntent {
                spell: pool,
                target: CastTarget::Point(Vec2::new(2.5, 1.5)),
            },
        );

        for _ in 0..6 {
            magic_tick(&map, &defs, &mut store, &mut events, 0.25);
        }
        store.apply_pending();

        // Expiry is checked before ticking, so the tick due at 1.0s never lands.
        assert_eq!(store.healths.get(exposed).map(|h| h.current), Some(96));
        assert_eq!(store.healths.get(sheltered).map(|h| h.current), Some(100));
        assert!(store.area_effects.is_empty());
    }

    #[test]
    fn burn_deals_fractional_damage_and_expires() {
        let map = open_room(4, 4);
        let defs = DefDatabase::default();
        let mut store = EntityStore::default();
        let mut events = Vec::new();
        let mage = spawn_fighter(&mut store, Vec2::new(0.5, 0.5), Faction::Party, 1, 0);
        let rat = spawn_fighter(&mut store, Vec2::new(2.5, 0.5), Faction::Hostile, 1, 0);
        apply_status(
            &mut store,
            &mut events,
            rat,
            StatusEffectSpec {
                kind: StatusKind::Burn,
                duration: 2.0,
                magnitude: 2.5,
            },
            Some(mage),
        );

        for _ in 0..10 {
            magic_tick(&map, &defs, &mut store, &mut events, 0.25);
        }

        assert_eq!(store.healths.get(rat).map(|h| h.current), Some(95));
        assert!(events.contains(&SimEvent::StatusExpired {
            entity: rat,
            status: StatusKind::Burn,
        }));
        assert!(events.iter().all(|event| match event {
            SimEvent::DamageDealt { delivery, .. } => *delivery == DamageDelivery::Status,
            _ => true,
        }));
    }

    #[test]
    fn mana_regenerates_at_half_rate_in_combat() {
        let map = open_room(4, 4);
        let defs = DefDatabase::default();
        let mut store = EntityStore::default();
        let mut events = Vec::new();
        let calm = spawn_fighter(&mut store, Vec2::new(0.5, 0.5), Faction::Party, 1, 0);
        let fighting = spawn_fighter(&mut store, Vec2::new(1.5, 0.5), Faction::Party, 1, 0);
        for id in [calm, fighting] {
            store.manas.insert(
                id,
                Mana {
                    current: 0,
                    maximum: 100,
                },
            );
            store.regenerations.insert(
                id,
                Regeneration {
                    mana_per_second: 4.0,
                    health_per_second: 2.0,
                    ..Regeneration::default()
                },
            );
            store.healths.insert(
                id,
                Health {
                    current: 50,
                    maximum: 100,
                    last_hit_by: None,
                },
            );
        }
        store.in_combat.insert(fighting, InCombat::default());

        for _ in 0..10 {
            magic_tick(&map, &defs, &mut store, &mut events, 0.25);
        }

        assert_eq!(store.manas.get(calm).map(|m| m.current), Some(10));
        assert_eq!(store.manas.get(fighting).map(|m| m.current), Some(5));
        assert_eq!(store.healths.get(calm).map(|h| h.current), Some(55));
        assert_eq!(store.healths.get(fighting).map(|h| h.current), Some(50));
    }

    #[test]
    fn cast_time_delays_the_effect_and_stun_interrupts() {
        let map = open_room(8, 8);
        let mut slow_bolt = bolt_def();
        slow_bolt.cast_time = 0.5;
        let defs = defs_with_spells(vec![slow_bolt]);
        let bolt = defs.spell_def_id_by_name("spell.bolt").expect("bolt");
        let mut store = EntityStore::default();
        let mut events = Vec::new();
        let mage = spawn_fighter(&mut store, Vec2::new(1.5, 1.5), Faction::Party, 1, 0);
        give_spells(&mut store, mage, vec![bolt], 50);
        let rat = spawn_fighter(&mut store, Vec2::new(4.5, 1.5), Faction::Hostile, 1, 0);
        let cast = CastIntent {
            spell: bolt,
            target: CastTarget::Entity(rat),
        };

        store.cast_intents.insert(mage, cast);
        magic_tick(&map, &defs, &mut store, &mut events, 0.25);
        assert!(store.castings.contains(mage));
        assert!(events.is_empty());
        magic_tick(&map, &defs, &mut store, &mut events, 0.25);
        assert!(store.castings.contains(mage));
        magic_tick(&map, &defs, &mut store, &mut events, 0.25);
        assert!(!store.castings.contains(mage));
        assert_eq!(store.healths.get(rat).map(|h| h.current), Some(90));

        store.global_cooldowns.insert(mage, GlobalCooldown::default());
        store.spell_books.insert(mage, SpellBook::new(vec![bolt]));
        events.clear();
        store.cast_intents.insert(mage, cast);
        magic_tick(&map, &defs, &mut store, &mut events, 0.25);
        store.status_effects.get_mut(mage).expect("statuses").apply(
            StatusEffectSpec {
                kind: StatusKind::Stun,
                duration: 1.0,
                magnitude: 0.0,
            },
            Some(rat),
        );
        magic_tick(&map, &defs, &mut store, &mut events, 0.25);

        assert!(!store.castings.contains(mage));
        assert_eq!(
            events,
            vec![SimEvent::CastInterrupted {
                caster: mage,
                spell: bolt,
            }]
        );
    }

    #[test]
    fn visual_effects_expire_on_their_timer() {
        let defs = DefDatabase::default();
        let map = open_room(2, 2);
        let mut store = EntityStore::default();
        let mut events = Vec::new();
        let flash = spawn_visual(&mut store, VisualKind::Hit, Vec2::new(0.5, 0.5), 0.3);

        magic_tick(&map, &defs, &mut store, &mut events, 0.2);
        assert!(!store.is_pending_despawn(flash));
        magic_tick(&map, &defs, &mut store, &mut events, 0.2);
        assert!(store.is_pending_despawn(flash));
    }
}
