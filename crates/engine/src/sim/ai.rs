use tracing::trace;

use super::components::{
    AiController, AiRole, AiState, AllyPosture, CastIntent, CastTarget, CombatTarget,
};
use super::config::{AiTuning, NavigationTuning};
use super::intent::halt;
use super::map::DungeonMap;
use super::nav::Pathfinder;
use super::party::PartyState;
use super::world::{ComponentKind, ComponentSet, EntityId, EntityStore, Query, Vec2};
use crate::content::{DefDatabase, SpellDef, SpellTargeting};

pub const AI_QUERY: Query = Query::new(
    ComponentSet::EMPTY
        .with(ComponentKind::AiController)
        .with(ComponentKind::Position),
    ComponentSet::EMPTY
        .with(ComponentKind::Dead)
        .with(ComponentKind::Downed)
        .with(ComponentKind::PlayerControlled),
);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AiStats {
    pub decisions: u32,
    pub transitions: u32,
    pub casts_queued: u32,
}

pub(crate) struct AiContext<'a> {
    pub map: &'a dyn DungeonMap,
    pub defs: &'a DefDatabase,
    pub tuning: &'a AiTuning,
    pub navigation: &'a NavigationTuning,
    pub party: &'a PartyState,
    pub store: &'a mut EntityStore,
}

/// Advances every AI controller. Decisions only write intent: a NavPath,
/// a CombatTarget or a CastIntent.
pub(crate) fn run_ai(context: &mut AiContext<'_>, dt_seconds: f32) -> AiStats {
    let mut stats = AiStats::default();
    let leader = context.party.standing_leader(context.store);

    for id in context.store.query(AI_QUERY) {
        if Some(id) == leader {
            continue;
        }
        let Some(mut controller) = context.store.ai_controllers.get(id).cloned() else {
            continue;
        };
        for timer in controller.autocast_timers.values_mut() {
            *timer = (*timer - dt_seconds).max(0.0);
        }
        controller.decision_timer -= dt_seconds;
        if controller.decision_timer > 0.0 {
            context.store.ai_controllers.insert(id, controller);
            continue;
        }

        let previous = controller.state;
        match controller.role {
            AiRole::Enemy => {
                controller.decision_timer = context.tuning.enemy_decision_interval;
                decide_enemy(context, id, &mut controller);
            }
            AiRole::Ally { posture } => {
                controller.decision_timer = context.tuning.ally_decision_interval;
                decide_ally(context, id, &mut controller, posture, leader);
            }
        }
        if queue_autocast(context, id, &mut controller) {
            stats.casts_queued += 1;
        }
        stats.decisions += 1;
        if controller.state != previous {
            stats.transitions += 1;
            trace!(entity = %id, from = ?previous, to = ?controller.state, "ai_transition");
        }
        context.store.ai_controllers.insert(id, controller);
    }
    stats
}

fn decide_enemy(context: &mut AiContext<'_>, id: EntityId, controller: &mut AiController) {
    let Some(position) = context.store.position_of(id) else {
        return;
    };
    if controller.state != AiState::Return
        && position.distance(controller.home) > controller.leash_range
    {
        enter_return(context, id, controller, position);
        return;
    }

    match controller.state {
        AiState::Idle => {
            let aggro_range = controller.aggro_range;
            if let Some(target) =
                nearest_visible_hostile(context, id, position, aggro_range, |_| true)
            {
                engage(context, id, controller, target, AiState::Chase);
            }
        }
        AiState::Chase | AiState::Attack => {
            pursue_or_strike(context, id, controller, position, true);
        }
        AiState::Return => return_home(context, id, controller, position),
        AiState::Flee => enter_return(context, id, controller, position),
    }
}

fn decide_ally(
    context: &mut AiContext<'_>,
    id: EntityId,
    controller: &mut AiController,
    posture: AllyPosture,
    leader: Option<EntityId>,
) {
    let Some(position) = context.store.position_of(id) else {
        return;
    };
    if let Some(leader_position) = leader.and_then(|leader| context.store.position_of(leader)) {
        controller.home = leader_position;
    }
    let health_fraction = context
        .store
        .healths
        .get(id)
        .map(|health| health.fraction())
        .unwrap_or(1.0);
    let engaged = matches!(controller.state, AiState::Chase | AiState::Attack);

    if engaged
        && posture.flees_on_low_health()
        && health_fraction < context.tuning.flee_health_fraction
    {
        disengage(context, id, controller);
        controller.state = AiState::Flee;
        pursue(context, id, position, controller.home);
        return;
    }
    if controller.state == AiState::Flee {
        let aggro_range = controller.aggro_range;
        let threatened = nearest_hostile(context.store, id, position, aggro_range).is_some();
        if health_fraction >= context.tuning.flee_recover_fraction || !threatened {
            controller.state = AiState::Idle;
            halt(context.store, id);
        } else {
            pursue(context, id, position, controller.home);
        }
        return;
    }
    if engaged && !posture.may_attack() {
        disengage(context, id, controller);
        controller.state = AiState::Idle;
        halt(context.store, id);
        return;
    }
    if controller.state != AiState::Return
        && position.distance(controller.home) > controller.leash_range
    {
        enter_return(context, id, controller, position);
        return;
    }

    match controller.state {
        AiState::Idle => {
            let engagement =
                pick_ally_engagement(context, id, position, posture, controller.home);
            if let Some((target, state)) = engagement {
                engage(context, id, controller, target, state);
            } else {
                follow_leader(context, id, controller.home, position);
            }
        }
        AiState::Chase | AiState::Attack => {
            let guard_breached = posture == AllyPosture::Defensive
                && controller
                    .target
                    .and_then(|target| context.store.position_of(target))
                    .is_some_and(|target_position| {
                        target_position.distance(controller.home)
                            > context.tuning.defensive_guard_radius
                    });
            if guard_breached {
                enter_return(context, id, controller, position);
                return;
            }
            pursue_or_strike(context, id, controller, position, posture.may_chase());
        }
        AiState::Return => return_home(context, id, controller, position),
        AiState::Flee => {}
    }
}

/// The enemy an idle ally should take on, and the state to take it on in.
fn pick_ally_engagement(
    context: &AiContext<'_>,
    id: EntityId,
    position: Vec2,
    posture: AllyPosture,
    leader_position: Vec2,
) -> Option<(EntityId, AiState)> {
    let tuning = context.tuning;
    match posture {
        AllyPosture::Aggressive => {
            nearest_visible_hostile(context, id, position, tuning.ally_engage_range, |_| true)
                .map(|target| (target, AiState::Chase))
        }
        AllyPosture::Defensive => nearest_visible_hostile(
            context,
            id,
            position,
            tuning.ally_engage_range,
            |target_position| {
                target_position.distance(leader_position) <= tuning.defensive_guard_radius
            },
        )
        .map(|target| (target, AiState::Chase)),
        AllyPosture::Follow => {
            let attack_range = attack_range_of(context.store, id);
            nearest_visible_hostile(context, id, position, attack_range, |_| true)
                .map(|target| (target, AiState::Attack))
        }
        AllyPosture::Passive => None,
    }
}

/// Chase/Attack step shared by both roles. `may_chase` false means the
/// entity holds its ground and gives up once the target leaves reach.
fn pursue_or_strike(
    context: &mut AiContext<'_>,
    id: EntityId,
    controller: &mut AiController,
    position: Vec2,
    may_chase: bool,
) {
    let Some(target) = controller
        .target
        .filter(|target| is_valid_target(context.store, id, *target))
    else {
        enter_return(context, id, controller, position);
        return;
    };
    let Some(target_position) = context.store.position_of(target) else {
        enter_return(context, id, controller, position);
        return;
    };
    let attack_range = attack_range_of(context.store, id);
    let distance = position.distance(target_position);
    let visible = context.map.has_line_of_sight(position, target_position);
    context.store.combat_targets.insert(id, CombatTarget(target));

    let next = match controller.state {
        AiState::Chase if distance <= attack_range && visible => AiState::Attack,
        AiState::Attack
            if distance > attack_range * context.tuning.attack_range_hysteresis || !visible =>
        {
            AiState::Chase
        }
        state => state,
    };

    match next {
        AiState::Attack if distance <= attack_range => {
            controller.state = AiState::Attack;
            halt(context.store, id);
        }
        // Still inside the hysteresis band: stay in Attack but close the gap.
        AiState::Attack if may_chase => {
            controller.state = AiState::Attack;
            pursue(context, id, position, target_position);
        }
        _ if may_chase => {
            controller.state = AiState::Chase;
            pursue(context, id, position, target_position);
        }
        _ => {
            disengage(context, id, controller);
            controller.state = AiState::Idle;
            halt(context.store, id);
        }
    }
}

fn engage(
    context: &mut AiContext<'_>,
    id: EntityId,
    controller: &mut AiController,
    target: EntityId,
    state: AiState,
) {
    controller.state = state;
    controller.target = Some(target);
    context.store.combat_targets.insert(id, CombatTarget(target));
    let positions = (context.store.position_of(id), context.store.position_of(target));
    match (state, positions) {
        (AiState::Chase, (Some(position), Some(target_position))) => {
            pursue(context, id, position, target_position);
        }
        _ => halt(context.store, id),
    }
}

fn disengage(context: &mut AiContext<'_>, id: EntityId, controller: &mut AiController) {
    controller.target = None;
    context.store.combat_targets.remove(id);
}

fn enter_return(
    context: &mut AiContext<'_>,
    id: EntityId,
    controller: &mut AiController,
    position: Vec2,
) {
    disengage(context, id, controller);
    controller.state = AiState::Return;
    return_home(context, id, controller, position);
}

fn return_home(
    context: &mut AiContext<'_>,
    id: EntityId,
    controller: &mut AiController,
    position: Vec2,
) {
    if position.distance(controller.home) <= context.tuning.home_arrival_distance {
        controller.state = AiState::Idle;
        halt(context.store, id);
    } else {
        pursue(context, id, position, controller.home);
    }
}

fn follow_leader(context: &mut AiContext<'_>, id: EntityId, leader_position: Vec2, position: Vec2) {
    let distance = position.distance(leader_position);
    if distance > context.tuning.ally_follow_distance {
        pursue(context, id, position, leader_position);
    } else if distance <= context.tuning.ally_stop_distance {
        halt(context.store, id);
    }
}

/// Paths toward `goal`, keeping the current path while its goal is close
/// enough. No path leaves the entity where it is.
fn pursue(context: &mut AiContext<'_>, id: EntityId, position: Vec2, goal: Vec2) {
    let goal_is_current = context
        .store
        .nav_paths
        .get(id)
        .is_some_and(|path| path.goal.distance(goal) <= context.tuning.repath_distance);
    if goal_is_current {
        return;
    }
    let pathfinder =
        Pathfinder::new(context.map).with_iteration_cap(context.navigation.path_iteration_cap);
    match pathfinder.find_path(position, goal) {
        Some(path) => {
            context.store.nav_paths.insert(id, path);
        }
        None => {
            trace!(entity = %id, "ai_no_path");
            halt(context.store, id);
        }
    }
}

fn attack_range_of(store: &EntityStore, id: EntityId) -> f32 {
    store
        .combat_stats
        .get(id)
        .map(|stats| stats.attack_range)
        .unwrap_or(0.0)
}

fn is_valid_target(store: &EntityStore, id: EntityId, target: EntityId) -> bool {
    target != id
        && store.is_standing(target)
        && match (store.faction_of(id), store.faction_of(target)) {
            (Some(own), Some(other)) => own.is_hostile_to(other),
            _ => false,
        }
}

fn nearest_hostile(
    store: &EntityStore,
    id: EntityId,
    position: Vec2,
    range: f32,
) -> Option<EntityId> {
    store
        .healths
        .ids()
        .into_iter()
        .filter(|candidate| is_valid_target(store, id, *candidate))
        .filter_map(|candidate| {
            let distance = store.position_of(candidate)?.distance(position);
            (distance <= range).then_some((candidate, distance))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate)
}

fn nearest_visible_hostile(
    context: &AiContext<'_>,
    id: EntityId,
    position: Vec2,
    range: f32,
    accept: impl Fn(Vec2) -> bool,
) -> Option<EntityId> {
    let store = &*context.store;
    store
        .healths
        .ids()
        .into_iter()
        .filter(|candidate| is_valid_target(store, id, *candidate))
        .filter_map(|candidate| {
            let candidate_position = store.position_of(candidate)?;
            let distance = candidate_position.distance(position);
            let eligible = distance <= range
                && accept(candidate_position)
                && context.map.has_line_of_sight(position, candidate_position);
            eligible.then_some((candidate, distance))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate)
}

/// Queues at most one spell per decision.
fn queue_autocast(
    context: &mut AiContext<'_>,
    id: EntityId,
    controller: &mut AiController,
) -> bool {
    let Some((def, target)) = pick_autocast(context, id, controller) else {
        return false;
    };
    let timer_multiplier = match controller.role {
        AiRole::Ally { .. } => context.tuning.ally_autocast_cooldown_multiplier,
        AiRole::Enemy => 1.0,
    };
    controller
        .autocast_timers
        .insert(def.id, def.cooldown * timer_multiplier);
    context.store.cast_intents.insert(
        id,
        CastIntent {
            spell: def.id,
            target,
        },
    );
    trace!(entity = %id, spell = def.id.0, "autocast_queued");
    true
}

/// Allies heal wounded party members first, then attack their engaged
/// target. Enemies only attack. Nothing is picked while a cast is queued,
/// in progress, or held by the global cooldown.
fn pick_autocast<'d>(
    context: &AiContext<'d>,
    id: EntityId,
    controller: &AiController,
) -> Option<(&'d SpellDef, CastTarget)> {
    let store = &*context.store;
    let defs = context.defs;
    let tuning = context.tuning;
    let book = store.spell_books.get(id)?;
    let blocked = store.cast_intents.contains(id)
        || store.castings.contains(id)
        || store
            .global_cooldowns
            .get(id)
            .is_some_and(|cooldown| cooldown.remaining > 0.0);
    if blocked {
        return None;
    }
    let position = store.position_of(id)?;
    let mana = store.manas.get(id).map(|mana| mana.current).unwrap_or(0);
    let affordable = book
        .known
        .iter()
        .copied()
        .filter(|spell| {
            controller
                .autocast_timers
                .get(spell)
                .map_or(true, |timer| *timer <= 0.0)
                && book.cooldown_remaining(*spell) <= 0.0
        })
        .filter_map(|spell| defs.spell_def(spell))
        .filter(|def| def.mana_cost <= mana)
        .collect::<Vec<_>>();

    let posture = controller.posture();
    if posture.is_some() {
        let heal = affordable
            .iter()
            .filter(|def| def.is_heal())
            .find_map(|def| {
                let target = match def.targeting {
                    SpellTargeting::Caster => Some(id).filter(|_| {
                        store
                            .healths
                            .get(id)
                            .is_some_and(|health| health.fraction() < tuning.ally_heal_threshold)
                    }),
                    _ => wounded_ally(context, id, position, def.range.min(tuning.ally_heal_range)),
                }?;
                Some((*def, CastTarget::Entity(target)))
            });
        if heal.is_some() {
            return heal;
        }
    }

    if !posture.map_or(true, AllyPosture::may_attack)
        || !matches!(controller.state, AiState::Chase | AiState::Attack)
    {
        return None;
    }
    let target = controller
        .target
        .filter(|target| is_valid_target(store, id, *target))?;
    let distance = position.distance(store.position_of(target)?);
    affordable
        .into_iter()
        .find(|def| def.is_offensive() && distance <= def.range)
        .map(|def| (def, CastTarget::Entity(target)))
}

/// Lowest-health standing ally under the heal threshold within `range`.
fn wounded_ally(
    context: &AiContext<'_>,
    id: EntityId,
    position: Vec2,
    range: f32,
) -> Option<EntityId> {
    let store = &*context.store;
    let faction = store.faction_of(id)?;
    store
        .healths
        .iter()
        .filter(|(candidate, health)| {
            health.fraction() < context.tuning.ally_heal_threshold
                && store.is_standing(*candidate)
                && store.faction_of(*candidate) == Some(faction)
                && store.position_of(*candidate).is_some_and(|candidate_position| {
                    candidate_position.distance(position) <= range
                        && context.map.has_line_of_sight(position, candidate_position)
                })
        })
        .min_by(|a, b| a.1.fraction().total_cmp(&b.1.fraction()))
        .map(|(candidate, _)| candidate)
}
