use tracing::trace;

use super::components::{
    AiRole, AllyPosture, CastIntent, CastTarget, CombatTarget, Faction, PlayerControlled, Velocity,
};
use super::config::SimConfig;
use super::events::{EventSink, SimEvent};
use super::map::DungeonMap;
use super::nav::Pathfinder;
use super::party::PartyState;
use super::world::{EntityId, EntityStore, Vec2};
use crate::content::SpellDefId;

/// Player-facing orders, applied at the start of the next tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimCommand {
    /// Click-to-move; pathfound and smoothed.
    MoveTo { entity: EntityId, point: Vec2 },
    /// Direct steering; replaces any path.
    SetVelocity { entity: EntityId, velocity: Vec2 },
    Attack { entity: EntityId, target: EntityId },
    Cast {
        entity: EntityId,
        spell: SpellDefId,
        target: CastTarget,
    },
    CancelCast { entity: EntityId },
    Stop { entity: EntityId },
    SetPosture {
        entity: EntityId,
        posture: AllyPosture,
    },
    SetLeader { entity: EntityId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimCommandKind {
    MoveTo,
    SetVelocity,
    Attack,
    Cast,
    CancelCast,
    Stop,
    SetPosture,
    SetLeader,
}

impl SimCommand {
    pub fn kind(&self) -> SimCommandKind {
        match self {
            Self::MoveTo { .. } => SimCommandKind::MoveTo,
            Self::SetVelocity { .. } => SimCommandKind::SetVelocity,
            Self::Attack { .. } => SimCommandKind::Attack,
            Self::Cast { .. } => SimCommandKind::Cast,
            Self::CancelCast { .. } => SimCommandKind::CancelCast,
            Self::Stop { .. } => SimCommandKind::Stop,
            Self::SetPosture { .. } => SimCommandKind::SetPosture,
            Self::SetLeader { .. } => SimCommandKind::SetLeader,
        }
    }

    pub fn entity(&self) -> EntityId {
        match *self {
            Self::MoveTo { entity, .. }
            | Self::SetVelocity { entity, .. }
            | Self::Attack { entity, .. }
            | Self::Cast { entity, .. }
            | Self::CancelCast { entity }
            | Self::Stop { entity }
            | Self::SetPosture { entity, .. }
            | Self::SetLeader { entity } => entity,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandApplyStats {
    pub total: u32,
    pub move_to: u32,
    pub set_velocity: u32,
    pub attack: u32,
    pub cast: u32,
    pub cancel_cast: u32,
    pub stop: u32,
    pub set_posture: u32,
    pub set_leader: u32,
    pub refused: u32,
}

impl CommandApplyStats {
    fn record(&mut self, kind: SimCommandKind) {
        self.total = self.total.saturating_add(1);
        let counter = match kind {
            SimCommandKind::MoveTo => &mut self.move_to,
            SimCommandKind::SetVelocity => &mut self.set_velocity,
            SimCommandKind::Attack => &mut self.attack,
            SimCommandKind::Cast => &mut self.cast,
            SimCommandKind::CancelCast => &mut self.cancel_cast,
            SimCommandKind::Stop => &mut self.stop,
            SimCommandKind::SetPosture => &mut self.set_posture,
            SimCommandKind::SetLeader => &mut self.set_leader,
        };
        *counter = counter.saturating_add(1);
    }
}

#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: Vec<SimCommand>,
    last_tick_apply_stats: CommandApplyStats,
}

impl CommandQueue {
    pub fn enqueue(&mut self, command: SimCommand) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub(crate) fn drain_current_tick(&mut self) -> Vec<SimCommand> {
        std::mem::take(&mut self.commands)
    }

    pub(crate) fn set_last_tick_apply_stats(&mut self, stats: CommandApplyStats) {
        self.last_tick_apply_stats = stats;
    }

    pub fn last_tick_apply_stats(&self) -> CommandApplyStats {
        self.last_tick_apply_stats
    }
}

pub(crate) struct IntentContext<'a> {
    pub map: &'a dyn DungeonMap,
    pub config: &'a SimConfig,
    pub store: &'a mut EntityStore,
    pub party: &'a mut PartyState,
    pub events: &'a mut dyn EventSink,
}

/// Applies queued commands in submission order, then steers player-controlled
/// attackers toward targets they cannot reach yet.
pub(crate) fn run_intent(
    commands: Vec<SimCommand>,
    context: &mut IntentContext<'_>,
) -> CommandApplyStats {
    let mut stats = CommandApplyStats::default();
    for command in commands {
        stats.record(command.kind());
        if !apply_command(command, context) {
            stats.refused = stats.refused.saturating_add(1);
            trace!(entity = %command.entity(), kind = ?command.kind(), "command_refused");
        }
    }
    run_player_pursuit(context);
    stats
}

fn apply_command(command: SimCommand, context: &mut IntentContext<'_>) -> bool {
    let store = &mut *context.store;
    let entity = command.entity();
    if !store.is_standing(entity) {
        return false;
    }

    match command {
        SimCommand::MoveTo { point, .. } => {
            let Some(start) = store.position_of(entity) else {
                return false;
            };
            store.combat_targets.remove(entity);
            let pathfinder = Pathfinder::new(context.map)
                .with_iteration_cap(context.config.navigation.path_iteration_cap);
            match pathfinder.find_smoothed_path(start, point) {
                Some(path) => {
                    store.nav_paths.insert(entity, path);
                    true
                }
                None => {
                    halt(store, entity);
                    false
                }
            }
        }
        SimCommand::SetVelocity { velocity, .. } => {
            if !velocity.is_finite() {
                return false;
            }
            store.nav_paths.remove(entity);
            store.velocities.insert(entity, Velocity(velocity));
            true
        }
        SimCommand::Attack { target, .. } => {
            if target == entity || !store.is_standing(target) {
                return false;
            }
            let (Some(own), Some(other)) = (store.faction_of(entity), store.faction_of(target))
            else {
                return false;
            };
            if !own.is_hostile_to(other) {
                return false;
            }
            store.combat_targets.insert(entity, CombatTarget(target));
            true
        }
        SimCommand::Cast { spell, target, .. } => {
            store.cast_intents.insert(entity, CastIntent { spell, target });
            true
        }
        SimCommand::CancelCast { .. } => {
            let had_intent = store.cast_intents.remove(entity).is_some();
            match store.castings.remove(entity) {
                Some(casting) => {
                    context.events.emit(SimEvent::CastInterrupted {
                        caster: entity,
                        spell: casting.spell,
                    });
                    true
                }
                None => had_intent,
            }
        }
        SimCommand::Stop { .. } => {
            store.combat_targets.remove(entity);
            store.cast_intents.remove(entity);
            halt(store, entity);
            true
        }
        SimCommand::SetPosture { posture, .. } => {
            let Some(controller) = store.ai_controllers.get_mut(entity) else {
                return false;
            };
            match controller.role {
                AiRole::Ally { .. } => {
                    controller.role = AiRole::Ally { posture };
                    true
                }
                AiRole::Enemy => false,
            }
        }
        SimCommand::SetLeader { .. } => {
            if store.faction_of(entity) != Some(Faction::Party) {
                return false;
            }
            if let Some(previous) = context.party.leader {
                store.player_controlled.remove(previous);
            }
            store.player_controlled.insert(entity, PlayerControlled);
            store.nav_paths.remove(entity);
            context.party.leader = Some(entity);
            true
        }
    }
}

/// A player-controlled entity ordered to attack something out of reach walks
/// toward it, re-pathing once the target has drifted from the path goal.
fn run_player_pursuit(context: &mut IntentContext<'_>) {
    let store = &mut *context.store;
    let pursuers = store
        .player_controlled
        .ids()
        .into_iter()
        .filter(|id| store.combat_targets.contains(*id))
        .collect::<Vec<_>>();

    for entity in pursuers {
        let Some(CombatTarget(target)) = store.combat_targets.get(entity).copied() else {
            continue;
        };
        if !store.is_standing(entity) {
            continue;
        }
        if !store.is_standing(target) {
            store.combat_targets.remove(entity);
            continue;
        }
        let (Some(position), Some(target_position)) =
            (store.position_of(entity), store.position_of(target))
        else {
            continue;
        };
        let attack_range = store
            .combat_stats
            .get(entity)
            .map(|stats| stats.attack_range)
            .unwrap_or(0.0);

        let in_range = position.distance(target_position) <= attack_range;
        if in_range && context.map.has_line_of_sight(position, target_position) {
            halt(store, entity);
            continue;
        }

        let goal_is_current = store.nav_paths.get(entity).is_some_and(|path| {
            path.goal.distance(target_position) <= context.config.ai.repath_distance
        });
        if goal_is_current {
            continue;
        }
        let pathfinder = Pathfinder::new(context.map)
            .with_iteration_cap(context.config.navigation.path_iteration_cap);
        match pathfinder.find_path(position, target_position) {
            Some(path) => {
                store.nav_paths.insert(entity, path);
            }
            None => halt(store, entity),
        }
    }
}

/// Drops any path and zeroes velocity.
pub(crate) fn halt(store: &mut EntityStore, entity: EntityId) {
    store.nav_paths.remove(entity);
    if let Some(velocity) = store.velocities.get_mut(entity) {
        velocity.0 = Vec2::ZERO;
    }
}
