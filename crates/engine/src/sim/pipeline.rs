use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::ai::{run_ai, AiContext, AiStats};
use super::combat::{run_combat, run_corpse_cleanup, run_party_watch, CombatContext};
use super::config::SimConfig;
use super::events::{EventQueue, EventSubscriber, SimEvent, SimEventCounts};
use super::intent::{run_intent, CommandApplyStats, CommandQueue, IntentContext, SimCommand};
use super::magic::{run_magic, MagicContext};
use super::map::DungeonMap;
use super::movement::{run_movement, MovementStats};
use super::party::{party_members, PartyState};
use super::sanity::{run_position_sanity, PositionRepair, RepairAction};
use super::spawn::{spawn_creature, SpawnError};
use super::steering::run_steering;
use super::world::{EntityId, EntityStore, Vec2};
use crate::content::{CreatureDefId, DefDatabase};

/// Longest step one tick may simulate.
pub const MAX_TICK_SECONDS: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimSystemId {
    Intent,
    Ai,
    Steering,
    Movement,
    Combat,
    Magic,
    Cleanup,
    PositionSanity,
}

impl SimSystemId {
    pub fn name(self) -> &'static str {
        match self {
            Self::Intent => "Intent",
            Self::Ai => "AI",
            Self::Steering => "Steering",
            Self::Movement => "Movement",
            Self::Combat => "Combat",
            Self::Magic => "Magic",
            Self::Cleanup => "Cleanup",
            Self::PositionSanity => "PositionSanity",
        }
    }
}

pub const SIM_SYSTEM_ORDER: [SimSystemId; 8] = [
    SimSystemId::Intent,
    SimSystemId::Ai,
    SimSystemId::Steering,
    SimSystemId::Movement,
    SimSystemId::Combat,
    SimSystemId::Magic,
    SimSystemId::Cleanup,
    SimSystemId::PositionSanity,
];

pub const SIM_SYSTEM_ORDER_TEXT: &str =
    "Intent>AI>Steering>Movement>Combat>Magic>Cleanup>PositionSanity";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// Everything delivered to subscribers this tick, follow-ups included.
    pub events: Vec<SimEvent>,
    pub counts: SimEventCounts,
    pub entity_count: usize,
    pub commands: CommandApplyStats,
    pub ai: AiStats,
    pub movement: MovementStats,
    pub attacks_landed: u32,
    pub despawned: usize,
    pub repairs: Vec<PositionRepair>,
}

/// Owns the world and runs one fixed-order pipeline pass per `tick`.
pub struct Simulation {
    config: SimConfig,
    map: Box<dyn DungeonMap>,
    defs: DefDatabase,
    store: EntityStore,
    commands: CommandQueue,
    events: EventQueue,
    rng: ChaCha8Rng,
    party: PartyState,
    tick: u64,
    last_tick_order: Vec<SimSystemId>,
}

impl Simulation {
    pub fn new(config: SimConfig, map: Box<dyn DungeonMap>, defs: DefDatabase, seed: u64) -> Self {
        Self {
            config,
            map,
            defs,
            store: EntityStore::default(),
            commands: CommandQueue::default(),
            events: EventQueue::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            party: PartyState::default(),
            tick: 0,
            last_tick_order: Vec::with_capacity(SIM_SYSTEM_ORDER.len()),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn map(&self) -> &dyn DungeonMap {
        self.map.as_ref()
    }

    pub fn defs(&self) -> &DefDatabase {
        &self.defs
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Direct store access for setup and tooling. Never used mid-tick.
    pub fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    pub fn party(&self) -> &PartyState {
        &self.party
    }

    pub fn party_members(&self) -> Vec<EntityId> {
        party_members(&self.store)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn last_tick_order(&self) -> &[SimSystemId] {
        &self.last_tick_order
    }

    pub fn last_command_stats(&self) -> CommandApplyStats {
        self.commands.last_tick_apply_stats()
    }

    pub fn enqueue(&mut self, command: SimCommand) {
        self.commands.enqueue(command);
    }

    pub fn set_party_spawn(&mut self, point: Vec2) {
        self.party.spawn_point = point;
    }

    pub fn spawn_creature(
        &mut self,
        def_id: CreatureDefId,
        position: Vec2,
    ) -> Result<EntityId, SpawnError> {
        spawn_creature(
            &mut self.store,
            &self.defs,
            self.map.as_ref(),
            &self.config.ai,
            def_id,
            position,
        )
    }

    /// Runs every system once in `SIM_SYSTEM_ORDER`, then flushes the
    /// tick's events to `subscribers`.
    pub fn tick(
        &mut self,
        dt_seconds: f32,
        subscribers: &mut [&mut dyn EventSubscriber],
    ) -> TickReport {
        debug_assert!(
            dt_seconds.is_finite() && dt_seconds >= 0.0,
            "tick dt must be finite and non-negative, got {dt_seconds}"
        );
        let dt_seconds = if dt_seconds.is_finite() {
            dt_seconds.clamp(0.0, MAX_TICK_SECONDS)
        } else {
            0.0
        };
        self.tick = self.tick.saturating_add(1);
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        self.last_tick_order.clear();
        for system_id in SIM_SYSTEM_ORDER {
            self.last_tick_order.push(system_id);
            self.run_system(system_id, dt_seconds, &mut report);
        }

        report.events = self.events.flush(subscribers);
        report.counts = self.events.last_tick_counts();
        report.entity_count = self.store.len();
        if !report.repairs.is_empty() {
            debug!(
                tick = self.tick,
                repairs = report.repairs.len(),
                "tick_position_repairs"
            );
        }
        report
    }

    fn run_system(&mut self, system_id: SimSystemId, dt_seconds: f32, report: &mut TickReport) {
        match system_id {
            SimSystemId::Intent => {
                let commands = self.commands.drain_current_tick();
                let mut context = IntentContext {
                    map: self.map.as_ref(),
                    config: &self.config,
                    store: &mut self.store,
                    party: &mut self.party,
                    events: &mut self.events,
                };
                let stats = run_intent(commands, &mut context);
                self.commands.set_last_tick_apply_stats(stats);
                report.commands = stats;
            }
            SimSystemId::Ai => {
                let mut context = AiContext {
                    map: self.map.as_ref(),
                    defs: &self.defs,
                    tuning: &self.config.ai,
                    navigation: &self.config.navigation,
                    party: &self.party,
                    store: &mut self.store,
                };
                report.ai = run_ai(&mut context, dt_seconds);
            }
            SimSystemId::Steering => {
                run_steering(&mut self.store, &self.config.navigation, dt_seconds);
            }
            SimSystemId::Movement => {
                report.movement = run_movement(&mut self.store, self.map.as_ref(), dt_seconds);
            }
            SimSystemId::Combat => {
                let mut context = CombatContext {
                    map: self.map.as_ref(),
                    tuning: &self.config.combat,
                    store: &mut self.store,
                    events: &mut self.events,
                    rng: &mut self.rng,
                };
                report.attacks_landed = run_combat(&mut context, dt_seconds);
            }
            SimSystemId::Magic => {
                let mut context = MagicContext {
                    map: self.map.as_ref(),
                    defs: &self.defs,
                    tuning: &self.config.magic,
                    store: &mut self.store,
                    events: &mut self.events,
                };
                run_magic(&mut context, dt_seconds);
            }
            SimSystemId::Cleanup => {
                run_corpse_cleanup(&mut self.store, &self.config.combat, dt_seconds);
                run_party_watch(
                    &mut self.store,
                    &mut self.events,
                    &mut self.party,
                    &self.config.combat,
                    dt_seconds,
                );
                report.despawned += self.store.apply_pending();
            }
            SimSystemId::PositionSanity => {
                report.repairs = run_position_sanity(
                    &mut self.store,
                    self.map.as_ref(),
                    &self.party,
                    &self.config.sanity,
                );
                if report
                    .repairs
                    .iter()
                    .any(|repair| repair.action == RepairAction::Despawned)
                {
                    report.despawned += self.store.apply_pending();
                }
            }
        }
    }
}
