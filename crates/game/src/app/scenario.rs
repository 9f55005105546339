use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use crawl_engine::content::{CreatureDefId, DefDatabase};
use crawl_engine::sim::{
    AllyPosture, CastTarget, EntityId, Faction, SimCommand, SimConfig, Simulation, SpawnError,
    TickReport, TileCoord, Tilemap, TilemapError, Vec2,
};
use crawl_engine::{LoopControl, TickHooks};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

const PARTY_SPAWN_GLYPH: char = '@';

#[derive(Debug, Error)]
pub(crate) enum ScenarioError {
    #[error("failed to read scenario '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scenario '{}' at {field}: {source}", path.display())]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("scenario map is invalid: {0}")]
    Map(#[source] TilemapError),
    #[error("validation failed at {field}: {message}")]
    Invalid { field: String, message: String },
    #[error("failed to spawn {field}: {source}")]
    Spawn {
        field: String,
        #[source]
        source: SpawnError,
    },
}

impl ScenarioError {
    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScenarioFile {
    pub(crate) seed: u64,
    pub(crate) run_ticks: u64,
    pub(crate) map: Vec<String>,
    pub(crate) party: Vec<SpawnSpec>,
    #[serde(default)]
    pub(crate) enemies: Vec<SpawnSpec>,
    #[serde(default)]
    pub(crate) timeline: Vec<TimedOrder>,
    #[serde(default)]
    pub(crate) config: SimConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SpawnSpec {
    pub(crate) def: String,
    /// Party members without a tile take the next `@` marker.
    #[serde(default)]
    pub(crate) tile: Option<[i32; 2]>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TimedOrder {
    pub(crate) tick: u64,
    pub(crate) order: Order,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ActorRef {
    Party(usize),
    Enemy(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum TargetSpec {
    #[default]
    Auto,
    Actor(ActorRef),
    Point([f32; 2]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum PostureSpec {
    Follow,
    Aggressive,
    Defensive,
    Passive,
}

impl From<PostureSpec> for AllyPosture {
    fn from(value: PostureSpec) -> Self {
        match value {
            PostureSpec::Follow => AllyPosture::Follow,
            PostureSpec::Aggressive => AllyPosture::Aggressive,
            PostureSpec::Defensive => AllyPosture::Defensive,
            PostureSpec::Passive => AllyPosture::Passive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum Order {
    MoveTo {
        actor: ActorRef,
        tile: [i32; 2],
    },
    Attack {
        actor: ActorRef,
        target: ActorRef,
    },
    Cast {
        actor: ActorRef,
        spell: String,
        #[serde(default)]
        target: TargetSpec,
    },
    CancelCast {
        actor: ActorRef,
    },
    Stop {
        actor: ActorRef,
    },
    SetPosture {
        actor: ActorRef,
        posture: PostureSpec,
    },
    SetLeader {
        actor: ActorRef,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Party,
    Enemy,
}

#[derive(Debug, Clone)]
pub(crate) struct RosterEntry {
    pub(crate) id: EntityId,
    pub(crate) def_id: CreatureDefId,
    pub(crate) label: String,
    pub(crate) side: Side,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Roster {
    pub(crate) party: Vec<RosterEntry>,
    pub(crate) enemies: Vec<RosterEntry>,
}

impl Roster {
    fn resolve(&self, actor: ActorRef) -> Option<EntityId> {
        match actor {
            ActorRef::Party(index) => self.party.get(index).map(|entry| entry.id),
            ActorRef::Enemy(index) => self.enemies.get(index).map(|entry| entry.id),
        }
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &RosterEntry> {
        self.party.iter().chain(self.enemies.iter())
    }
}

/// Scripted orders keyed by the tick they apply on.
#[derive(Debug, Default)]
pub(crate) struct ScenarioTimeline {
    pending: VecDeque<(u64, SimCommand)>,
    issued: usize,
}

impl ScenarioTimeline {
    pub(crate) fn new(mut orders: Vec<(u64, SimCommand)>) -> Self {
        orders.sort_by_key(|(tick, _)| *tick);
        Self {
            pending: orders.into(),
            issued: 0,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub(crate) fn issued(&self) -> usize {
        self.issued
    }
}

impl TickHooks for ScenarioTimeline {
    fn before_tick(&mut self, simulation: &mut Simulation) {
        let upcoming = simulation.tick_count().saturating_add(1);
        while let Some((tick, command)) = self.pending.front().copied() {
            if tick > upcoming {
                break;
            }
            self.pending.pop_front();
            self.issued += 1;
            debug!(
                tick = upcoming,
                entity = %command.entity(),
                kind = ?command.kind(),
                "scenario_order_issued"
            );
            simulation.enqueue(command);
        }
    }

    fn after_tick(&mut self, simulation: &Simulation, report: &TickReport) -> LoopControl {
        if self.pending.is_empty() && standing_hostiles(simulation) == 0 {
            info!(tick = report.tick, "scenario_cleared");
            return LoopControl::Stop;
        }
        LoopControl::Continue
    }
}

pub(crate) fn standing_hostiles(simulation: &Simulation) -> usize {
    let store = simulation.store();
    store
        .factions
        .iter()
        .filter(|(id, faction)| **faction == Faction::Hostile && store.is_standing(*id))
        .count()
}

pub(crate) struct ScenarioRun {
    pub(crate) simulation: Simulation,
    pub(crate) roster: Roster,
    pub(crate) timeline: ScenarioTimeline,
    pub(crate) run_ticks: u64,
}

pub(crate) fn load_scenario_file(path: &Path) -> Result<ScenarioFile, ScenarioError> {
    let raw = fs::read_to_string(path).map_err(|source| ScenarioError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_scenario_json(&raw).map_err(|(field, source)| ScenarioError::Parse {
        path: path.to_path_buf(),
        field,
        source,
    })
}

fn parse_scenario_json(raw: &str) -> Result<ScenarioFile, (String, serde_json::Error)> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, ScenarioFile>(&mut deserializer).map_err(|error| {
        let path = error.path().to_string();
        let field = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        (field, error.into_inner())
    })
}

/// Spawns the roster, resolves the timeline and hands back a ready
/// simulation. The first party member leads from tick 1.
pub(crate) fn build_run(file: ScenarioFile, defs: DefDatabase) -> Result<ScenarioRun, ScenarioError> {
    if file.run_ticks == 0 {
        return Err(ScenarioError::invalid("run_ticks", "expected > 0, got 0"));
    }
    if file.party.is_empty() {
        return Err(ScenarioError::invalid("party", "at least one member is required"));
    }

    let map = Tilemap::from_rows(&file.map).map_err(ScenarioError::Map)?;
    let mut markers = Tilemap::glyph_positions(&file.map, PARTY_SPAWN_GLYPH).into_iter();
    let mut simulation = Simulation::new(file.config, Box::new(map), defs, file.seed);

    let mut roster = Roster::default();
    for (index, spec) in file.party.iter().enumerate() {
        let field = format!("party[{index}]");
        let tile = match spec.tile {
            Some([x, y]) => TileCoord::new(x, y),
            None => markers.next().ok_or_else(|| {
                ScenarioError::invalid(
                    format!("{field}.tile"),
                    "no tile given and no unused '@' marker left",
                )
            })?,
        };
        if index == 0 {
            simulation.set_party_spawn(tile.center());
        }
        let entry = spawn_entry(&mut simulation, spec, &field, tile, Side::Party)?;
        roster.party.push(entry);
    }
    for (index, spec) in file.enemies.iter().enumerate() {
        let field = format!("enemies[{index}]");
        let Some([x, y]) = spec.tile else {
            return Err(ScenarioError::invalid(
                format!("{field}.tile"),
                "enemies need an explicit tile",
            ));
        };
        let entry = spawn_entry(&mut simulation, spec, &field, TileCoord::new(x, y), Side::Enemy)?;
        roster.enemies.push(entry);
    }

    let mut orders = Vec::with_capacity(file.timeline.len() + 1);
    orders.push((
        1,
        SimCommand::SetLeader {
            entity: roster.party[0].id,
        },
    ));
    for (index, timed) in file.timeline.iter().enumerate() {
        let field = format!("timeline[{index}]");
        if timed.tick == 0 {
            return Err(ScenarioError::invalid(
                format!("{field}.tick"),
                "ticks start at 1",
            ));
        }
        let command = resolve_order(&simulation, &roster, &timed.order, &field)?;
        orders.push((timed.tick, command));
    }

    info!(
        party = roster.party.len(),
        enemies = roster.enemies.len(),
        orders = orders.len(),
        seed = file.seed,
        run_ticks = file.run_ticks,
        "scenario_built"
    );

    Ok(ScenarioRun {
        simulation,
        roster,
        timeline: ScenarioTimeline::new(orders),
        run_ticks: file.run_ticks,
    })
}

fn spawn_entry(
    simulation: &mut Simulation,
    spec: &SpawnSpec,
    field: &str,
    tile: TileCoord,
    side: Side,
) -> Result<RosterEntry, ScenarioError> {
    let def_id = simulation
        .defs()
        .creature_def_id_by_name(&spec.def)
        .ok_or_else(|| {
            ScenarioError::invalid(
                format!("{field}.def"),
                format!("unknown creature def '{}'", spec.def),
            )
        })?;
    let (label, faction) = simulation
        .defs()
        .creature_def(def_id)
        .map(|def| (def.label.clone(), def.faction))
        .ok_or_else(|| ScenarioError::invalid(format!("{field}.def"), "def id did not resolve"))?;
    let expected = match side {
        Side::Party => Faction::Party,
        Side::Enemy => Faction::Hostile,
    };
    if faction != expected {
        return Err(ScenarioError::invalid(
            format!("{field}.def"),
            format!("expected a {expected:?} creature, got {faction:?}"),
        ));
    }

    let id = simulation
        .spawn_creature(def_id, tile.center())
        .map_err(|source| ScenarioError::Spawn {
            field: field.to_string(),
            source,
        })?;
    Ok(RosterEntry {
        id,
        def_id,
        label,
        side,
    })
}

fn resolve_order(
    simulation: &Simulation,
    roster: &Roster,
    order: &Order,
    field: &str,
) -> Result<SimCommand, ScenarioError> {
    let actor = |actor: ActorRef, name: &str| {
        roster.resolve(actor).ok_or_else(|| {
            ScenarioError::invalid(
                format!("{field}.order.{name}"),
                format!("no roster entry for {actor:?}"),
            )
        })
    };

    let command = match order {
        Order::MoveTo { actor: who, tile } => SimCommand::MoveTo {
            entity: actor(*who, "actor")?,
            point: TileCoord::new(tile[0], tile[1]).center(),
        },
        Order::Attack { actor: who, target } => SimCommand::Attack {
            entity: actor(*who, "actor")?,
            target: actor(*target, "target")?,
        },
        Order::Cast {
            actor: who,
            spell,
            target,
        } => {
            let spell_id = simulation.defs().spell_def_id_by_name(spell).ok_or_else(|| {
                ScenarioError::invalid(
                    format!("{field}.order.spell"),
                    format!("unknown spell def '{spell}'"),
                )
            })?;
            let target = match target {
                TargetSpec::Auto => CastTarget::Auto,
                TargetSpec::Actor(target) => CastTarget::Entity(actor(*target, "target")?),
                TargetSpec::Point([x, y]) => CastTarget::Point(Vec2::new(*x, *y)),
            };
            SimCommand::Cast {
                entity: actor(*who, "actor")?,
                spell: spell_id,
                target,
            }
        }
        Order::CancelCast { actor: who } => SimCommand::CancelCast {
            entity: actor(*who, "actor")?,
        },
        Order::Stop { actor: who } => SimCommand::Stop {
            entity: actor(*who, "actor")?,
        },
        Order::SetPosture { actor: who, posture } => SimCommand::SetPosture {
            entity: actor(*who, "actor")?,
            posture: (*posture).into(),
        },
        Order::SetLeader { actor: who } => SimCommand::SetLeader {
            entity: actor(*who, "actor")?,
        },
    };
    Ok(command)
}
