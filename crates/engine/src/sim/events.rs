use tracing::warn;

use super::components::{DamageType, StatusKind};
use super::world::EntityId;
use crate::content::SpellDefId;

/// Hard stop for subscriber follow-up cascades within one flush.
pub const MAX_EVENTS_PER_FLUSH: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DamageDelivery {
    Melee,
    Ranged,
    Spell,
    Area,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Skill {
    Melee,
    Ranged,
    CombatMagic,
    NatureMagic,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    DamageDealt {
        source: EntityId,
        target: EntityId,
        amount: u32,
        damage_type: DamageType,
        delivery: DamageDelivery,
        critical: bool,
    },
    HealthRestored {
        source: EntityId,
        target: EntityId,
        amount: u32,
    },
    EntityDied {
        entity: EntityId,
        killer: Option<EntityId>,
    },
    EntityDowned {
        entity: EntityId,
    },
    EntityRevived {
        entity: EntityId,
    },
    SpellCast {
        caster: EntityId,
        spell: SpellDefId,
    },
    CastInterrupted {
        caster: EntityId,
        spell: SpellDefId,
    },
    ProjectileHit {
        projectile: EntityId,
        caster: EntityId,
        target: EntityId,
    },
    StatusApplied {
        entity: EntityId,
        status: StatusKind,
    },
    StatusExpired {
        entity: EntityId,
        status: StatusKind,
    },
    CombatStarted {
        entity: EntityId,
    },
    CombatEnded {
        entity: EntityId,
    },
    PartyWiped,
    LevelUp {
        entity: EntityId,
        level: u32,
    },
    SkillUp {
        entity: EntityId,
        skill: Skill,
        level: u32,
    },
    ItemPickedUp {
        entity: EntityId,
        item: String,
        quantity: u32,
    },
    GoldChanged {
        delta: i64,
        total: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEventKind {
    DamageDealt,
    HealthRestored,
    EntityDied,
    EntityDowned,
    EntityRevived,
    SpellCast,
    CastInterrupted,
    ProjectileHit,
    StatusApplied,
    StatusExpired,
    CombatStarted,
    CombatEnded,
    PartyWiped,
    LevelUp,
    SkillUp,
    ItemPickedUp,
    GoldChanged,
}

impl SimEvent {
    pub fn kind(&self) -> SimEventKind {
        match self {
            Self::DamageDealt { .. } => SimEventKind::DamageDealt,
            Self::HealthRestored { .. } => SimEventKind::HealthRestored,
            Self::EntityDied { .. } => SimEventKind::EntityDied,
            Self::EntityDowned { .. } => SimEventKind::EntityDowned,
            Self::EntityRevived { .. } => SimEventKind::EntityRevived,
            Self::SpellCast { .. } => SimEventKind::SpellCast,
            Self::CastInterrupted { .. } => SimEventKind::CastInterrupted,
            Self::ProjectileHit { .. } => SimEventKind::ProjectileHit,
            Self::StatusApplied { .. } => SimEventKind::StatusApplied,
            Self::StatusExpired { .. } => SimEventKind::StatusExpired,
            Self::CombatStarted { .. } => SimEventKind::CombatStarted,
            Self::CombatEnded { .. } => SimEventKind::CombatEnded,
            Self::PartyWiped => SimEventKind::PartyWiped,
            Self::LevelUp { .. } => SimEventKind::LevelUp,
            Self::SkillUp { .. } => SimEventKind::SkillUp,
            Self::ItemPickedUp { .. } => SimEventKind::ItemPickedUp,
            Self::GoldChanged { .. } => SimEventKind::GoldChanged,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimEventCounts {
    pub total: u32,
    pub damage_dealt: u32,
    pub health_restored: u32,
    pub entity_died: u32,
    pub entity_downed: u32,
    pub entity_revived: u32,
    pub spell_cast: u32,
    pub cast_interrupted: u32,
    pub projectile_hit: u32,
    pub status_changed: u32,
    pub combat_state_changed: u32,
    pub party_wiped: u32,
    pub progression: u32,
}

impl SimEventCounts {
    pub fn record(&mut self, kind: SimEventKind) {
        self.total = self.total.saturating_add(1);
        let slot = match kind {
            SimEventKind::DamageDealt => &mut self.damage_dealt,
            SimEventKind::HealthRestored => &mut self.health_restored,
            SimEventKind::EntityDied => &mut self.entity_died,
            SimEventKind::EntityDowned => &mut self.entity_downed,
            SimEventKind::EntityRevived => &mut self.entity_revived,
            SimEventKind::SpellCast => &mut self.spell_cast,
            SimEventKind::CastInterrupted => &mut self.cast_interrupted,
            SimEventKind::ProjectileHit => &mut self.projectile_hit,
            SimEventKind::StatusApplied | SimEventKind::StatusExpired => &mut self.status_changed,
            SimEventKind::CombatStarted | SimEventKind::CombatEnded => {
                &mut self.combat_state_changed
            }
            SimEventKind::PartyWiped => &mut self.party_wiped,
            SimEventKind::LevelUp
            | SimEventKind::SkillUp
            | SimEventKind::ItemPickedUp
            | SimEventKind::GoldChanged => &mut self.progression,
        };
        *slot = slot.saturating_add(1);
    }
}

/// Where processors and subscribers push events.
pub trait EventSink {
    fn emit(&mut self, event: SimEvent);
}

impl EventSink for Vec<SimEvent> {
    fn emit(&mut self, event: SimEvent) {
        self.push(event);
    }
}

/// Consumer of flushed events. Follow-ups pushed into `follow_ups` are
/// delivered later in the same flush, after everything already queued.
pub trait EventSubscriber {
    fn on_event(&mut self, event: &SimEvent, follow_ups: &mut dyn EventSink);
}

#[derive(Debug, Default)]
pub struct EventQueue {
    current_tick_events: Vec<SimEvent>,
    last_tick_counts: SimEventCounts,
}

impl EventSink for EventQueue {
    fn emit(&mut self, event: SimEvent) {
        self.current_tick_events.push(event);
    }
}

struct FollowUpSink<'a> {
    events: &'a mut Vec<SimEvent>,
    limit: usize,
    dropped: &'a mut usize,
}

impl EventSink for FollowUpSink<'_> {
    fn emit(&mut self, event: SimEvent) {
        if self.events.len() < self.limit {
            self.events.push(event);
        } else {
            *self.dropped += 1;
        }
    }
}

impl EventQueue {
    pub fn iter_emitted_so_far(&self) -> impl Iterator<Item = &SimEvent> {
        self.current_tick_events.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.current_tick_events.len()
    }

    /// Delivers every queued event to every subscriber in emission order, then
    /// clears the queue. Events queued before the flush are always delivered;
    /// only follow-ups count against `MAX_EVENTS_PER_FLUSH`. Returns what was
    /// delivered.
    pub fn flush(&mut self, subscribers: &mut [&mut dyn EventSubscriber]) -> Vec<SimEvent> {
        let mut counts = SimEventCounts::default();
        let limit = self
            .current_tick_events
            .len()
            .saturating_add(MAX_EVENTS_PER_FLUSH);
        let mut dropped = 0usize;
        let mut cursor = 0usize;
        while cursor < self.current_tick_events.len() {
            let event = self.current_tick_events[cursor].clone();
            counts.record(event.kind());
            for subscriber in subscribers.iter_mut() {
                let mut follow_ups = FollowUpSink {
                    events: &mut self.current_tick_events,
                    limit,
                    dropped: &mut dropped,
                };
                subscriber.on_event(&event, &mut follow_ups);
            }
            cursor += 1;
        }
        if dropped > 0 {
            warn!(
                dropped,
                cap = MAX_EVENTS_PER_FLUSH,
                "event_flush_capped"
            );
        }
        self.last_tick_counts = counts;
        std::mem::take(&mut self.current_tick_events)
    }

    pub fn last_tick_counts(&self) -> SimEventCounts {
        self.last_tick_counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::world::EntityAllocator;

    struct Recorder {
        seen: Vec<SimEventKind>,
    }

    impl EventSubscriber for Recorder {
        fn on_event(&mut self, event: &SimEvent, _follow_ups: &mut dyn EventSink) {
            self.seen.push(event.kind());
        }
    }

    struct LevelOnKill;

    impl EventSubscriber for LevelOnKill {
        fn on_event(&mut self, event: &SimEvent, follow_ups: &mut dyn EventSink) {
            if let SimEvent::EntityDied {
                killer: Some(killer),
                ..
            } = event
            {
                follow_ups.emit(SimEvent::LevelUp {
                    entity: *killer,
                    level: 2,
                });
            }
        }
    }

    #[test]
    fn flush_delivers_in_emission_order_and_clears() {
        let mut allocator = EntityAllocator::default();
        let a = allocator.allocate();
        let mut queue = EventQueue::default();
        queue.emit(SimEvent::SpellCast {
            caster: a,
            spell: SpellDefId(0),
        });
        queue.emit(SimEvent::EntityDowned { entity: a });
        queue.emit(SimEvent::PartyWiped);

        let mut recorder = Recorder { seen: Vec::new() };
        let delivered = queue.flush(&mut [&mut recorder]);
        assert_eq!(delivered.len(), 3);
        assert_eq!(
            recorder.seen,
            vec![
                SimEventKind::SpellCast,
                SimEventKind::EntityDowned,
                SimEventKind::PartyWiped
            ]
        );
        assert_eq!(queue.pending_len(), 0);
        assert_eq!(queue.last_tick_counts().total, 3);
    }

    #[test]
    fn follow_ups_reach_every_subscriber_in_same_flush() {
        let mut allocator = EntityAllocator::default();
        let hero = allocator.allocate();
        let rat = allocator.allocate();
        let mut queue = EventQueue::default();
        queue.emit(SimEvent::EntityDied {
            entity: rat,
            killer: Some(hero),
        });

        let mut leveler = LevelOnKill;
        let mut recorder = Recorder { seen: Vec::new() };
        queue.flush(&mut [&mut leveler, &mut recorder]);
        assert_eq!(
            recorder.seen,
            vec![SimEventKind::EntityDied, SimEventKind::LevelUp]
        );
        assert_eq!(queue.last_tick_counts().progression, 1);
    }

    struct EchoForever;

    impl EventSubscriber for EchoForever {
        fn on_event(&mut self, _event: &SimEvent, follow_ups: &mut dyn EventSink) {
            follow_ups.emit(SimEvent::PartyWiped);
        }
    }

    #[test]
    fn cap_bounds_follow_ups_but_never_drops_queued_events() {
        let mut allocator = EntityAllocator::default();
        let hero = allocator.allocate();
        let rat = allocator.allocate();
        let mut queue = EventQueue::default();
        for _ in 0..5000 {
            queue.emit(SimEvent::DamageDealt {
                source: hero,
                target: rat,
                amount: 1,
                damage_type: DamageType::Physical,
                delivery: DamageDelivery::Melee,
                critical: false,
            });
        }
        queue.emit(SimEvent::EntityDied {
            entity: rat,
            killer: Some(hero),
        });

        let mut echo = EchoForever;
        let mut recorder = Recorder { seen: Vec::new() };
        let delivered = queue.flush(&mut [&mut echo, &mut recorder]);

        assert_eq!(delivered.len(), 5001 + MAX_EVENTS_PER_FLUSH);
        assert_eq!(recorder.seen.len(), delivered.len());
        assert_eq!(recorder.seen[5000], SimEventKind::EntityDied);
        assert_eq!(
            recorder
                .seen
                .iter()
                .filter(|kind| **kind == SimEventKind::DamageDealt)
                .count(),
            5000
        );
        assert_eq!(queue.last_tick_counts().party_wiped, MAX_EVENTS_PER_FLUSH as u32);
        assert_eq!(queue.pending_len(), 0);
    }

    #[test]
    fn flush_without_subscribers_still_counts() {
        let mut queue = EventQueue::default();
        queue.emit(SimEvent::PartyWiped);
        queue.flush(&mut []);
        assert_eq!(queue.last_tick_counts().party_wiped, 1);
    }
}
