use std::collections::HashMap;

use crawl_engine::sim::{EntityId, EventSink, EventSubscriber, SimEvent};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CombatTally {
    pub(crate) damage_dealt: u64,
    pub(crate) damage_taken: u64,
    pub(crate) healing_done: u64,
    pub(crate) kills: u32,
    pub(crate) downs: u32,
    pub(crate) revives: u32,
    pub(crate) spells_cast: u32,
    pub(crate) casts_interrupted: u32,
    pub(crate) wipes: u32,
}

/// Human-readable trail of the fight, keyed by roster labels.
#[derive(Debug, Default)]
pub(crate) struct CombatLog {
    labels: HashMap<EntityId, String>,
    party: HashMap<EntityId, bool>,
    tally: CombatTally,
}

impl CombatLog {
    pub(crate) fn register(&mut self, id: EntityId, label: impl Into<String>, is_party: bool) {
        self.labels.insert(id, label.into());
        self.party.insert(id, is_party);
    }

    pub(crate) fn tally(&self) -> CombatTally {
        self.tally
    }

    fn label(&self, id: EntityId) -> &str {
        self.labels.get(&id).map(String::as_str).unwrap_or("effect")
    }

    fn is_party(&self, id: EntityId) -> bool {
        self.party.get(&id).copied().unwrap_or(false)
    }
}

impl EventSubscriber for CombatLog {
    fn on_event(&mut self, event: &SimEvent, _follow_ups: &mut dyn EventSink) {
        match event {
            SimEvent::DamageDealt {
                source,
                target,
                amount,
                damage_type,
                delivery,
                critical,
            } => {
                if self.is_party(*target) {
                    self.tally.damage_taken += u64::from(*amount);
                } else if self.is_party(*source) {
                    self.tally.damage_dealt += u64::from(*amount);
                }
                debug!(
                    source = self.label(*source),
                    target = self.label(*target),
                    amount,
                    damage_type = ?damage_type,
                    delivery = ?delivery,
                    critical,
                    "damage_dealt"
                );
            }
            SimEvent::HealthRestored {
                source,
                target,
                amount,
            } => {
                if self.is_party(*source) {
                    self.tally.healing_done += u64::from(*amount);
                }
                debug!(
                    source = self.label(*source),
                    target = self.label(*target),
                    amount,
                    "health_restored"
                );
            }
            SimEvent::EntityDied { entity, killer } => {
                if killer.is_some_and(|killer| self.is_party(killer)) {
                    self.tally.kills += 1;
                }
                info!(
                    entity = self.label(*entity),
                    killer = killer.map(|killer| self.label(killer)).unwrap_or("none"),
                    "entity_died"
                );
            }
            SimEvent::EntityDowned { entity } => {
                self.tally.downs += 1;
                info!(entity = self.label(*entity), "entity_downed");
            }
            SimEvent::EntityRevived { entity } => {
                self.tally.revives += 1;
                info!(entity = self.label(*entity), "entity_revived");
            }
            SimEvent::SpellCast { caster, spell } => {
                if self.is_party(*caster) {
                    self.tally.spells_cast += 1;
                }
                debug!(caster = self.label(*caster), spell = spell.0, "spell_cast");
            }
            SimEvent::CastInterrupted { caster, spell } => {
                self.tally.casts_interrupted += 1;
                debug!(caster = self.label(*caster), spell = spell.0, "cast_interrupted");
            }
            SimEvent::StatusApplied { entity, status } => {
                debug!(entity = self.label(*entity), status = ?status, "status_applied");
            }
            SimEvent::PartyWiped => {
                self.tally.wipes += 1;
                info!("party_wiped");
            }
            SimEvent::LevelUp { entity, level } => {
                info!(entity = self.label(*entity), level, "party_level_up");
            }
            SimEvent::SkillUp {
                entity,
                skill,
                level,
            } => {
                info!(entity = self.label(*entity), skill = ?skill, level, "party_skill_up");
            }
            SimEvent::GoldChanged { delta, total } => {
                info!(delta, total, "gold_changed");
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use crawl_engine::sim::{DamageDelivery, DamageType, EntityAllocator};

    use super::*;

    #[test]
    fn tallies_split_party_and_hostile_sides() {
        let mut allocator = EntityAllocator::default();
        let hero = allocator.allocate();
        let rat = allocator.allocate();
        let mut log = CombatLog::default();
        log.register(hero, "Hero", true);
        log.register(rat, "Rat", false);
        let mut sink = Vec::new();

        let events = [
            SimEvent::DamageDealt {
                source: hero,
                target: rat,
                amount: 12,
                damage_type: DamageType::Physical,
                delivery: DamageDelivery::Melee,
                critical: false,
            },
            SimEvent::DamageDealt {
                source: rat,
                target: hero,
                amount: 4,
                damage_type: DamageType::Physical,
                delivery: DamageDelivery::Melee,
                critical: true,
            },
            SimEvent::HealthRestored {
                source: hero,
                target: hero,
                amount: 4,
            },
            SimEvent::EntityDied {
                entity: rat,
                killer: Some(hero),
            },
            SimEvent::EntityDowned { entity: hero },
            SimEvent::PartyWiped,
        ];
        for event in &events {
            log.on_event(event, &mut sink);
        }

        let tally = log.tally();
        assert_eq!(tally.damage_dealt, 12);
        assert_eq!(tally.damage_taken, 4);
        assert_eq!(tally.healing_done, 4);
        assert_eq!(tally.kills, 1);
        assert_eq!(tally.downs, 1);
        assert_eq!(tally.wipes, 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn unknown_sources_fall_back_to_effect_label() {
        let mut allocator = EntityAllocator::default();
        let stray = allocator.allocate();
        let log = CombatLog::default();
        assert_eq!(log.label(stray), "effect");
        assert!(!log.is_party(stray));
    }
}
