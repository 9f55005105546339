use std::collections::HashMap;

use crawl_engine::content::{DefDatabase, SpellDefId, SpellKind};
use crawl_engine::sim::{DamageDelivery, EntityId, EventSink, EventSubscriber, SimEvent, Skill};
use tracing::{debug, info};

/// Share of party gold lost when the whole party goes down.
pub(crate) const DEATH_GOLD_PENALTY_PERCENT: u64 = 10;
pub(crate) const GOLD_ITEM: &str = "gold";

const XP_MELEE_HIT: u64 = 10;
const XP_RANGED_HIT: u64 = 10;
const XP_SPELL_HIT: u64 = 15;
const XP_HEAL_CAST: u64 = 12;
const XP_BUFF_CAST: u64 = 8;
const XP_KILL_BONUS: u64 = 25;
const MAX_SKILL_LEVEL: u32 = 99;

/// XP needed to go from `level` to `level + 1`.
pub(crate) fn xp_for_next_skill_level(level: u32) -> u64 {
    (100.0 * f64::from(level).powf(1.5)).floor() as u64
}

pub(crate) fn character_level(skill_levels: &[u32; 4]) -> u32 {
    (skill_levels.iter().sum::<u32>() / 2).max(1)
}

fn skill_slot(skill: Skill) -> usize {
    match skill {
        Skill::Melee => 0,
        Skill::Ranged => 1,
        Skill::CombatMagic => 2,
        Skill::NatureMagic => 3,
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MemberProgress {
    pub(crate) label: String,
    pub(crate) skill_levels: [u32; 4],
    pub(crate) skill_xp: [u64; 4],
    pub(crate) level: u32,
    last_skill: Skill,
    last_spell_school: Skill,
}

impl MemberProgress {
    fn new(label: String) -> Self {
        let skill_levels = [1; 4];
        Self {
            label,
            level: character_level(&skill_levels),
            skill_levels,
            skill_xp: [0; 4],
            last_skill: Skill::Melee,
            last_spell_school: Skill::CombatMagic,
        }
    }

    pub(crate) fn skill_level(&self, skill: Skill) -> u32 {
        self.skill_levels[skill_slot(skill)]
    }
}

#[derive(Debug, Clone, Copy)]
struct Bounty {
    xp_value: u32,
    gold_drop: u32,
}

#[derive(Debug, Clone, Copy)]
struct SpellInfo {
    school: Skill,
    kind: SpellKind,
    heals: bool,
}

/// Skill XP, character levels and party gold, driven purely by sim events.
#[derive(Debug, Default)]
pub(crate) struct PartyLedger {
    members: HashMap<EntityId, MemberProgress>,
    member_order: Vec<EntityId>,
    bounties: HashMap<EntityId, Bounty>,
    spells: HashMap<SpellDefId, SpellInfo>,
    gold: u64,
}

impl PartyLedger {
    pub(crate) fn new(defs: &DefDatabase) -> Self {
        let spells = defs
            .spell_defs()
            .iter()
            .map(|def| {
                (
                    def.id,
                    SpellInfo {
                        school: def.school,
                        kind: def.kind,
                        heals: def.is_heal(),
                    },
                )
            })
            .collect();
        Self {
            spells,
            ..Self::default()
        }
    }

    pub(crate) fn register_member(&mut self, id: EntityId, label: impl Into<String>) {
        if self.members.insert(id, MemberProgress::new(label.into())).is_none() {
            self.member_order.push(id);
        }
    }

    pub(crate) fn register_bounty(&mut self, id: EntityId, xp_value: u32, gold_drop: u32) {
        self.bounties.insert(id, Bounty { xp_value, gold_drop });
    }

    pub(crate) fn gold(&self) -> u64 {
        self.gold
    }

    #[cfg(test)]
    pub(crate) fn member(&self, id: EntityId) -> Option<&MemberProgress> {
        self.members.get(&id)
    }

    pub(crate) fn members(&self) -> impl Iterator<Item = (EntityId, &MemberProgress)> {
        self.member_order
            .iter()
            .filter_map(|id| self.members.get(id).map(|progress| (*id, progress)))
    }

    fn award(&mut self, entity: EntityId, skill: Skill, amount: u64, out: &mut dyn EventSink) {
        let Some(member) = self.members.get_mut(&entity) else {
            return;
        };
        let slot = skill_slot(skill);
        member.skill_xp[slot] = member.skill_xp[slot].saturating_add(amount);

        while member.skill_levels[slot] < MAX_SKILL_LEVEL {
            let needed = xp_for_next_skill_level(member.skill_levels[slot]);
            if member.skill_xp[slot] < needed {
                break;
            }
            member.skill_xp[slot] -= needed;
            member.skill_levels[slot] += 1;
            debug!(
                member = %member.label,
                skill = ?skill,
                level = member.skill_levels[slot],
                "skill_up"
            );
            out.emit(SimEvent::SkillUp {
                entity,
                skill,
                level: member.skill_levels[slot],
            });

            let level = character_level(&member.skill_levels);
            if level > member.level {
                member.level = level;
                info!(member = %member.label, level, "level_up");
                out.emit(SimEvent::LevelUp { entity, level });
            }
        }
    }

    fn on_damage(
        &mut self,
        source: EntityId,
        target: EntityId,
        delivery: DamageDelivery,
        out: &mut dyn EventSink,
    ) {
        if self.members.contains_key(&target) {
            return;
        }
        let Some(member) = self.members.get_mut(&source) else {
            return;
        };
        let (skill, amount) = match delivery {
            DamageDelivery::Melee => (Skill::Melee, XP_MELEE_HIT),
            DamageDelivery::Ranged => (Skill::Ranged, XP_RANGED_HIT),
            DamageDelivery::Spell | DamageDelivery::Area => {
                (member.last_spell_school, XP_SPELL_HIT)
            }
            DamageDelivery::Status => return,
        };
        member.last_skill = skill;
        self.award(source, skill, amount, out);
    }

    fn on_spell_cast(&mut self, caster: EntityId, spell: SpellDefId, out: &mut dyn EventSink) {
        let Some(info) = self.spells.get(&spell).copied() else {
            return;
        };
        let Some(member) = self.members.get_mut(&caster) else {
            return;
        };
        member.last_spell_school = info.school;
        let amount = if info.heals {
            XP_HEAL_CAST
        } else if info.kind == SpellKind::Buff {
            XP_BUFF_CAST
        } else {
            return;
        };
        member.last_skill = info.school;
        self.award(caster, info.school, amount, out);
    }

    fn on_death(&mut self, entity: EntityId, killer: Option<EntityId>, out: &mut dyn EventSink) {
        let Some(bounty) = self.bounties.remove(&entity) else {
            return;
        };
        let Some(killer) = killer else {
            return;
        };
        let Some(skill) = self.members.get(&killer).map(|member| member.last_skill) else {
            return;
        };
        self.award(killer, skill, u64::from(bounty.xp_value) + XP_KILL_BONUS, out);
        if bounty.gold_drop > 0 {
            out.emit(SimEvent::ItemPickedUp {
                entity: killer,
                item: GOLD_ITEM.to_string(),
                quantity: bounty.gold_drop,
            });
        }
    }

    fn on_pickup(&mut self, item: &str, quantity: u32, out: &mut dyn EventSink) {
        if item != GOLD_ITEM || quantity == 0 {
            return;
        }
        self.gold = self.gold.saturating_add(u64::from(quantity));
        out.emit(SimEvent::GoldChanged {
            delta: i64::from(quantity),
            total: self.gold,
        });
    }

    fn on_party_wiped(&mut self, out: &mut dyn EventSink) {
        let penalty = self.gold * DEATH_GOLD_PENALTY_PERCENT / 100;
        info!(gold = self.gold, penalty, "party_wipe_penalty");
        if penalty == 0 {
            return;
        }
        self.gold -= penalty;
        out.emit(SimEvent::GoldChanged {
            delta: -(penalty as i64),
            total: self.gold,
        });
    }
}

impl EventSubscriber for PartyLedger {
    fn on_event(&mut self, event: &SimEvent, follow_ups: &mut dyn EventSink) {
        match event {
            SimEvent::DamageDealt {
                source,
                target,
                delivery,
                ..
            } => self.on_damage(*source, *target, *delivery, follow_ups),
            SimEvent::SpellCast { caster, spell } => {
                self.on_spell_cast(*caster, *spell, follow_ups)
            }
            SimEvent::EntityDied { entity, killer } => self.on_death(*entity, *killer, follow_ups),
            SimEvent::ItemPickedUp { item, quantity, .. } => {
                self.on_pickup(item, *quantity, follow_ups)
            }
            SimEvent::PartyWiped => self.on_party_wiped(follow_ups),
            _ => {}
        }
    }
}
