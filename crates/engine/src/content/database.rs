use std::collections::HashMap;

use crate::sim::{
    AttackKind, Attributes, DamageType, Faction, Resistances, Skill, StatusEffectSpec,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpellDefId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CreatureDefId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpellKind {
    Projectile,
    Instant,
    Area,
    Buff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpellTargeting {
    Enemy,
    Ally,
    Ground,
    Caster,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpellDef {
    pub id: SpellDefId,
    pub def_name: String,
    pub label: String,
    pub kind: SpellKind,
    pub targeting: SpellTargeting,
    pub school: Skill,
    pub mana_cost: u32,
    pub cooldown: f32,
    pub global_cooldown: f32,
    pub cast_time: f32,
    pub range: f32,
    pub damage: u32,
    pub damage_type: DamageType,
    pub heal: u32,
    pub projectile_speed: f32,
    pub homing: bool,
    pub radius: f32,
    pub duration: f32,
    pub tick_interval: f32,
    pub tick_damage: u32,
    pub status: Option<StatusEffectSpec>,
}

impl SpellDef {
    pub fn is_heal(&self) -> bool {
        self.heal > 0 && matches!(self.targeting, SpellTargeting::Ally | SpellTargeting::Caster)
    }

    pub fn is_offensive(&self) -> bool {
        matches!(self.targeting, SpellTargeting::Enemy | SpellTargeting::Ground)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatureAi {
    None,
    Enemy,
    Ally,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatureDef {
    pub id: CreatureDefId,
    pub def_name: String,
    pub label: String,
    pub faction: Faction,
    pub health: u32,
    pub mana: u32,
    pub move_speed: f32,
    pub damage: u32,
    pub armor: u32,
    pub attack_speed: f32,
    pub attack_range: f32,
    pub attack_kind: AttackKind,
    pub attributes: Option<Attributes>,
    pub resistances: Resistances,
    pub ai: CreatureAi,
    pub aggro_range: Option<f32>,
    pub leash_range: Option<f32>,
    pub spells: Vec<SpellDefId>,
    pub mana_regen: f32,
    pub health_regen: f32,
    pub xp_value: u32,
    pub gold_drop: u32,
}

#[derive(Debug, Default, Clone)]
pub struct DefDatabase {
    spell_defs: Vec<SpellDef>,
    spell_ids_by_name: HashMap<String, SpellDefId>,
    creature_defs: Vec<CreatureDef>,
    creature_ids_by_name: HashMap<String, CreatureDefId>,
}

impl DefDatabase {
    /// Ids follow slice order; callers pass defs sorted by defName.
    pub fn from_defs(mut spell_defs: Vec<SpellDef>, mut creature_defs: Vec<CreatureDef>) -> Self {
        let mut spell_ids_by_name = HashMap::with_capacity(spell_defs.len());
        for (idx, def) in spell_defs.iter_mut().enumerate() {
            let id = SpellDefId(idx as u32);
            def.id = id;
            spell_ids_by_name.insert(def.def_name.clone(), id);
        }
        let mut creature_ids_by_name = HashMap::with_capacity(creature_defs.len());
        for (idx, def) in creature_defs.iter_mut().enumerate() {
            let id = CreatureDefId(idx as u32);
            def.id = id;
            creature_ids_by_name.insert(def.def_name.clone(), id);
        }
        Self {
            spell_defs,
            spell_ids_by_name,
            creature_defs,
            creature_ids_by_name,
        }
    }

    pub fn spell_def_id_by_name(&self, name: &str) -> Option<SpellDefId> {
        self.spell_ids_by_name.get(name).copied()
    }

    pub fn spell_def(&self, id: SpellDefId) -> Option<&SpellDef> {
        self.spell_defs.get(id.0 as usize)
    }

    pub fn spell_defs(&self) -> &[SpellDef] {
        &self.spell_defs
    }

    pub fn creature_def_id_by_name(&self, name: &str) -> Option<CreatureDefId> {
        self.creature_ids_by_name.get(name).copied()
    }

    pub fn creature_def(&self, id: CreatureDefId) -> Option<&CreatureDef> {
        self.creature_defs.get(id.0 as usize)
    }

    pub fn creature_defs(&self) -> &[CreatureDef] {
        &self.creature_defs
    }
}
