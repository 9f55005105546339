use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use roxmltree::{Document, Node};

use crate::sim::{
    AttackKind, Attributes, DamageType, Faction, Resistances, Skill, StatusEffectSpec, StatusKind,
};
use crate::AppPaths;

use super::database::{
    CreatureAi, CreatureDef, CreatureDefId, DefDatabase, SpellDef, SpellDefId, SpellKind,
    SpellTargeting,
};
use super::discovery::discover_mod_sources;
use super::types::{ContentDiscoveryError, ContentRequest};

const DEFAULT_MANA_COST: u32 = 10;
const DEFAULT_SPELL_COOLDOWN: f32 = 1.0;
const DEFAULT_GLOBAL_COOLDOWN: f32 = 0.5;
const DEFAULT_SPELL_RANGE: f32 = 8.0;
const DEFAULT_PROJECTILE_SPEED: f32 = 12.0;
const DEFAULT_AREA_RADIUS: f32 = 3.0;
const DEFAULT_TICK_INTERVAL: f32 = 0.5;
const DEFAULT_MOVE_SPEED: f32 = 5.0;
const DEFAULT_CREATURE_DAMAGE: u32 = 5;
const DEFAULT_ATTACK_RANGE: f32 = 1.5;
const DEFAULT_MANA_REGEN: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    Discovery,
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDefInMod,
    UnknownReference,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub mod_id: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (mod={}, file={}, line={}, column={})",
                self.code,
                self.message,
                self.mod_id,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (mod={}, file={})",
                self.code,
                self.message,
                self.mod_id,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ContentCompileError {}

#[derive(Debug, Clone)]
struct SpellReference {
    def_name: String,
    mod_id: String,
    file_path: PathBuf,
    location: SourceLocation,
}

#[derive(Debug, Clone)]
struct PendingCreatureDef {
    def: CreatureDef,
    spell_refs: Vec<SpellReference>,
}

enum PendingDef {
    Spell(SpellDef),
    Creature(PendingCreatureDef),
}

impl PendingDef {
    fn def_name(&self) -> &str {
        match self {
            Self::Spell(def) => &def.def_name,
            Self::Creature(pending) => &pending.def.def_name,
        }
    }
}

pub fn compile_def_database(
    app_paths: &AppPaths,
    request: &ContentRequest,
) -> Result<DefDatabase, ContentCompileError> {
    let sources = discover_mod_sources(app_paths, request)
        .map_err(|error| map_discovery_error(error, &app_paths.root))?;

    let mut spells = BTreeMap::<String, SpellDef>::new();
    let mut creatures = BTreeMap::<String, PendingCreatureDef>::new();

    for source in sources {
        let xml_files = collect_xml_files_sorted(&source.source_dir)
            .map_err(|error| read_error(&source.mod_id, error.path, error.source))?;
        let mut seen_in_mod = HashSet::<String>::new();

        for xml_file in xml_files {
            let raw = fs::read_to_string(&xml_file)
                .map_err(|source_err| read_error(&source.mod_id, xml_file.clone(), source_err))?;
            let defs = parse_defs_document(&source.mod_id, &xml_file, &raw)?;
            for def in defs {
                if !seen_in_mod.insert(def.def_name().to_string()) {
                    return Err(ContentCompileError {
                        code: ContentErrorCode::DuplicateDefInMod,
                        message: format!(
                            "duplicate def '{}' in mod '{}'; each mod may define a defName only once",
                            def.def_name(),
                            source.mod_id
                        ),
                        mod_id: source.mod_id.clone(),
                        file_path: xml_file.clone(),
                        location: None,
                    });
                }
                // Cross-mod duplicates override (last mod wins).
                match def {
                    PendingDef::Spell(spell) => {
                        spells.insert(spell.def_name.clone(), spell);
                    }
                    PendingDef::Creature(creature) => {
                        creatures.insert(creature.def.def_name.clone(), creature);
                    }
                }
            }
        }
    }

    let spell_ids = spells
        .keys()
        .enumerate()
        .map(|(idx, name)| (name.clone(), SpellDefId(idx as u32)))
        .collect::<BTreeMap<_, _>>();

    let mut creature_defs = Vec::with_capacity(creatures.len());
    for pending in creatures.into_values() {
        let mut def = pending.def;
        for reference in pending.spell_refs {
            let Some(id) = spell_ids.get(&reference.def_name) else {
                return Err(ContentCompileError {
                    code: ContentErrorCode::UnknownReference,
                    message: format!(
                        "creature '{}' references unknown spell '{}'",
                        def.def_name, reference.def_name
                    ),
                    mod_id: reference.mod_id,
                    file_path: reference.file_path,
                    location: Some(reference.location),
                });
            };
            def.spells.push(*id);
        }
        creature_defs.push(def);
    }

    Ok(DefDatabase::from_defs(
        spells.into_values().collect(),
        creature_defs,
    ))
}

struct DefParser<'a, 'input> {
    mod_id: &'a str,
    file_path: &'a Path,
    doc: &'a Document<'input>,
}

impl<'a, 'input> DefParser<'a, 'input> {
    fn error_at(
        &self,
        code: ContentErrorCode,
        message: String,
        node: Node<'_, '_>,
    ) -> ContentCompileError {
        error_at_node(code, message, self.mod_id, self.file_path, self.doc, node)
    }

    fn location_of(&self, node: Node<'_, '_>) -> SourceLocation {
        let pos = self.doc.text_pos_at(node.range().start);
        SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }
    }

    fn required_text(
        &self,
        node: Node<'_, '_>,
        field_name: &str,
    ) -> Result<String, ContentCompileError> {
        let value = node.text().map(str::trim).unwrap_or_default().to_string();
        if value.is_empty() {
            return Err(self.error_at(
                ContentErrorCode::MissingField,
                format!("field <{}> must not be empty", field_name),
                node,
            ));
        }
        Ok(value)
    }

    fn number<T: FromStr>(
        &self,
        node: Node<'_, '_>,
        field_name: &str,
    ) -> Result<T, ContentCompileError> {
        let value = self.required_text(node, field_name)?;
        value.parse::<T>().map_err(|_| {
            self.error_at(
                ContentErrorCode::InvalidValue,
                format!("{} '{}' is not a valid number", field_name, value),
                node,
            )
        })
    }

    fn non_negative(
        &self,
        node: Node<'_, '_>,
        field_name: &str,
    ) -> Result<f32, ContentCompileError> {
        let parsed = self.number::<f32>(node, field_name)?;
        if !parsed.is_finite() || parsed < 0.0 {
            return Err(self.error_at(
                ContentErrorCode::InvalidValue,
                format!("{} must be finite and >= 0", field_name),
                node,
            ));
        }
        Ok(parsed)
    }

    fn resistance(
        &self,
        node: Node<'_, '_>,
        field_name: &str,
    ) -> Result<f32, ContentCompileError> {
        let parsed = self.number::<f32>(node, field_name)?;
        if !(-1.0..=1.0).contains(&parsed) {
            return Err(self.error_at(
                ContentErrorCode::InvalidValue,
                format!("{} must be within [-1, 1]", field_name),
                node,
            ));
        }
        Ok(parsed)
    }

    fn flag(&self, node: Node<'_, '_>, field_name: &str) -> Result<bool, ContentCompileError> {
        match self.required_text(node, field_name)?.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(self.error_at(
                ContentErrorCode::InvalidValue,
                format!("{} '{}' must be true or false", field_name, other),
                node,
            )),
        }
    }

    fn choice<T: Copy>(
        &self,
        node: Node<'_, '_>,
        field_name: &str,
        allowed: &[(&str, T)],
    ) -> Result<T, ContentCompileError> {
        let value = self.required_text(node, field_name)?;
        allowed
            .iter()
            .find(|(name, _)| *name == value)
            .map(|(_, parsed)| *parsed)
            .ok_or_else(|| {
                let names = allowed.iter().map(|(name, _)| *name).collect::<Vec<_>>();
                self.error_at(
                    ContentErrorCode::InvalidValue,
                    format!(
                        "invalid {} '{}'; allowed values: {}",
                        field_name,
                        value,
                        names.join(", ")
                    ),
                    node,
                )
            })
    }

    /// Element children, rejecting a repeated tag.
    fn unique_fields<'n, 'i>(
        &self,
        node: Node<'n, 'i>,
        def_type: &str,
    ) -> Result<Vec<Node<'n, 'i>>, ContentCompileError> {
        let mut seen_fields = HashSet::<&str>::new();
        let mut fields = Vec::new();
        for field in node.children().filter(|child| child.is_element()) {
            let field_name = field.tag_name().name();
            if !seen_fields.insert(field_name) {
                return Err(self.error_at(
                    ContentErrorCode::DuplicateField,
                    format!("duplicate field <{}> in <{}>", field_name, def_type),
                    field,
                ));
            }
            fields.push(field);
        }
        Ok(fields)
    }

    fn unknown_field(&self, field: Node<'_, '_>, def_type: &str) -> ContentCompileError {
        self.error_at(
            ContentErrorCode::UnknownField,
            format!("unknown field <{}> in <{}>", field.tag_name().name(), def_type),
            field,
        )
    }

    fn missing_field(
        &self,
        node: Node<'_, '_>,
        field_name: &str,
        def_type: &str,
    ) -> ContentCompileError {
        self.error_at(
            ContentErrorCode::MissingField,
            format!("missing required field <{}> in <{}>", field_name, def_type),
            node,
        )
    }
}

fn parse_defs_document(
    mod_id: &str,
    file_path: &Path,
    raw: &str,
) -> Result<Vec<PendingDef>, ContentCompileError> {
    let doc = Document::parse(raw).map_err(|error| ContentCompileError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        mod_id: mod_id.to_string(),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;
    let parser = DefParser {
        mod_id,
        file_path,
        doc: &doc,
    };

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(parser.error_at(
            ContentErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            root,
        ));
    }

    let mut defs = Vec::new();
    for child in root.children().filter(|node| node.is_element()) {
        match child.tag_name().name() {
            "SpellDef" => defs.push(PendingDef::Spell(parse_spell_def(&parser, child)?)),
            "CreatureDef" => defs.push(PendingDef::Creature(parse_creature_def(&parser, child)?)),
            other => {
                return Err(parser.error_at(
                    ContentErrorCode::UnknownDefType,
                    format!(
                        "unsupported def type <{}>; expected <SpellDef> or <CreatureDef>",
                        other
                    ),
                    child,
                ))
            }
        }
    }

    Ok(defs)
}

const DAMAGE_TYPES: [(&str, DamageType); 6] = [
    ("Physical", DamageType::Physical),
    ("Fire", DamageType::Fire),
    ("Ice", DamageType::Ice),
    ("Lightning", DamageType::Lightning),
    ("Poison", DamageType::Poison),
    ("Arcane", DamageType::Arcane),
];

fn parse_spell_def(
    parser: &DefParser<'_, '_>,
    node: Node<'_, '_>,
) -> Result<SpellDef, ContentCompileError> {
    const DEF_TYPE: &str = "SpellDef";
    let mut def_name = None;
    let mut label = None;
    let mut kind = None;
    let mut targeting = None;
    let mut school = None;
    let mut mana_cost = DEFAULT_MANA_COST;
    let mut cooldown = DEFAULT_SPELL_COOLDOWN;
    let mut global_cooldown = DEFAULT_GLOBAL_COOLDOWN;
    let mut cast_time = 0.0;
    let mut range = DEFAULT_SPELL_RANGE;
    let mut damage = 0u32;
    let mut damage_type = DamageType::Arcane;
    let mut heal = 0u32;
    let mut projectile_speed = DEFAULT_PROJECTILE_SPEED;
    let mut homing = false;
    let mut radius = None;
    let mut duration = 0.0;
    let mut tick_interval = DEFAULT_TICK_INTERVAL;
    let mut tick_damage = None;
    let mut status = None;

    for field in parser.unique_fields(node, DEF_TYPE)? {
        match field.tag_name().name() {
            "defName" => def_name = Some(parser.required_text(field, "defName")?),
            "label" => label = Some(parser.required_text(field, "label")?),
            "kind" => {
                kind = Some(parser.choice(
                    field,
                    "kind",
                    &[
                        ("Projectile", SpellKind::Projectile),
                        ("Instant", SpellKind::Instant),
                        ("Area", SpellKind::Area),
                        ("Buff", SpellKind::Buff),
                    ],
                )?)
            }
            "targeting" => {
                targeting = Some(parser.choice(
                    field,
                    "targeting",
                    &[
                        ("Enemy", SpellTargeting::Enemy),
                        ("Ally", SpellTargeting::Ally),
                        ("Ground", SpellTargeting::Ground),
                        ("Caster", SpellTargeting::Caster),
                    ],
                )?)
            }
            "school" => {
                school = Some(parser.choice(
                    field,
                    "school",
                    &[
                        ("CombatMagic", Skill::CombatMagic),
                        ("NatureMagic", Skill::NatureMagic),
                    ],
                )?)
            }
            "manaCost" => mana_cost = parser.number(field, "manaCost")?,
            "cooldown" => cooldown = parser.non_negative(field, "cooldown")?,
            "globalCooldown" => global_cooldown = parser.non_negative(field, "globalCooldown")?,
            "castTime" => cast_time = parser.non_negative(field, "castTime")?,
            "range" => range = parser.non_negative(field, "range")?,
            "damage" => damage = parser.number(field, "damage")?,
            "damageType" => damage_type = parser.choice(field, "damageType", &DAMAGE_TYPES)?,
            "heal" => heal = parser.number(field, "heal")?,
            "projectileSpeed" => projectile_speed = parser.non_negative(field, "projectileSpeed")?,
            "homing" => homing = parser.flag(field, "homing")?,
            "radius" => radius = Some(parser.non_negative(field, "radius")?),
            "duration" => duration = parser.non_negative(field, "duration")?,
            "tickInterval" => {
                let parsed = parser.non_negative(field, "tickInterval")?;
                if parsed <= 0.0 {
                    return Err(parser.error_at(
                        ContentErrorCode::InvalidValue,
                        "tickInterval must be > 0".to_string(),
                        field,
                    ));
                }
                tick_interval = parsed;
            }
            "tickDamage" => tick_damage = Some(parser.number(field, "tickDamage")?),
            "status" => status = Some(parse_status_spec(parser, field)?),
            _ => return Err(parser.unknown_field(field, DEF_TYPE)),
        }
    }

    let def_name = def_name.ok_or_else(|| parser.missing_field(node, "defName", DEF_TYPE))?;
    let label = label.ok_or_else(|| parser.missing_field(node, "label", DEF_TYPE))?;
    let kind = kind.ok_or_else(|| parser.missing_field(node, "kind", DEF_TYPE))?;
    let targeting = targeting.ok_or_else(|| parser.missing_field(node, "targeting", DEF_TYPE))?;
    if kind == SpellKind::Projectile && targeting == SpellTargeting::Caster {
        return Err(parser.error_at(
            ContentErrorCode::InvalidValue,
            format!("projectile spell '{}' cannot target its caster", def_name),
            node,
        ));
    }

    let radius = radius.unwrap_or(if kind == SpellKind::Area {
        DEFAULT_AREA_RADIUS
    } else {
        0.0
    });
    let school = school.unwrap_or(if heal > 0 {
        Skill::NatureMagic
    } else {
        Skill::CombatMagic
    });

    Ok(SpellDef {
        id: SpellDefId(0),
        def_name,
        label,
        kind,
        targeting,
        school,
        mana_cost,
        cooldown,
        global_cooldown,
        cast_time,
        range,
        damage,
        damage_type,
        heal,
        projectile_speed,
        homing,
        radius,
        duration,
        tick_interval,
        tick_damage: tick_damage.unwrap_or(damage / 2),
        status,
    })
}

fn parse_status_spec(
    parser: &DefParser<'_, '_>,
    node: Node<'_, '_>,
) -> Result<StatusEffectSpec, ContentCompileError> {
    const DEF_TYPE: &str = "status";
    let mut kind = None;
    let mut duration = None;
    let mut magnitude = 0.0;

    for field in parser.unique_fields(node, DEF_TYPE)? {
        match field.tag_name().name() {
            "kind" => {
                kind = Some(parser.choice(
                    field,
                    "kind",
                    &[
                        ("Slow", StatusKind::Slow),
                        ("Root", StatusKind::Root),
                        ("Stun", StatusKind::Stun),
                        ("Burn", StatusKind::Burn),
                        ("Poison", StatusKind::Poison),
                        ("Regen", StatusKind::Regen),
                    ],
                )?)
            }
            "duration" => duration = Some(parser.non_negative(field, "duration")?),
            "magnitude" => magnitude = parser.non_negative(field, "magnitude")?,
            _ => return Err(parser.unknown_field(field, DEF_TYPE)),
        }
    }

    Ok(StatusEffectSpec {
        kind: kind.ok_or_else(|| parser.missing_field(node, "kind", DEF_TYPE))?,
        duration: duration.ok_or_else(|| parser.missing_field(node, "duration", DEF_TYPE))?,
        magnitude,
    })
}

fn parse_creature_def(
    parser: &DefParser<'_, '_>,
    node: Node<'_, '_>,
) -> Result<PendingCreatureDef, ContentCompileError> {
    const DEF_TYPE: &str = "CreatureDef";
    let mut def_name = None;
    let mut label = None;
    let mut faction = None;
    let mut health = None;
    let mut mana = 0u32;
    let mut move_speed = DEFAULT_MOVE_SPEED;
    let mut damage = DEFAULT_CREATURE_DAMAGE;
    let mut armor = 0u32;
    let mut attack_speed = 1.0f32;
    let mut attack_range = DEFAULT_ATTACK_RANGE;
    let mut attack_kind = AttackKind::Melee;
    let mut attributes: Option<Attributes> = None;
    let mut resistances = Resistances::default();
    let mut ai = CreatureAi::None;
    let mut aggro_range = None;
    let mut leash_range = None;
    let mut spell_refs = Vec::new();
    let mut mana_regen = None;
    let mut health_regen = 0.0;
    let mut xp_value = 0u32;
    let mut gold_drop = 0u32;

    for field in parser.unique_fields(node, DEF_TYPE)? {
        match field.tag_name().name() {
            "defName" => def_name = Some(parser.required_text(field, "defName")?),
            "label" => label = Some(parser.required_text(field, "label")?),
            "faction" => {
                faction = Some(parser.choice(
                    field,
                    "faction",
                    &[("Party", Faction::Party), ("Hostile", Faction::Hostile)],
                )?)
            }
            "health" => {
                let parsed: u32 = parser.number(field, "health")?;
                if parsed == 0 {
                    return Err(parser.error_at(
                        ContentErrorCode::InvalidValue,
                        "health must be > 0".to_string(),
                        field,
                    ));
                }
                health = Some(parsed);
            }
            "mana" => mana = parser.number(field, "mana")?,
            "moveSpeed" => move_speed = parser.non_negative(field, "moveSpeed")?,
            "damage" => damage = parser.number(field, "damage")?,
            "armor" => armor = parser.number(field, "armor")?,
            "attackSpeed" => {
                let parsed = parser.non_negative(field, "attackSpeed")?;
                if parsed <= 0.0 {
                    return Err(parser.error_at(
                        ContentErrorCode::InvalidValue,
                        "attackSpeed must be > 0".to_string(),
                        field,
                    ));
                }
                attack_speed = parsed;
            }
            "attackRange" => attack_range = parser.non_negative(field, "attackRange")?,
            "attackKind" => {
                attack_kind = parser.choice(
                    field,
                    "attackKind",
                    &[("Melee", AttackKind::Melee), ("Ranged", AttackKind::Ranged)],
                )?
            }
            "strength" => {
                let value = parser.number(field, "strength")?;
                attributes.get_or_insert_with(Attributes::default).strength = value;
            }
            "dexterity" => {
                let value = parser.number(field, "dexterity")?;
                attributes.get_or_insert_with(Attributes::default).dexterity = value;
            }
            "intelligence" => {
                let value = parser.number(field, "intelligence")?;
                attributes.get_or_insert_with(Attributes::default).intelligence = value;
            }
            "fireResist" => resistances.fire = parser.resistance(field, "fireResist")?,
            "iceResist" => resistances.ice = parser.resistance(field, "iceResist")?,
            "lightningResist" => {
                resistances.lightning = parser.resistance(field, "lightningResist")?
            }
            "poisonResist" => resistances.poison = parser.resistance(field, "poisonResist")?,
            "ai" => {
                ai = parser.choice(
                    field,
                    "ai",
                    &[
                        ("None", CreatureAi::None),
                        ("Enemy", CreatureAi::Enemy),
                        ("Ally", CreatureAi::Ally),
                    ],
                )?
            }
            "aggroRange" => aggro_range = Some(parser.non_negative(field, "aggroRange")?),
            "leashRange" => leash_range = Some(parser.non_negative(field, "leashRange")?),
            "spells" => {
                for item in field.children().filter(|child| child.is_element()) {
                    if item.tag_name().name() != "li" {
                        return Err(parser.error_at(
                            ContentErrorCode::UnknownField,
                            format!(
                                "<spells> entries must be <li>, found <{}>",
                                item.tag_name().name()
                            ),
                            item,
                        ));
                    }
                    spell_refs.push(SpellReference {
                        def_name: parser.required_text(item, "li")?,
                        mod_id: parser.mod_id.to_string(),
                        file_path: parser.file_path.to_path_buf(),
                        location: parser.location_of(item),
                    });
                }
            }
            "manaRegen" => mana_regen = Some(parser.non_negative(field, "manaRegen")?),
            "healthRegen" => health_regen = parser.non_negative(field, "healthRegen")?,
            "xpValue" => xp_value = parser.number(field, "xpValue")?,
            "goldDrop" => gold_drop = parser.number(field, "goldDrop")?,
            _ => return Err(parser.unknown_field(field, DEF_TYPE)),
        }
    }

    let def_name = def_name.ok_or_else(|| parser.missing_field(node, "defName", DEF_TYPE))?;
    let label = label.ok_or_else(|| parser.missing_field(node, "label", DEF_TYPE))?;
    let faction = faction.ok_or_else(|| parser.missing_field(node, "faction", DEF_TYPE))?;
    let health = health.ok_or_else(|| parser.missing_field(node, "health", DEF_TYPE))?;
    let mana_regen = mana_regen.unwrap_or(if mana > 0 { DEFAULT_MANA_REGEN } else { 0.0 });

    Ok(PendingCreatureDef {
        def: CreatureDef {
            id: CreatureDefId(0),
            def_name,
            label,
            faction,
            health,
            mana,
            move_speed,
            damage,
            armor,
            attack_speed,
            attack_range,
            attack_kind,
            attributes,
            resistances,
            ai,
            aggro_range,
            leash_range,
            spells: Vec::new(),
            mana_regen,
            health_regen,
            xp_value,
            gold_drop,
        },
        spell_refs,
    })
}

fn error_at_node(
    code: ContentErrorCode,
    message: String,
    mod_id: &str,
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> ContentCompileError {
    let pos = doc.text_pos_at(node.range().start);
    ContentCompileError {
        code,
        message,
        mod_id: mod_id.to_string(),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }),
    }
}

struct ReadError {
    path: PathBuf,
    source: std::io::Error,
}

fn collect_xml_files_sorted(root: &Path) -> Result<Vec<PathBuf>, ReadError> {
    let mut files = Vec::<PathBuf>::new();
    collect_recursive(root, &mut files)?;
    files.sort_by_key(|path| normalize_rel_path(path.strip_prefix(root).unwrap_or(path)));
    Ok(files)
}

fn collect_recursive(current: &Path, files: &mut Vec<PathBuf>) -> Result<(), ReadError> {
    let entries = fs::read_dir(current).map_err(|source| ReadError {
        path: current.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ReadError {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        {
            files.push(path);
        }
    }
    Ok(())
}

fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_error(mod_id: &str, path: PathBuf, source: std::io::Error) -> ContentCompileError {
    ContentCompileError {
        code: ContentErrorCode::ReadFile,
        message: format!("failed to read XML file: {source}"),
        mod_id: mod_id.to_string(),
        file_path: path,
        location: None,
    }
}

fn map_discovery_error(error: ContentDiscoveryError, root: &Path) -> ContentCompileError {
    match error {
        ContentDiscoveryError::EnabledModMissing {
            mod_id,
            expected_dir,
        } => ContentCompileError {
            code: ContentErrorCode::Discovery,
            message: format!(
                "enabled mod '{}' not found at {}; check enabled mod list",
                mod_id,
                expected_dir.display()
            ),
            mod_id,
            file_path: expected_dir,
            location: None,
        },
        other => ContentCompileError {
            code: ContentErrorCode::Discovery,
            message: other.to_string(),
            mod_id: "<discovery>".to_string(),
            file_path: root.to_path_buf(),
            location: None,
        },
    }
}
