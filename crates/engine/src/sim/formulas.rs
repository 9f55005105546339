//! Pure combat math. No store access, no randomness.

pub const STRENGTH_DAMAGE_PER_POINT: f32 = 0.05;
pub const INTELLIGENCE_POWER_PER_POINT: f32 = 0.03;
pub const BASE_CRIT_CHANCE: f32 = 0.05;
pub const CRIT_CHANCE_PER_DEXTERITY: f32 = 0.005;
pub const CRIT_MULTIPLIER: f32 = 1.5;
const MIN_ATTACK_SPEED: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageRoll {
    pub base: u32,
    /// Stat bonus; 0.25 means +25%.
    pub coefficient: f32,
    pub armor: u32,
    /// Elemental resistance, clamped to [-1, 1] before use.
    pub resistance: f32,
    pub critical: bool,
}

impl DamageRoll {
    pub fn plain(base: u32, armor: u32) -> Self {
        Self {
            base,
            coefficient: 0.0,
            armor,
            resistance: 0.0,
            critical: false,
        }
    }
}

pub fn armor_multiplier(armor: u32) -> f32 {
    100.0 / (100.0 + armor as f32)
}

/// `max(1, round(base * (1 + coefficient) * 100 / (100 + armor)))`, with the
/// crit multiplier and resistance folded in before rounding.
pub fn resolve_damage(roll: DamageRoll) -> u32 {
    let mut damage =
        roll.base as f32 * (1.0 + roll.coefficient.max(0.0)) * armor_multiplier(roll.armor);
    if roll.critical {
        damage *= CRIT_MULTIPLIER;
    }
    damage *= 1.0 - roll.resistance.clamp(-1.0, 1.0);
    let rounded = damage.round();
    if !rounded.is_finite() || rounded < 1.0 {
        return 1;
    }
    rounded.min(u32::MAX as f32) as u32
}

pub fn strength_coefficient(strength: u32) -> f32 {
    strength as f32 * STRENGTH_DAMAGE_PER_POINT
}

pub fn intelligence_coefficient(intelligence: u32) -> f32 {
    intelligence as f32 * INTELLIGENCE_POWER_PER_POINT
}

pub fn crit_chance(dexterity: u32) -> f32 {
    (BASE_CRIT_CHANCE + dexterity as f32 * CRIT_CHANCE_PER_DEXTERITY).clamp(0.0, 1.0)
}

pub fn heal_amount(base: u32, intelligence: u32) -> u32 {
    (base as f32 * (1.0 + intelligence_coefficient(intelligence))).round() as u32
}

pub fn attack_cooldown_seconds(attack_speed: f32) -> f32 {
    if !attack_speed.is_finite() {
        return 1.0;
    }
    1.0 / attack_speed.max(MIN_ATTACK_SPEED)
}
