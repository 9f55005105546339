use serde::Deserialize;

use super::nav::DEFAULT_PATH_ITERATION_CAP;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AiTuning {
    pub enemy_decision_interval: f32,
    pub ally_decision_interval: f32,
    pub default_aggro_range: f32,
    pub default_leash_range: f32,
    pub home_arrival_distance: f32,
    pub attack_range_hysteresis: f32,
    pub repath_distance: f32,
    pub ally_follow_distance: f32,
    pub ally_stop_distance: f32,
    pub ally_engage_range: f32,
    pub defensive_guard_radius: f32,
    pub flee_health_fraction: f32,
    pub flee_recover_fraction: f32,
    pub ally_heal_threshold: f32,
    pub ally_heal_range: f32,
    pub ally_autocast_cooldown_multiplier: f32,
}

impl Default for AiTuning {
    fn default() -> Self {
        Self {
            enemy_decision_interval: 0.2,
            ally_decision_interval: 0.1,
            default_aggro_range: 6.0,
            default_leash_range: 12.0,
            home_arrival_distance: 1.0,
            attack_range_hysteresis: 1.2,
            repath_distance: 1.0,
            ally_follow_distance: 2.0,
            ally_stop_distance: 1.0,
            ally_engage_range: 6.0,
            defensive_guard_radius: 3.0,
            flee_health_fraction: 0.25,
            flee_recover_fraction: 0.5,
            ally_heal_threshold: 0.5,
            ally_heal_range: 8.0,
            ally_autocast_cooldown_multiplier: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CombatTuning {
    pub combat_timeout: f32,
    pub party_wipe_cooldown: f32,
    pub revive_safe_distance: f32,
    pub revive_health_fraction: f32,
    pub corpse_linger_seconds: f32,
}

impl Default for CombatTuning {
    fn default() -> Self {
        Self {
            combat_timeout: 5.0,
            party_wipe_cooldown: 2.0,
            revive_safe_distance: 10.0,
            revive_health_fraction: 0.25,
            corpse_linger_seconds: 15.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MagicTuning {
    pub projectile_hit_radius: f32,
    pub ground_arrival_radius: f32,
    pub projectile_lifetime: f32,
    pub cast_flash_seconds: f32,
    pub hit_flash_seconds: f32,
    pub impact_flash_seconds: f32,
    pub in_combat_mana_regen_factor: f32,
}

impl Default for MagicTuning {
    fn default() -> Self {
        Self {
            projectile_hit_radius: 0.6,
            ground_arrival_radius: 0.5,
            projectile_lifetime: 5.0,
            cast_flash_seconds: 0.4,
            hit_flash_seconds: 0.3,
            impact_flash_seconds: 0.4,
            in_combat_mana_regen_factor: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NavigationTuning {
    pub path_iteration_cap: usize,
    pub waypoint_arrival_distance: f32,
}

impl Default for NavigationTuning {
    fn default() -> Self {
        Self {
            path_iteration_cap: DEFAULT_PATH_ITERATION_CAP,
            waypoint_arrival_distance: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SanityTuning {
    pub search_radius_tiles: i32,
}

impl Default for SanityTuning {
    fn default() -> Self {
        Self {
            search_radius_tiles: 14,
        }
    }
}

/// Every tunable the pipeline reads. Missing sections and fields fall back to
/// the defaults above.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    pub ai: AiTuning,
    pub combat: CombatTuning,
    pub magic: MagicTuning,
    pub navigation: NavigationTuning,
    pub sanity: SanityTuning,
}
