//! Per-encounter combat snapshots and the persistent records they are built from.
//!
//! A snapshot is never mutated: the scheduler rebuilds both sides at encounter
//! start and on every stance change, so previews always reflect current stats.

use serde::{Deserialize, Serialize};

use crate::life::Health;

/// Crit multiplier used when the authored value would not amplify damage.
pub const CRIT_MULTIPLIER_FLOOR: f64 = 1.5;
/// Scale applied to an adversary's authored hit chance when stored as a bonus.
pub const ADVERSARY_HIT_SCALE: f64 = 0.02;

const BASE_HP: i32 = 20;
const HP_PER_FORTITUDE: i32 = 10;
const DAMAGE_PER_STRENGTH: f64 = 1.0;
const ARMOR_PER_DEFENCE: f64 = 1.0;
const HIT_CHANCE_PER_PRECISION: f64 = 0.02;
const CRIT_PER_PRECISION_STEP: f64 = 0.01;
const PRECISION_PER_CRIT_STEP: i32 = 5;
const EVASION_PER_FORTITUDE: f64 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CombatSnapshot {
    pub base_damage: f64,
    /// Accuracy bonus for the protagonist; a rescaled authored hit chance for
    /// adversaries.
    pub hit_chance_bonus: f64,
    pub crit_chance: f64,
    pub crit_multiplier: f64,
    pub armor: i32,
}

/// The protagonist's persistent attributes and equipped-gear totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtagonistStats {
    pub name: String,
    pub strength: i32,
    pub defence: i32,
    pub fortitude: i32,
    pub precision: i32,
    pub weapon_damage: i32,
    pub block_power: i32,
    /// Gear crit chance as a fraction (0.05 = 5%).
    pub crit_chance: f64,
    pub crit_multiplier: f64,
    /// Seconds between swings.
    pub attack_speed: f64,
    /// Current HP; `None` means full health.
    pub current_hp: Option<i32>,
}

impl Default for ProtagonistStats {
    fn default() -> Self {
        Self {
            name: "Hero".to_string(),
            strength: 1,
            defence: 1,
            fortitude: 1,
            precision: 1,
            weapon_damage: 0,
            block_power: 0,
            crit_chance: 0.0,
            crit_multiplier: 0.0,
            attack_speed: 2.0,
            current_hp: None,
        }
    }
}

impl ProtagonistStats {
    pub fn strength_bonus_damage(&self) -> f64 {
        self.strength as f64 * DAMAGE_PER_STRENGTH
    }

    pub fn armor(&self) -> i32 {
        let from_defence = (self.defence as f64 * ARMOR_PER_DEFENCE).round_ties_even() as i32;
        from_defence.saturating_add(self.block_power)
    }

    pub fn hit_chance_bonus(&self) -> f64 {
        self.precision as f64 * HIT_CHANCE_PER_PRECISION
    }

    /// Gear crit plus one point per five precision levels.
    pub fn crit_chance_final(&self) -> f64 {
        let steps = self.precision.div_euclid(PRECISION_PER_CRIT_STEP);
        self.crit_chance + steps as f64 * CRIT_PER_PRECISION_STEP
    }

    pub fn max_hp(&self) -> i32 {
        BASE_HP
            .saturating_add(self.fortitude.saturating_mul(HP_PER_FORTITUDE))
            .max(1)
    }

    /// How much fortitude lowers an adversary's chance to land a hit.
    pub fn evasion_bonus(&self) -> f64 {
        self.fortitude as f64 * EVASION_PER_FORTITUDE
    }

    pub fn starting_health(&self) -> Health {
        let max = self.max_hp();
        Health::with_current(self.current_hp.unwrap_or(max), max)
    }
}

/// Authored adversary data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdversaryRecord {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Reward table id; empty for adversaries that drop nothing.
    #[serde(default)]
    pub loot_table: String,
    #[serde(default)]
    pub level: i32,
    pub max_hp: i32,
    pub damage: i32,
    pub attack_speed: f64,
    #[serde(default)]
    pub block: i32,
    /// Raw chance to land a hit (0.9 = 90%).
    pub hit_chance: f64,
    #[serde(default)]
    pub evasion: f64,
    #[serde(default)]
    pub crit_chance: f64,
    #[serde(default)]
    pub crit_multiplier: f64,
}

impl AdversaryRecord {
    pub fn name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }

    pub fn starting_health(&self) -> Health {
        Health::new(self.max_hp.max(1))
    }
}

fn floor_crit_multiplier(raw: f64) -> f64 {
    if raw <= 1.0 { CRIT_MULTIPLIER_FLOOR } else { raw }
}

pub fn build_protagonist_snapshot(stats: &ProtagonistStats) -> CombatSnapshot {
    CombatSnapshot {
        base_damage: (stats.weapon_damage as f64 + stats.strength_bonus_damage()).max(0.0),
        hit_chance_bonus: stats.hit_chance_bonus(),
        crit_chance: stats.crit_chance_final(),
        crit_multiplier: floor_crit_multiplier(stats.crit_multiplier),
        armor: stats.armor().max(0),
    }
}

pub fn build_adversary_snapshot(record: &AdversaryRecord) -> CombatSnapshot {
    CombatSnapshot {
        base_damage: record.damage.max(1) as f64,
        hit_chance_bonus: record.hit_chance * ADVERSARY_HIT_SCALE,
        crit_chance: record.crit_chance,
        crit_multiplier: floor_crit_multiplier(record.crit_multiplier),
        armor: record.block.max(0),
    }
}
