//! Hit, crit, damage and block resolution for a single swing.
//!
//! Every probability used by a `resolve_*` function comes from the same
//! private helper its `preview_*` twin calls, so displayed odds are exactly
//! the odds rolled against.

use serde::Serialize;
use tracing::debug;

use crate::Dice;
use crate::snapshot::CombatSnapshot;
use crate::stance::{Stance, effective_armor, stance_modifiers};

/// Protagonist hit chance before accuracy, stance and evasion.
pub const PROTAGONIST_BASE_HIT: f64 = 0.85;

const FLAT_VARIANCE_CUTOFF: f64 = 3.0;
const VARIANCE_LOW: f64 = 0.15;
const VARIANCE_HIGH: f64 = 0.20;
const VARIANCE_RAMP: f64 = 20.0;

/// Outcome of one swing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CombatResult {
    pub hit_landed: bool,
    pub was_crit: bool,
    pub final_damage: i32,
    pub hit_chance_shown: f64,
    pub crit_chance_shown: f64,
    pub was_blocked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingOutcome {
    Miss,
    Blocked,
    Hit,
    Crit,
}

impl CombatResult {
    fn missed(chances: Chances) -> Self {
        Self {
            hit_chance_shown: chances.hit,
            crit_chance_shown: chances.crit,
            ..Self::default()
        }
    }

    pub fn outcome(&self) -> SwingOutcome {
        if !self.hit_landed {
            SwingOutcome::Miss
        } else if self.was_blocked || self.final_damage <= 0 {
            SwingOutcome::Blocked
        } else if self.was_crit {
            SwingOutcome::Crit
        } else {
            SwingOutcome::Hit
        }
    }
}

/// Hit and crit probabilities for one side, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Chances {
    pub hit: f64,
    pub crit: f64,
}

/// Clamp into [0, 1]; NaN collapses to 0.
pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Randomize base damage: a flat ±1 for small values, a ±15–20% spread
/// (rounded up) above that.
pub fn damage_variance(base_damage: f64, dice: &mut Dice) -> f64 {
    if base_damage <= FLAT_VARIANCE_CUTOFF {
        let min = ((base_damage - 1.0).floor() as i32).max(1);
        let max = (base_damage + 1.0).ceil() as i32;
        return dice.range_i32(min, max.max(min)) as f64;
    }

    let t = clamp01((base_damage - FLAT_VARIANCE_CUTOFF) / VARIANCE_RAMP);
    let variance = VARIANCE_LOW * (1.0 - t) + VARIANCE_HIGH * t;
    let low = base_damage * (1.0 - variance);
    let high = base_damage * (1.0 + variance);
    dice.range_f64(low, high).ceil()
}

fn protagonist_chances(attacker: &CombatSnapshot, stance: Stance, defender_evasion: f64) -> Chances {
    let mods = stance_modifiers(stance);
    Chances {
        hit: clamp01(
            PROTAGONIST_BASE_HIT + mods.accuracy_bonus + attacker.hit_chance_bonus - defender_evasion,
        ),
        crit: clamp01(attacker.crit_chance + mods.crit_bonus),
    }
}

fn adversary_chances(attacker: &CombatSnapshot, base_hit_chance: f64, evasion_bonus: f64) -> Chances {
    Chances {
        hit: clamp01(base_hit_chance - evasion_bonus),
        crit: clamp01(attacker.crit_chance),
    }
}

/// Odds of the protagonist's next swing, without drawing.
pub fn preview_attacker_vs_defender(
    attacker: &CombatSnapshot,
    stance: Stance,
    defender_evasion: f64,
) -> Chances {
    protagonist_chances(attacker, stance, defender_evasion)
}

/// Odds of the adversary's next swing, without drawing.
pub fn preview_defender_vs_attacker(
    attacker: &CombatSnapshot,
    base_hit_chance: f64,
    evasion_bonus: f64,
) -> Chances {
    adversary_chances(attacker, base_hit_chance, evasion_bonus)
}

/// Protagonist swings at the adversary. A landed hit always deals at least 1.
pub fn resolve_attacker_vs_defender(
    attacker: &CombatSnapshot,
    defender: &CombatSnapshot,
    stance: Stance,
    defender_evasion: f64,
    dice: &mut Dice,
) -> CombatResult {
    let chances = protagonist_chances(attacker, stance, defender_evasion);
    if dice.unit() >= chances.hit {
        return CombatResult::missed(chances);
    }

    let mut dmg = damage_variance(attacker.base_damage, dice) * stance_modifiers(stance).damage_multiplier;
    let was_crit = dice.unit() < chances.crit;
    if was_crit {
        dmg *= attacker.crit_multiplier;
    }

    let final_damage = ((dmg - defender.armor as f64).round_ties_even() as i32).max(1);
    debug!(dmg, armor = defender.armor, final_damage, was_crit, "protagonist hit");

    CombatResult {
        hit_landed: true,
        was_crit,
        final_damage,
        hit_chance_shown: chances.hit,
        crit_chance_shown: chances.crit,
        was_blocked: false,
    }
}

/// Adversary swings at the protagonist. Armor, adjusted for the protagonist's
/// stance, may absorb the hit entirely.
pub fn resolve_defender_vs_attacker(
    attacker: &CombatSnapshot,
    defender: &CombatSnapshot,
    stance: Stance,
    base_hit_chance: f64,
    evasion_bonus: f64,
    dice: &mut Dice,
) -> CombatResult {
    let chances = adversary_chances(attacker, base_hit_chance, evasion_bonus);
    if dice.unit() >= chances.hit {
        return CombatResult::missed(chances);
    }

    let mut dmg = damage_variance(attacker.base_damage, dice);
    let was_crit = dice.unit() < chances.crit;
    if was_crit {
        dmg *= attacker.crit_multiplier;
    }

    let armor = effective_armor(stance, defender.armor);
    let mut final_damage = (dmg - armor as f64).round_ties_even() as i32;
    let was_blocked = final_damage <= 0;
    if was_blocked {
        final_damage = 0;
    }
    debug!(dmg, armor, final_damage, was_crit, was_blocked, "adversary hit");

    CombatResult {
        hit_landed: true,
        was_crit,
        final_damage,
        hit_chance_shown: chances.hit,
        crit_chance_shown: chances.crit,
        was_blocked,
    }
}
