use serde::{Deserialize, Serialize};
use tracing::debug;

/// A health pool. `hp` stays within `[0, max_hp]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub hp: i32,
    pub max_hp: i32,
}

impl Health {
    pub fn new(max_hp: i32) -> Self {
        let max_hp = max_hp.max(1);
        Self { hp: max_hp, max_hp }
    }

    pub fn with_current(hp: i32, max_hp: i32) -> Self {
        let max_hp = max_hp.max(1);
        Self {
            hp: hp.clamp(0, max_hp),
            max_hp,
        }
    }

    pub fn is_down(&self) -> bool {
        self.hp <= 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageApplied {
    /// HP actually removed (never more than the pool held).
    pub applied: i32,
    /// True if this call took the pool from above 0 to 0.
    pub dropped: bool,
}

/// Apply damage, clamped at 0.
pub fn apply_damage(name: &str, health: &mut Health, dmg: i32) -> DamageApplied {
    let before = health.hp;
    let applied = dmg.clamp(0, before.max(0));
    health.hp = before - applied;
    debug!("[DMG][{}] {} → {} (−{})", name, before, health.hp, applied);
    DamageApplied {
        applied,
        dropped: before > 0 && health.hp == 0,
    }
}

/// Heal up to max; returns the HP actually restored.
pub fn heal(name: &str, health: &mut Health, amount: i32) -> i32 {
    if amount <= 0 {
        return 0;
    }
    let before = health.hp;
    health.hp = health.hp.saturating_add(amount).min(health.max_hp);
    debug!("[HEAL][{}] +{} HP ({} → {})", name, amount, before, health.hp);
    health.hp - before
}

/// Bring a fallen pool back to half (rounded up, at least 1).
pub fn restore_half(name: &str, health: &mut Health) {
    let half = health.max_hp / 2 + health.max_hp % 2;
    health.hp = half.clamp(1, health.max_hp);
    debug!("[STATE][{}] restored to {}/{}", name, health.hp, health.max_hp);
}
