use crate::outcome::clamp01;

/// Countdown to a combatant's next swing.
///
/// Re-arming adds the cooldown to whatever is left, overshoot included, so a
/// long frame does not lose swings and the average rate stays `1 / cooldown`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingTimer {
    cooldown: f64,
    remaining: f64,
}

impl SwingTimer {
    pub fn new(attack_speed: f64, min_cooldown: f64) -> Self {
        let min_cooldown = if min_cooldown > 0.0 { min_cooldown } else { 0.1 };
        let cooldown = if attack_speed.is_finite() {
            attack_speed.max(min_cooldown)
        } else {
            min_cooldown
        };
        Self {
            cooldown,
            remaining: cooldown,
        }
    }

    pub fn cooldown(&self) -> f64 {
        self.cooldown
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    pub fn advance(&mut self, dt: f64) {
        self.remaining -= dt;
    }

    pub fn is_due(&self) -> bool {
        self.remaining <= 0.0
    }

    pub fn rearm(&mut self) {
        self.remaining += self.cooldown;
    }

    /// Swings owed right now: one for reaching zero plus one per whole
    /// cooldown of overshoot. Saturates at `u32::MAX`.
    pub fn due_swings(&self) -> u32 {
        if !self.is_due() {
            return 0;
        }
        ((-self.remaining / self.cooldown).floor() + 1.0) as u32
    }

    /// Forget owed swings, keeping the phase within the current cooldown.
    pub fn drop_backlog(&mut self) {
        let phase = self.remaining.rem_euclid(self.cooldown);
        self.remaining = if phase > 0.0 { phase } else { self.cooldown };
    }

    /// Fraction of the cooldown still to wait, in [0, 1].
    pub fn progress(&self) -> f64 {
        clamp01(self.remaining / self.cooldown)
    }
}
