use serde::{Deserialize, Serialize};

/// Fraction of base armor a Defensive/Berserker stance shifts, before rounding.
const ARMOR_SHIFT_RATIO: f64 = 0.05;

/// Player-selected combat posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    #[default]
    None,
    Berserker,
    Defensive,
    Precision,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StanceModifiers {
    /// Multiplier on outgoing damage.
    pub damage_multiplier: f64,
    /// Additive bonus to the protagonist's hit chance.
    pub accuracy_bonus: f64,
    /// Additive bonus to the protagonist's crit chance.
    pub crit_bonus: f64,
}

pub fn stance_modifiers(stance: Stance) -> StanceModifiers {
    let (damage_multiplier, accuracy_bonus, crit_bonus) = match stance {
        Stance::Berserker => (1.25, 0.0, 0.0),
        Stance::Defensive => (0.90, 0.0, 0.0),
        Stance::Precision => (0.95, 0.10, 0.05),
        Stance::None => (1.0, 0.0, 0.0),
    };
    StanceModifiers {
        damage_multiplier,
        accuracy_bonus,
        crit_bonus,
    }
}

/// Armor the protagonist actually blocks with under `stance`.
///
/// Defensive adds `max(1, round(5% of base))`, Berserker removes the same
/// amount but never strips the last point of armor the protagonist had.
pub fn effective_armor(stance: Stance, base_armor: i32) -> i32 {
    let shift = ((base_armor as f64 * ARMOR_SHIFT_RATIO).round_ties_even() as i32).max(1);
    let effective = match stance {
        Stance::Defensive => base_armor.saturating_add(shift),
        Stance::Berserker => {
            let reduced = base_armor.saturating_sub(shift);
            if base_armor > 0 { reduced.max(1) } else { reduced }
        }
        Stance::Precision | Stance::None => base_armor,
    };
    effective.max(0)
}

impl Stance {
    pub const ALL: [Stance; 4] = [
        Stance::None,
        Stance::Berserker,
        Stance::Defensive,
        Stance::Precision,
    ];

    pub fn modifiers(self) -> StanceModifiers {
        stance_modifiers(self)
    }

    /// Progression track trained by damage dealt in this stance.
    pub fn training_track(self) -> Option<&'static str> {
        match self {
            Stance::Berserker => Some("strength"),
            Stance::Defensive => Some("defence"),
            Stance::Precision => Some("precision"),
            Stance::None => None,
        }
    }

    /// Short summary of the non-neutral modifiers, e.g. `(+25% dmg)`.
    /// Empty for a stance with no effect.
    pub fn describe_effects(self) -> String {
        let mods = self.modifiers();
        let mut parts = Vec::new();

        if (mods.damage_multiplier - 1.0).abs() > 0.01 {
            parts.push(format!("{:+.0}% dmg", (mods.damage_multiplier - 1.0) * 100.0));
        }
        if mods.accuracy_bonus.abs() > 0.001 {
            parts.push(format!("{:+.0}% accuracy", mods.accuracy_bonus * 100.0));
        }
        if mods.crit_bonus.abs() > 0.001 {
            parts.push(format!("{:+.0}% crit", mods.crit_bonus * 100.0));
        }

        if parts.is_empty() {
            String::new()
        } else {
            format!("({})", parts.join(", "))
        }
    }
}

impl std::fmt::Display for Stance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stance::None => "None",
            Stance::Berserker => "Berserker",
            Stance::Defensive => "Defensive",
            Stance::Precision => "Precision",
        };
        f.write_str(name)
    }
}
