use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub mod api;
pub mod content;
pub mod encounter;
pub mod error;
pub mod events;
pub mod life;
pub mod outcome;
pub mod reward;
pub mod services;
pub mod snapshot;
pub mod stance;
pub mod timer;

pub use api::{
    BatchSummary, SimulationConfig, SimulationReport, Winner, simulate_encounter, simulate_many,
};
pub use content::Catalog;
pub use encounter::{EncounterConfig, EncounterScheduler, EncounterState, FightStats, Side};
pub use error::{EngineError, Result};
pub use events::{CombatEvent, EventBus, PreviewNumbers, SubscriptionId};
pub use life::Health;
pub use outcome::{
    Chances, CombatResult, SwingOutcome, damage_variance, preview_attacker_vs_defender,
    preview_defender_vs_attacker, resolve_attacker_vs_defender, resolve_defender_vs_attacker,
};
pub use reward::{DropEntry, ItemStack, RewardBundle, RewardTable, roll_rewards};
pub use snapshot::{
    AdversaryRecord, CombatSnapshot, ProtagonistStats, build_adversary_snapshot,
    build_protagonist_snapshot,
};
pub use stance::{Stance, StanceModifiers, effective_armor, stance_modifiers};

/// Source of every random draw the engine makes.
///
/// Draws are sequential and order-dependent: a seeded `Dice` replays the same
/// encounter bit-for-bit, and a scripted one lets tests pin each draw.
#[derive(Debug, Clone)]
pub struct Dice {
    source: DiceSource,
}

#[derive(Debug, Clone)]
enum DiceSource {
    Seeded(ChaCha8Rng),
    Scripted(VecDeque<f64>),
}

impl Dice {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            source: DiceSource::Seeded(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    /// Replay unit draws in order. Values are clamped into [0, 1); an
    /// exhausted script keeps returning 0.0.
    pub fn from_scripted(draws: impl IntoIterator<Item = f64>) -> Self {
        let queue = draws
            .into_iter()
            .map(|d| d.clamp(0.0, 1.0 - f64::EPSILON))
            .collect();
        Self {
            source: DiceSource::Scripted(queue),
        }
    }

    /// Uniform draw in [0, 1).
    pub fn unit(&mut self) -> f64 {
        match &mut self.source {
            DiceSource::Seeded(rng) => rng.gen_range(0.0..1.0),
            DiceSource::Scripted(queue) => queue.pop_front().unwrap_or(0.0),
        }
    }

    /// Uniform integer in `[min, max]`. A degenerate range returns `min`
    /// without consuming a draw.
    pub fn range_i32(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        match &mut self.source {
            DiceSource::Seeded(rng) => rng.gen_range(min..=max),
            DiceSource::Scripted(queue) => {
                let u = queue.pop_front().unwrap_or(0.0);
                let span = (max as f64) - (min as f64) + 1.0;
                (min + (u * span).floor() as i32).min(max)
            }
        }
    }

    /// Uniform real in `[min, max)`.
    pub fn range_f64(&mut self, min: f64, max: f64) -> f64 {
        if max <= min {
            return min;
        }
        min + self.unit() * (max - min)
    }
}
