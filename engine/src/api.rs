use std::{cell::RefCell, path::PathBuf, rc::Rc};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Dice;
use crate::content::{Catalog, builtin_protagonist, load_protagonist};
use crate::encounter::{EncounterConfig, EncounterScheduler, EncounterState, FightStats, Side};
use crate::events::CombatEvent;
use crate::outcome::SwingOutcome;
use crate::reward::RewardBundle;
use crate::services::{HalfVitalsRespawn, Services, Tally};
use crate::snapshot::ProtagonistStats;
use crate::stance::Stance;

const FRAME_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SimulationConfig {
    pub adversary_id: String,
    /// Preloaded catalog; takes precedence over `catalog_path`.
    #[serde(skip)]
    pub catalog: Option<Catalog>,
    /// Catalog file; the built-in catalog when neither is set.
    pub catalog_path: Option<PathBuf>,
    /// Protagonist sheet file; ignored when `protagonist` is set.
    pub protagonist_path: Option<PathBuf>,
    pub protagonist: Option<ProtagonistStats>,
    pub stance: Stance,
    pub seed: u64,
    /// Nominal frame length in seconds.
    pub frame_time: f64,
    /// Each frame lasts `frame_time × (1 ± frame_jitter)`.
    pub frame_jitter: f64,
    /// Host-side cap on simulated time.
    pub max_seconds: f64,
    pub encounter: EncounterConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            adversary_id: "goblin".to_string(),
            catalog: None,
            catalog_path: None,
            protagonist_path: None,
            protagonist: None,
            stance: Stance::None,
            seed: 0,
            frame_time: 1.0 / 60.0,
            frame_jitter: 0.5,
            max_seconds: 600.0,
            encounter: EncounterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Protagonist,
    Adversary,
    /// The time cap ran out first.
    Undecided,
}

impl std::fmt::Display for Winner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Winner::Protagonist => "protagonist",
            Winner::Adversary => "adversary",
            Winner::Undecided => "none",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SimulationReport {
    pub adversary_id: String,
    pub stance: Stance,
    pub seed: u64,
    pub winner: Winner,
    pub elapsed: f64,
    pub stats: FightStats,
    pub protagonist_hp_end: i32,
    pub adversary_hp_end: i32,
    pub rewards: Option<RewardBundle>,
    /// What the collaborators received over the encounter.
    pub tally: Tally,
    /// Protagonist HP after the respawn hand-off, on a loss.
    pub respawned_hp: Option<i32>,
    pub log: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchSummary {
    pub adversary_id: String,
    pub stance: Stance,
    pub samples: u32,
    pub protagonist_wins: u32,
    pub adversary_wins: u32,
    pub undecided: u32,
    pub win_rate: f64,
    pub avg_elapsed: f64,
    /// Swings per simulated second, averaged over samples.
    pub protagonist_swing_rate: f64,
    pub adversary_swing_rate: f64,
    pub avg_damage_dealt: f64,
    pub avg_gold: f64,
    pub items: IndexMap<String, i32>,
}

/// Accumulates human-readable lines from scheduler notifications.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    protagonist: String,
    adversary: String,
    lines: Vec<String>,
}

impl EventLog {
    pub fn new(protagonist: impl Into<String>) -> Self {
        Self {
            protagonist: protagonist.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, event: &CombatEvent) {
        if let CombatEvent::Started { adversary_name, .. } = event {
            self.adversary = adversary_name.clone();
        }
        if let Some(line) = describe_event(event, &self.protagonist, &self.adversary) {
            self.lines.push(line);
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// One log line for `event`, or `None` for notifications too chatty to log
/// (timer progress).
pub fn describe_event(event: &CombatEvent, protagonist: &str, adversary: &str) -> Option<String> {
    let line = match event {
        CombatEvent::Started { .. } => format!("[START] {protagonist} vs {adversary}"),
        CombatEvent::StanceChanged { stance } => {
            let effects = stance.describe_effects();
            if effects.is_empty() {
                format!("[STANCE] {stance}")
            } else {
                format!("[STANCE] {stance} {effects}")
            }
        }
        CombatEvent::Previews(p) => format!(
            "[ODDS][{}] hit {:.0}% crit {:.0}% | [{}] hit {:.0}% crit {:.0}%",
            protagonist,
            p.protagonist.hit * 100.0,
            p.protagonist.crit * 100.0,
            adversary,
            p.adversary.hit * 100.0,
            p.adversary.crit * 100.0
        ),
        CombatEvent::Timers { .. } => return None,
        CombatEvent::AdversaryHealth { current, max } => {
            format!("[HP][{adversary}] {current}/{max}")
        }
        CombatEvent::ProtagonistHealth { current, max } => {
            format!("[HP][{protagonist}] {current}/{max}")
        }
        CombatEvent::Swing {
            attacker, result, ..
        } => {
            let name = match attacker {
                Side::Protagonist => protagonist,
                Side::Adversary => adversary,
            };
            match result.outcome() {
                SwingOutcome::Miss => format!("[SWING][{name}] miss"),
                SwingOutcome::Blocked => format!("[SWING][{name}] blocked"),
                SwingOutcome::Hit => format!("[SWING][{name}] hit for {}", result.final_damage),
                SwingOutcome::Crit => format!("[SWING][{name}] CRIT for {}", result.final_damage),
            }
        }
        CombatEvent::XpAwarded { track, amount } => format!("[XP] +{amount} {track}"),
        CombatEvent::Victory { rewards, .. } => match rewards {
            Some(bundle) => format!("[END] victory over {adversary}; {}", describe_rewards(bundle)),
            None => format!("[END] victory over {adversary}"),
        },
        CombatEvent::Defeat { .. } => format!("[END] defeated by {adversary}"),
    };
    Some(line)
}

/// `2x goblin_ear, 4 gold, 12 xp`, or `nothing` for an empty bundle.
pub fn describe_rewards(bundle: &RewardBundle) -> String {
    let mut parts: Vec<String> = bundle
        .items
        .iter()
        .map(|s| format!("{}x {}", s.qty, s.item_id))
        .collect();
    if bundle.gold > 0 {
        parts.push(format!("{} gold", bundle.gold));
    }
    if bundle.xp > 0 {
        parts.push(format!("{} xp", bundle.xp));
    }
    if parts.is_empty() {
        "nothing".to_string()
    } else {
        parts.join(", ")
    }
}

struct Inputs {
    catalog: Catalog,
    protagonist: ProtagonistStats,
}

fn load_inputs(cfg: &SimulationConfig) -> Result<Inputs> {
    let catalog = match (&cfg.catalog, &cfg.catalog_path) {
        (Some(catalog), _) => catalog.clone(),
        (None, Some(path)) => Catalog::load(path)
            .with_context(|| format!("loading catalog {}", path.display()))?,
        (None, None) => Catalog::builtin().context("loading built-in catalog")?,
    };
    let protagonist = match (&cfg.protagonist, &cfg.protagonist_path) {
        (Some(stats), _) => stats.clone(),
        (None, Some(path)) => load_protagonist(path)
            .with_context(|| format!("loading protagonist {}", path.display()))?,
        (None, None) => builtin_protagonist().context("loading built-in protagonist")?,
    };
    Ok(Inputs {
        catalog,
        protagonist,
    })
}

/// Run one encounter to completion with a seeded, jittered frame clock.
pub fn simulate_encounter(cfg: &SimulationConfig) -> Result<SimulationReport> {
    let inputs = load_inputs(cfg)?;
    run(cfg, &inputs, cfg.seed)
}

/// Run `samples` encounters with seeds `seed, seed+1, ...` and aggregate.
pub fn simulate_many(cfg: &SimulationConfig, samples: u32) -> Result<BatchSummary> {
    let inputs = load_inputs(cfg)?;
    let mut summary = BatchSummary {
        adversary_id: cfg.adversary_id.clone(),
        stance: cfg.stance,
        samples,
        ..BatchSummary::default()
    };
    if samples == 0 {
        return Ok(summary);
    }

    let mut finished_elapsed = 0.0;
    let mut finished = 0u32;
    let mut protagonist_rate = 0.0;
    let mut adversary_rate = 0.0;
    let mut damage = 0i64;
    let mut gold = 0i64;

    for i in 0..samples {
        let report = run(cfg, &inputs, cfg.seed.wrapping_add(i as u64))?;
        summary.stance = report.stance;
        match report.winner {
            Winner::Protagonist => summary.protagonist_wins += 1,
            Winner::Adversary => summary.adversary_wins += 1,
            Winner::Undecided => summary.undecided += 1,
        }
        if report.winner != Winner::Undecided {
            finished += 1;
            finished_elapsed += report.elapsed;
        }
        if report.elapsed > 0.0 {
            protagonist_rate += report.stats.protagonist_swings as f64 / report.elapsed;
            adversary_rate += report.stats.adversary_swings as f64 / report.elapsed;
        }
        damage += report.stats.damage_dealt as i64;
        gold += report.tally.gold as i64;
        for (item, qty) in &report.tally.items {
            let total = summary.items.entry(item.clone()).or_default();
            *total = total.saturating_add(*qty);
        }
    }

    let n = samples as f64;
    summary.win_rate = summary.protagonist_wins as f64 / n;
    summary.avg_elapsed = if finished == 0 {
        0.0
    } else {
        finished_elapsed / finished as f64
    };
    summary.protagonist_swing_rate = protagonist_rate / n;
    summary.adversary_swing_rate = adversary_rate / n;
    summary.avg_damage_dealt = damage as f64 / n;
    summary.avg_gold = gold as f64 / n;
    info!(
        adversary = %summary.adversary_id,
        samples,
        win_rate = summary.win_rate,
        "batch finished"
    );
    Ok(summary)
}

fn run(cfg: &SimulationConfig, inputs: &Inputs, seed: u64) -> Result<SimulationReport> {
    let tally = Tally::shared();
    let respawn = Rc::new(RefCell::new(HalfVitalsRespawn::default()));
    let services = Services::new()
        .with_sheet(inputs.protagonist.clone())
        .with_inventory(tally.clone())
        .with_ledger(tally.clone())
        .with_quests(tally.clone())
        .with_respawn(respawn.clone());

    let mut scheduler =
        EncounterScheduler::new(inputs.catalog.clone(), services, Dice::from_seed(seed))
            .with_config(cfg.encounter.clone());

    let log = Rc::new(RefCell::new(EventLog::new(inputs.protagonist.name.clone())));
    let rewards: Rc<RefCell<Option<RewardBundle>>> = Rc::new(RefCell::new(None));
    {
        let log = log.clone();
        scheduler.subscribe(move |event| log.borrow_mut().record(event));
    }
    {
        let rewards = rewards.clone();
        scheduler.subscribe(move |event| {
            if let CombatEvent::Victory { rewards: r, .. } = event {
                *rewards.borrow_mut() = r.clone();
            }
        });
    }

    if cfg.stance != Stance::None {
        scheduler.set_stance(cfg.stance);
    }
    scheduler
        .start(&cfg.adversary_id)
        .with_context(|| format!("starting encounter against '{}'", cfg.adversary_id))?;

    let frame_time = if cfg.frame_time.is_finite() && cfg.frame_time > 0.0 {
        cfg.frame_time
    } else {
        1.0 / 60.0
    };
    let jitter = cfg.frame_jitter.clamp(0.0, 1.0);
    let mut frames = Dice::from_seed(seed ^ FRAME_SEED_SALT);
    let mut clock = 0.0;
    while scheduler.is_active() && clock < cfg.max_seconds {
        let dt = frame_time * frames.range_f64(1.0 - jitter, 1.0 + jitter);
        clock += dt;
        scheduler.tick(dt);
    }

    let winner = match scheduler.state() {
        EncounterState::Won => Winner::Protagonist,
        EncounterState::Lost => Winner::Adversary,
        EncounterState::Idle | EncounterState::Active => {
            warn!(max_seconds = cfg.max_seconds, "time cap reached before a winner");
            log.borrow_mut()
                .push(format!("[END] no winner after {:.1}s", cfg.max_seconds));
            Winner::Undecided
        }
    };

    let stats = scheduler.stats().unwrap_or_default();
    let report = SimulationReport {
        adversary_id: cfg.adversary_id.clone(),
        stance: scheduler.stance(),
        seed,
        winner,
        elapsed: stats.elapsed,
        stats,
        protagonist_hp_end: scheduler.protagonist_health().map_or(0, |h| h.hp),
        adversary_hp_end: scheduler.adversary_health().map_or(0, |h| h.hp),
        rewards: rewards.borrow().clone(),
        tally: tally.borrow().clone(),
        respawned_hp: respawn.borrow().respawns.last().map(|(_, h)| h.hp),
        log: log.borrow().lines().to_vec(),
    };
    Ok(report)
}
