//! Encounter lifecycle and the two swing timers.
//!
//! `Idle → Active` on [`EncounterScheduler::start`]; `Active → Won` when the
//! adversary's pool empties, `Active → Lost` when the protagonist's does, and
//! `Active → Idle` when a cancel request is observed at the next tick.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::Dice;
use crate::content::Catalog;
use crate::error::{EngineError, Result};
use crate::events::{CombatEvent, EventBus, PreviewNumbers, SubscriptionId};
use crate::life::{self, Health};
use crate::outcome::{
    Chances, preview_attacker_vs_defender, preview_defender_vs_attacker,
    resolve_attacker_vs_defender, resolve_defender_vs_attacker,
};
use crate::reward::{RewardBundle, roll_rewards};
use crate::services::Services;
use crate::snapshot::{
    AdversaryRecord, CombatSnapshot, ProtagonistStats, build_adversary_snapshot,
    build_protagonist_snapshot,
};
use crate::stance::Stance;
use crate::timer::SwingTimer;

/// Most swings one side resolves in a single tick. Anything owed beyond this
/// is dropped rather than replayed.
pub const MAX_SWINGS_PER_TICK: u32 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterState {
    #[default]
    Idle,
    Active,
    Won,
    Lost,
}

impl EncounterState {
    pub fn is_terminal(self) -> bool {
        matches!(self, EncounterState::Won | EncounterState::Lost)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Protagonist,
    Adversary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncounterConfig {
    /// Stance applied at start when the protagonist has none selected.
    pub default_stance: Stance,
    /// Shortest allowed time between swings, in seconds.
    pub min_cooldown: f64,
    /// Training experience per point of damage dealt.
    pub xp_per_damage: i32,
    /// Progression track that receives a reward table's kill experience.
    pub kill_xp_track: String,
    /// Prefix of the quest action reported for a kill; the adversary id follows.
    pub kill_action_prefix: String,
}

impl Default for EncounterConfig {
    fn default() -> Self {
        Self {
            default_stance: Stance::Defensive,
            min_cooldown: 0.1,
            xp_per_damage: 4,
            kill_xp_track: "combat".to_string(),
            kill_action_prefix: "Action_Kill_".to_string(),
        }
    }
}

/// Running totals for the current (or last) encounter.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FightStats {
    pub elapsed: f64,
    pub protagonist_swings: u32,
    pub adversary_swings: u32,
    pub protagonist_hits: u32,
    pub adversary_hits: u32,
    pub damage_dealt: i32,
    pub damage_taken: i32,
}

impl FightStats {
    pub fn swings(&self, side: Side) -> u32 {
        match side {
            Side::Protagonist => self.protagonist_swings,
            Side::Adversary => self.adversary_swings,
        }
    }
}

struct Fight {
    adversary: AdversaryRecord,
    protagonist: ProtagonistStats,
    protagonist_snapshot: CombatSnapshot,
    adversary_snapshot: CombatSnapshot,
    protagonist_health: Health,
    adversary_health: Health,
    protagonist_timer: SwingTimer,
    adversary_timer: SwingTimer,
    kill_reported: bool,
    stats: FightStats,
}

impl Fight {
    /// Side whose timer elapsed first among those with swings left this
    /// tick. Ties go to the protagonist.
    fn next_due(&self, budget: &SwingBudget) -> Option<Side> {
        let protagonist = budget.protagonist > 0 && self.protagonist_timer.is_due();
        let adversary = budget.adversary > 0 && self.adversary_timer.is_due();
        match (protagonist, adversary) {
            (false, false) => None,
            (true, false) => Some(Side::Protagonist),
            (false, true) => Some(Side::Adversary),
            (true, true) => {
                if self.adversary_timer.remaining() < self.protagonist_timer.remaining() {
                    Some(Side::Adversary)
                } else {
                    Some(Side::Protagonist)
                }
            }
        }
    }

    fn timer_mut(&mut self, side: Side) -> &mut SwingTimer {
        match side {
            Side::Protagonist => &mut self.protagonist_timer,
            Side::Adversary => &mut self.adversary_timer,
        }
    }
}

/// Swings each side may still take in the current tick.
struct SwingBudget {
    protagonist: u32,
    adversary: u32,
}

impl SwingBudget {
    fn spend(&mut self, side: Side) {
        let left = match side {
            Side::Protagonist => &mut self.protagonist,
            Side::Adversary => &mut self.adversary,
        };
        *left = left.saturating_sub(1);
    }
}

enum SwingEffect {
    Continue,
    AdversaryDown,
    ProtagonistDown,
}

/// Owns one protagonist-versus-adversary encounter at a time.
///
/// Everything runs on the caller's thread: the host calls [`tick`] once per
/// frame with the elapsed time, and every swing resolves to completion inside
/// that call.
///
/// [`tick`]: EncounterScheduler::tick
pub struct EncounterScheduler {
    catalog: Catalog,
    services: Services,
    config: EncounterConfig,
    dice: Dice,
    bus: EventBus,
    stance: Stance,
    state: EncounterState,
    fight: Option<Fight>,
    previews: PreviewNumbers,
    last_adversary: Option<String>,
    cancel_requested: bool,
}

impl EncounterScheduler {
    pub fn new(catalog: Catalog, services: Services, dice: Dice) -> Self {
        Self {
            catalog,
            services,
            config: EncounterConfig::default(),
            dice,
            bus: EventBus::new(),
            stance: Stance::None,
            state: EncounterState::Idle,
            fight: None,
            previews: PreviewNumbers::default(),
            last_adversary: None,
            cancel_requested: false,
        }
    }

    pub fn with_config(mut self, config: EncounterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&CombatEvent) + 'static) -> SubscriptionId {
        self.bus.subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn state(&self) -> EncounterState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == EncounterState::Active
    }

    pub fn stance(&self) -> Stance {
        self.stance
    }

    pub fn previews(&self) -> PreviewNumbers {
        self.previews
    }

    pub fn config(&self) -> &EncounterConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn services_mut(&mut self) -> &mut Services {
        &mut self.services
    }

    pub fn is_cancel_pending(&self) -> bool {
        self.cancel_requested
    }

    pub fn adversary(&self) -> Option<&AdversaryRecord> {
        self.fight.as_ref().map(|f| &f.adversary)
    }

    pub fn protagonist_health(&self) -> Option<Health> {
        self.fight.as_ref().map(|f| f.protagonist_health)
    }

    pub fn adversary_health(&self) -> Option<Health> {
        self.fight.as_ref().map(|f| f.adversary_health)
    }

    /// `(protagonist, adversary)` snapshots of the current encounter.
    pub fn snapshots(&self) -> Option<(CombatSnapshot, CombatSnapshot)> {
        self.fight
            .as_ref()
            .map(|f| (f.protagonist_snapshot, f.adversary_snapshot))
    }

    pub fn timer(&self, side: Side) -> Option<SwingTimer> {
        self.fight.as_ref().map(|f| match side {
            Side::Protagonist => f.protagonist_timer,
            Side::Adversary => f.adversary_timer,
        })
    }

    pub fn stats(&self) -> Option<FightStats> {
        self.fight.as_ref().map(|f| f.stats)
    }

    /// Begin an encounter against `adversary_id`.
    ///
    /// An unknown adversary or a missing character sheet is logged and
    /// returned without touching any state.
    pub fn start(&mut self, adversary_id: &str) -> Result<()> {
        let Some(adversary) = self.catalog.adversary(adversary_id).cloned() else {
            error!(adversary_id, "cannot start encounter: adversary not found");
            return Err(EngineError::UnknownAdversary(adversary_id.to_string()));
        };
        let Some(sheet) = self.services.sheet.as_ref() else {
            error!(adversary_id, "cannot start encounter: character sheet not available");
            return Err(EngineError::CollaboratorUnavailable("character sheet"));
        };
        let protagonist = sheet.protagonist();

        if self.state == EncounterState::Active {
            debug!(adversary_id, "replacing the active encounter");
        }

        if self.stance == Stance::None && self.config.default_stance != Stance::None {
            self.stance = self.config.default_stance;
            info!(stance = %self.stance, "no stance selected, using default");
            self.bus.publish(CombatEvent::StanceChanged {
                stance: self.stance,
            });
        }

        let protagonist_snapshot = build_protagonist_snapshot(&protagonist);
        let adversary_snapshot = build_adversary_snapshot(&adversary);
        let protagonist_health = protagonist.starting_health();
        let adversary_health = adversary.starting_health();
        let protagonist_timer = SwingTimer::new(protagonist.attack_speed, self.config.min_cooldown);
        let adversary_timer = SwingTimer::new(adversary.attack_speed, self.config.min_cooldown);

        info!(
            adversary_id,
            protagonist_cooldown = protagonist_timer.cooldown(),
            adversary_cooldown = adversary_timer.cooldown(),
            "encounter started"
        );

        let adversary_name = adversary.name().to_string();
        self.fight = Some(Fight {
            adversary,
            protagonist,
            protagonist_snapshot,
            adversary_snapshot,
            protagonist_health,
            adversary_health,
            protagonist_timer,
            adversary_timer,
            kill_reported: false,
            stats: FightStats::default(),
        });
        self.state = EncounterState::Active;
        self.cancel_requested = false;
        self.last_adversary = Some(adversary_id.to_string());

        self.bus.publish(CombatEvent::Started {
            adversary_id: adversary_id.to_string(),
            adversary_name,
        });
        self.bus.publish(CombatEvent::AdversaryHealth {
            current: adversary_health.hp,
            max: adversary_health.max_hp,
        });
        self.bus.publish(CombatEvent::ProtagonistHealth {
            current: protagonist_health.hp,
            max: protagonist_health.max_hp,
        });
        self.publish_timers();
        self.refresh_previews();
        Ok(())
    }

    /// Fight the most recently started adversary again.
    pub fn restart(&mut self) -> Result<()> {
        let Some(adversary_id) = self.last_adversary.clone() else {
            return Err(EngineError::NoPreviousEncounter);
        };
        self.start(&adversary_id)
    }

    /// Advance the encounter by `dt` seconds.
    ///
    /// Each elapsed timer resolves a swing and is re-armed by adding its
    /// cooldown, so a timer more than one cooldown overdue swings again in
    /// the same tick. Overdue swings resolve in the order they fell due, at
    /// most [`MAX_SWINGS_PER_TICK`] per side; a larger backlog is dropped.
    pub fn tick(&mut self, dt: f64) {
        if self.cancel_requested {
            self.cancel_requested = false;
            if self.state == EncounterState::Active {
                info!("encounter cancelled");
                self.state = EncounterState::Idle;
                self.fight = None;
            }
            return;
        }
        if self.state != EncounterState::Active {
            return;
        }

        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let Some(fight) = self.fight.as_mut() else {
            warn!("active encounter has no combatants; tick skipped");
            return;
        };
        fight.stats.elapsed += dt;
        fight.protagonist_timer.advance(dt);
        fight.adversary_timer.advance(dt);

        let owed_protagonist = fight.protagonist_timer.due_swings();
        let owed_adversary = fight.adversary_timer.due_swings();
        let mut budget = SwingBudget {
            protagonist: owed_protagonist.min(MAX_SWINGS_PER_TICK),
            adversary: owed_adversary.min(MAX_SWINGS_PER_TICK),
        };

        while self.state == EncounterState::Active {
            let Some(side) = self.fight.as_ref().and_then(|f| f.next_due(&budget)) else {
                break;
            };
            budget.spend(side);
            let effect = self.swing(side);
            if let Some(fight) = self.fight.as_mut() {
                fight.timer_mut(side).rearm();
            }
            match effect {
                SwingEffect::Continue => {}
                SwingEffect::AdversaryDown => self.end(),
                SwingEffect::ProtagonistDown => self.handle_defeat(),
            }
        }

        if self.state != EncounterState::Active {
            return;
        }
        if let Some(fight) = self.fight.as_mut() {
            for (side, owed) in [
                (Side::Protagonist, owed_protagonist),
                (Side::Adversary, owed_adversary),
            ] {
                if owed > MAX_SWINGS_PER_TICK {
                    warn!(?side, owed, "swing backlog over the per-tick limit dropped");
                    fight.timer_mut(side).drop_backlog();
                }
            }
        }
        self.publish_timers();
    }

    /// Switch stance. Mid-encounter this rebuilds both snapshots and
    /// republishes the odds; the swing timers are left alone.
    pub fn set_stance(&mut self, stance: Stance) {
        self.stance = stance;
        info!(%stance, effects = %stance.describe_effects(), "stance changed");
        self.bus.publish(CombatEvent::StanceChanged { stance });

        if self.state != EncounterState::Active {
            return;
        }
        if let Some(fight) = self.fight.as_mut() {
            match self.services.sheet.as_ref() {
                Some(sheet) => fight.protagonist = sheet.protagonist(),
                None => warn!("character sheet not available; keeping previous protagonist stats"),
            }
            fight.protagonist_snapshot = build_protagonist_snapshot(&fight.protagonist);
            fight.adversary_snapshot = build_adversary_snapshot(&fight.adversary);
        }
        self.refresh_previews();
    }

    /// Ask the active encounter to stop. Takes effect at the next tick, with
    /// no reward and no notifications.
    pub fn cancel(&mut self) {
        if self.state == EncounterState::Active {
            debug!("cancel requested");
            self.cancel_requested = true;
        }
    }

    /// Victory: credit the kill, roll and deliver rewards, publish the win.
    pub fn end(&mut self) {
        if self.state != EncounterState::Active {
            return;
        }
        self.state = EncounterState::Won;
        let Some(fight) = self.fight.as_mut() else {
            return;
        };
        let adversary_id = fight.adversary.id.clone();

        if !fight.kill_reported {
            fight.kill_reported = true;
            let action = format!("{}{}", self.config.kill_action_prefix, adversary_id);
            match self.services.quests.as_mut() {
                Some(quests) => quests.report_action(&action, 1),
                None => warn!(%action, "quest log not available; kill credit skipped"),
            }
        }

        let rewards = roll_for(&self.catalog, &fight.adversary, &mut self.dice);
        if let Some(bundle) = &rewards {
            deliver_rewards(
                &mut self.services,
                &mut self.bus,
                &self.config.kill_xp_track,
                bundle,
            );
        }

        info!(%adversary_id, elapsed = fight.stats.elapsed, "encounter won");
        self.bus.publish(CombatEvent::Victory {
            adversary_id,
            rewards,
        });
    }

    /// Defeat: publish the loss and hand the protagonist to the respawn
    /// collaborator.
    pub fn handle_defeat(&mut self) {
        if self.state != EncounterState::Active {
            return;
        }
        self.state = EncounterState::Lost;
        let Some(fight) = self.fight.as_ref() else {
            return;
        };
        let adversary_id = fight.adversary.id.clone();
        let health = fight.protagonist_health;

        info!(%adversary_id, elapsed = fight.stats.elapsed, "encounter lost");
        self.bus.publish(CombatEvent::Defeat {
            adversary_id: adversary_id.clone(),
        });
        match self.services.respawn.as_mut() {
            Some(respawn) => respawn.on_defeat(&adversary_id, health),
            None => warn!("respawn handler not available; recovery skipped"),
        }
    }

    fn swing(&mut self, side: Side) -> SwingEffect {
        let stance = self.stance;
        let Some(fight) = self.fight.as_mut() else {
            return SwingEffect::Continue;
        };

        match side {
            Side::Protagonist => {
                let result = resolve_attacker_vs_defender(
                    &fight.protagonist_snapshot,
                    &fight.adversary_snapshot,
                    stance,
                    fight.adversary.evasion,
                    &mut self.dice,
                );
                self.previews.protagonist = Chances {
                    hit: result.hit_chance_shown,
                    crit: result.crit_chance_shown,
                };
                fight.stats.protagonist_swings = fight.stats.protagonist_swings.saturating_add(1);

                let mut applied = 0;
                if result.hit_landed && result.final_damage > 0 {
                    applied = life::apply_damage(
                        fight.adversary.name(),
                        &mut fight.adversary_health,
                        result.final_damage,
                    )
                    .applied;
                    fight.stats.protagonist_hits = fight.stats.protagonist_hits.saturating_add(1);
                    fight.stats.damage_dealt = fight.stats.damage_dealt.saturating_add(applied);
                }
                debug!(outcome = ?result.outcome(), applied, "protagonist swing");

                self.bus.publish(CombatEvent::Swing {
                    attacker: side,
                    result,
                    applied,
                });
                if applied > 0 {
                    self.bus.publish(CombatEvent::AdversaryHealth {
                        current: fight.adversary_health.hp,
                        max: fight.adversary_health.max_hp,
                    });
                    if let Some(track) = stance.training_track() {
                        let amount = applied.saturating_mul(self.config.xp_per_damage);
                        award_xp(&mut self.services, &mut self.bus, track, amount);
                    }
                }

                if fight.adversary_health.is_down() {
                    SwingEffect::AdversaryDown
                } else {
                    SwingEffect::Continue
                }
            }
            Side::Adversary => {
                let result = resolve_defender_vs_attacker(
                    &fight.adversary_snapshot,
                    &fight.protagonist_snapshot,
                    stance,
                    fight.adversary.hit_chance,
                    fight.protagonist.evasion_bonus(),
                    &mut self.dice,
                );
                self.previews.adversary = Chances {
                    hit: result.hit_chance_shown,
                    crit: result.crit_chance_shown,
                };
                fight.stats.adversary_swings = fight.stats.adversary_swings.saturating_add(1);

                let mut applied = 0;
                if result.hit_landed && !result.was_blocked && result.final_damage > 0 {
                    applied = life::apply_damage(
                        &fight.protagonist.name,
                        &mut fight.protagonist_health,
                        result.final_damage,
                    )
                    .applied;
                    fight.stats.adversary_hits = fight.stats.adversary_hits.saturating_add(1);
                    fight.stats.damage_taken = fight.stats.damage_taken.saturating_add(applied);
                }
                debug!(outcome = ?result.outcome(), applied, "adversary swing");

                self.bus.publish(CombatEvent::Swing {
                    attacker: side,
                    result,
                    applied,
                });
                if applied > 0 {
                    self.bus.publish(CombatEvent::ProtagonistHealth {
                        current: fight.protagonist_health.hp,
                        max: fight.protagonist_health.max_hp,
                    });
                }

                if fight.protagonist_health.is_down() {
                    SwingEffect::ProtagonistDown
                } else {
                    SwingEffect::Continue
                }
            }
        }
    }

    fn refresh_previews(&mut self) {
        let Some(fight) = self.fight.as_ref() else {
            return;
        };
        self.previews = PreviewNumbers {
            protagonist: preview_attacker_vs_defender(
                &fight.protagonist_snapshot,
                self.stance,
                fight.adversary.evasion,
            ),
            adversary: preview_defender_vs_attacker(
                &fight.adversary_snapshot,
                fight.adversary.hit_chance,
                fight.protagonist.evasion_bonus(),
            ),
        };
        self.bus.publish(CombatEvent::Previews(self.previews));
    }

    fn publish_timers(&mut self) {
        if let Some(fight) = self.fight.as_ref() {
            self.bus.publish(CombatEvent::Timers {
                protagonist: fight.protagonist_timer.progress(),
                adversary: fight.adversary_timer.progress(),
            });
        }
    }
}

impl std::fmt::Debug for EncounterScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncounterScheduler")
            .field("state", &self.state)
            .field("stance", &self.stance)
            .field("adversary", &self.adversary().map(|a| a.id.as_str()))
            .field("previews", &self.previews)
            .finish()
    }
}

fn roll_for(catalog: &Catalog, adversary: &AdversaryRecord, dice: &mut Dice) -> Option<RewardBundle> {
    if adversary.loot_table.is_empty() {
        debug!(adversary = %adversary.id, "no reward table configured");
        return None;
    }
    match catalog.reward_table(&adversary.loot_table) {
        Some(table) => Some(roll_rewards(table, dice)),
        None => {
            let err = EngineError::UnknownRewardTable(adversary.loot_table.clone());
            warn!(adversary = %adversary.id, "{err}; no rewards rolled");
            None
        }
    }
}

fn award_xp(services: &mut Services, bus: &mut EventBus, track: &str, amount: i32) {
    if amount <= 0 {
        return;
    }
    match services.ledger.as_mut() {
        Some(ledger) => {
            ledger.add_xp(track, amount);
            bus.publish(CombatEvent::XpAwarded {
                track: track.to_string(),
                amount,
            });
        }
        None => warn!(track, amount, "experience ledger not available; xp skipped"),
    }
}

fn deliver_rewards(services: &mut Services, bus: &mut EventBus, xp_track: &str, bundle: &RewardBundle) {
    if !bundle.items.is_empty() || bundle.gold > 0 {
        match services.inventory.as_mut() {
            Some(inventory) => {
                for stack in &bundle.items {
                    inventory.add_item(&stack.item_id, stack.qty);
                }
                if bundle.gold > 0 {
                    inventory.add_gold(bundle.gold);
                }
            }
            None => warn!(
                items = bundle.items.len(),
                gold = bundle.gold,
                "inventory not available; loot skipped"
            ),
        }
    }
    award_xp(services, bus, xp_track, bundle.xp);
}
