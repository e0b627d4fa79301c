//! Collaborators the scheduler talks to but does not own.
//!
//! Each one is optional: a collaborator that has not been wired up yet only
//! costs the side effect that needed it, never the encounter.

use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;
use serde::Serialize;

use crate::life::{self, Health};
use crate::snapshot::ProtagonistStats;

/// Live view of the protagonist's persistent stats.
pub trait CharacterSheet {
    fn protagonist(&self) -> ProtagonistStats;
}

pub trait Inventory {
    fn add_item(&mut self, item_id: &str, qty: i32);
    fn add_gold(&mut self, amount: i32);
}

pub trait ExperienceLedger {
    fn add_xp(&mut self, track: &str, amount: i32);
}

pub trait QuestLog {
    fn report_action(&mut self, action_id: &str, count: i32);
}

/// Takes over after the protagonist falls (fades, respawn delays, zone moves).
pub trait Respawn {
    fn on_defeat(&mut self, adversary_id: &str, health: Health);
}

impl CharacterSheet for ProtagonistStats {
    fn protagonist(&self) -> ProtagonistStats {
        self.clone()
    }
}

impl<T: CharacterSheet> CharacterSheet for Rc<RefCell<T>> {
    fn protagonist(&self) -> ProtagonistStats {
        self.borrow().protagonist()
    }
}

impl<T: Inventory> Inventory for Rc<RefCell<T>> {
    fn add_item(&mut self, item_id: &str, qty: i32) {
        self.borrow_mut().add_item(item_id, qty);
    }

    fn add_gold(&mut self, amount: i32) {
        self.borrow_mut().add_gold(amount);
    }
}

impl<T: ExperienceLedger> ExperienceLedger for Rc<RefCell<T>> {
    fn add_xp(&mut self, track: &str, amount: i32) {
        self.borrow_mut().add_xp(track, amount);
    }
}

impl<T: QuestLog> QuestLog for Rc<RefCell<T>> {
    fn report_action(&mut self, action_id: &str, count: i32) {
        self.borrow_mut().report_action(action_id, count);
    }
}

impl<T: Respawn> Respawn for Rc<RefCell<T>> {
    fn on_defeat(&mut self, adversary_id: &str, health: Health) {
        self.borrow_mut().on_defeat(adversary_id, health);
    }
}

#[derive(Default)]
pub struct Services {
    pub sheet: Option<Box<dyn CharacterSheet>>,
    pub inventory: Option<Box<dyn Inventory>>,
    pub ledger: Option<Box<dyn ExperienceLedger>>,
    pub quests: Option<Box<dyn QuestLog>>,
    pub respawn: Option<Box<dyn Respawn>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, sheet: impl CharacterSheet + 'static) -> Self {
        self.sheet = Some(Box::new(sheet));
        self
    }

    pub fn with_inventory(mut self, inventory: impl Inventory + 'static) -> Self {
        self.inventory = Some(Box::new(inventory));
        self
    }

    pub fn with_ledger(mut self, ledger: impl ExperienceLedger + 'static) -> Self {
        self.ledger = Some(Box::new(ledger));
        self
    }

    pub fn with_quests(mut self, quests: impl QuestLog + 'static) -> Self {
        self.quests = Some(Box::new(quests));
        self
    }

    pub fn with_respawn(mut self, respawn: impl Respawn + 'static) -> Self {
        self.respawn = Some(Box::new(respawn));
        self
    }
}

/// In-memory inventory, experience and quest tallies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub items: IndexMap<String, i32>,
    pub gold: i32,
    pub xp: IndexMap<String, i32>,
    pub actions: IndexMap<String, i32>,
}

impl Tally {
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }
}

impl Inventory for Tally {
    fn add_item(&mut self, item_id: &str, qty: i32) {
        let held = self.items.entry(item_id.to_string()).or_default();
        *held = held.saturating_add(qty);
    }

    fn add_gold(&mut self, amount: i32) {
        self.gold = self.gold.saturating_add(amount);
    }
}

impl ExperienceLedger for Tally {
    fn add_xp(&mut self, track: &str, amount: i32) {
        let total = self.xp.entry(track.to_string()).or_default();
        *total = total.saturating_add(amount);
    }
}

impl QuestLog for Tally {
    fn report_action(&mut self, action_id: &str, count: i32) {
        let total = self.actions.entry(action_id.to_string()).or_default();
        *total = total.saturating_add(count);
    }
}

/// Respawn handler that brings the protagonist back at half health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HalfVitalsRespawn {
    pub respawns: Vec<(String, Health)>,
}

impl Respawn for HalfVitalsRespawn {
    fn on_defeat(&mut self, adversary_id: &str, mut health: Health) {
        life::restore_half("protagonist", &mut health);
        self.respawns.push((adversary_id.to_string(), health));
    }
}
