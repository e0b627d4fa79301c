use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Dice;

/// One possible drop in a reward table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropEntry {
    pub item_id: String,
    #[serde(default)]
    pub min_qty: i32,
    #[serde(default)]
    pub max_qty: i32,
    /// Probability in [0, 1] that this entry drops.
    pub drop_chance: f64,
}

impl DropEntry {
    pub fn qty_range(&self) -> (i32, i32) {
        normalize_range(self.min_qty, self.max_qty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item_id: String,
    pub qty: i32,
}

impl ItemStack {
    pub fn new(item_id: impl Into<String>, qty: i32) -> Self {
        Self {
            item_id: item_id.into(),
            qty,
        }
    }

    fn is_valid(&self) -> bool {
        !self.item_id.is_empty() && self.qty > 0
    }
}

/// Authored post-victory rewards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardTable {
    pub id: String,
    #[serde(default)]
    pub drops: Vec<DropEntry>,
    #[serde(default)]
    pub xp_on_kill: i32,
    #[serde(default)]
    pub gold_min: i32,
    #[serde(default)]
    pub gold_max: i32,
    /// Dropped when no entry in `drops` came up.
    #[serde(default)]
    pub fallback: Option<ItemStack>,
}

impl RewardTable {
    /// Normalized gold range, or `None` when the table awards no gold.
    pub fn gold_range(&self) -> Option<(i32, i32)> {
        if self.gold_min > 0 || self.gold_max > 0 {
            Some(normalize_range(self.gold_min, self.gold_max))
        } else {
            None
        }
    }
}

/// What a victory pays out. Delivering it is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RewardBundle {
    pub items: Vec<ItemStack>,
    pub gold: i32,
    pub xp: i32,
}

/// Order a range so the low bound comes first, whatever the authoring order.
pub fn normalize_range(a: i32, b: i32) -> (i32, i32) {
    (a.min(b), a.max(b))
}

pub fn roll_rewards(table: &RewardTable, dice: &mut Dice) -> RewardBundle {
    let mut bundle = RewardBundle {
        xp: table.xp_on_kill,
        ..RewardBundle::default()
    };

    if let Some((min, max)) = table.gold_range() {
        bundle.gold = dice.range_i32(min, max);
    }

    for drop in &table.drops {
        if dice.unit() > drop.drop_chance {
            continue;
        }
        let (min, max) = drop.qty_range();
        let stack = ItemStack::new(drop.item_id.clone(), dice.range_i32(min, max));
        if stack.is_valid() {
            bundle.items.push(stack);
        }
    }

    if bundle.items.is_empty() {
        if let Some(fallback) = table.fallback.as_ref().filter(|f| f.is_valid()) {
            bundle.items.push(fallback.clone());
        }
    }

    debug!(
        table = %table.id,
        items = bundle.items.len(),
        gold = bundle.gold,
        xp = bundle.xp,
        "rolled rewards"
    );
    bundle
}
