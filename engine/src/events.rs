//! Notifications published by the scheduler.
//!
//! Presentation and collaborator code subscribes to the bus instead of being
//! called directly; subscribers run synchronously, in subscription order.

use serde::Serialize;

use crate::encounter::Side;
use crate::outcome::{Chances, CombatResult};
use crate::reward::RewardBundle;
use crate::stance::Stance;

/// Current odds for both sides, as shown to the player.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PreviewNumbers {
    pub protagonist: Chances,
    pub adversary: Chances,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CombatEvent {
    Started {
        adversary_id: String,
        adversary_name: String,
    },
    StanceChanged {
        stance: Stance,
    },
    Previews(PreviewNumbers),
    /// Normalized time remaining until each side's next swing (1 = just swung).
    Timers {
        protagonist: f64,
        adversary: f64,
    },
    AdversaryHealth {
        current: i32,
        max: i32,
    },
    ProtagonistHealth {
        current: i32,
        max: i32,
    },
    Swing {
        attacker: Side,
        result: CombatResult,
        /// HP actually removed from the target.
        applied: i32,
    },
    XpAwarded {
        track: String,
        amount: i32,
    },
    Victory {
        adversary_id: String,
        rewards: Option<RewardBundle>,
    },
    Defeat {
        adversary_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&CombatEvent)>;

#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&CombatEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn publish(&mut self, event: CombatEvent) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
