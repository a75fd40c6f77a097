use std::collections::VecDeque;

use super::model::TierUnlockEvent;

/// FIFO of unlocks waiting to be presented, one at a time
#[derive(Debug, Default, Clone)]
pub struct UnlockQueue {
    events: VecDeque<TierUnlockEvent>,
}

impl UnlockQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: TierUnlockEvent) {
        self.events.push_back(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = TierUnlockEvent>) {
        self.events.extend(events);
    }

    /// The unlock currently on screen
    pub fn current(&self) -> Option<&TierUnlockEvent> {
        self.events.front()
    }

    /// Close the current unlock; the next one becomes current
    pub fn dismiss(&mut self) -> Option<TierUnlockEvent> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
