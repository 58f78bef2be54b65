use std::sync::{Arc, Mutex};

use super::OverlayUpdate;
use crate::shutdown::lock_unpoisoned;

#[derive(Debug, Default)]
struct SlotState {
    generation: u64,
    update: Option<Arc<OverlayUpdate>>,
}

/// Single-slot, writer-overwrites cell between the orchestrator and a render
/// loop.
///
/// Every `publish` or `clear` bumps the generation. A reader remembers the
/// generation it last saw and asks only for something newer; publishes it
/// never saw are simply gone.
#[derive(Debug, Default)]
pub struct PublishSlot {
    state: Mutex<SlotState>,
}

impl PublishSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `update`, replacing whatever was pending. Returns its generation.
    pub fn publish(&self, update: OverlayUpdate) -> u64 {
        let mut state = lock_unpoisoned(&self.state);
        state.generation += 1;
        state.update = Some(Arc::new(update));
        state.generation
    }

    /// Replace the pending update with nothing.
    pub fn clear(&self) -> u64 {
        let mut state = lock_unpoisoned(&self.state);
        state.generation += 1;
        state.update = None;
        state.generation
    }

    pub fn generation(&self) -> u64 {
        lock_unpoisoned(&self.state).generation
    }

    /// Newest update, if any.
    pub fn latest(&self) -> Option<Arc<OverlayUpdate>> {
        lock_unpoisoned(&self.state).update.clone()
    }

    /// `(generation, update)` when the slot changed after `seen`.
    pub fn changed_since(&self, seen: u64) -> Option<(u64, Option<Arc<OverlayUpdate>>)> {
        let state = lock_unpoisoned(&self.state);
        if state.generation == seen {
            None
        } else {
            Some((state.generation, state.update.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(sequence: u64) -> OverlayUpdate {
        OverlayUpdate {
            sequence,
            frame: None,
            regions: Vec::new(),
            source_size: (10, 10),
        }
    }

    #[test]
    fn reader_sees_only_the_newest_publish() {
        let slot = PublishSlot::new();
        assert!(slot.changed_since(0).is_none());

        slot.publish(update(1));
        slot.publish(update(2));
        let generation = slot.publish(update(3));

        let (seen, latest) = slot.changed_since(0).unwrap();
        assert_eq!(seen, generation);
        assert_eq!(latest.unwrap().sequence, 3);
        assert!(slot.changed_since(seen).is_none());
    }

    #[test]
    fn clear_is_a_visible_change() {
        let slot = PublishSlot::new();
        let seen = slot.publish(update(1));
        let cleared = slot.clear();
        assert_eq!(slot.generation(), cleared);
        assert_eq!(cleared, seen + 1);
        let (_, latest) = slot.changed_since(seen).unwrap();
        assert!(latest.is_none());
        assert!(slot.latest().is_none());
    }
}
