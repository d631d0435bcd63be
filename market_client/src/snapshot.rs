//! Latest-wins storage for polled projections
//!
//! Each refresh takes a `Generation` before it starts. Only a response
//! carrying the most recently issued generation is stored, so a slow
//! response can never replace one from a newer request.

use std::sync::Mutex;

use tokio::sync::watch;

/// Ticket for one refresh of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    pub fn value(&self) -> u64 {
        self.0
    }
}

pub struct SnapshotSlot<T> {
    issued: Mutex<u64>,
    value: watch::Sender<Option<T>>,
}

impl<T> SnapshotSlot<T> {
    pub fn new() -> Self {
        let (value, _) = watch::channel(None);
        Self {
            issued: Mutex::new(0),
            value,
        }
    }

    fn issued(&self) -> std::sync::MutexGuard<'_, u64> {
        self.issued.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn begin(&self) -> Generation {
        let mut issued = self.issued();
        *issued += 1;
        Generation(*issued)
    }

    /// Store `value` if `generation` is still the newest; returns whether it was stored
    pub fn publish(&self, generation: Generation, value: T) -> bool {
        let issued = self.issued();
        if generation.0 != *issued {
            return false;
        }
        self.value.send_replace(Some(value));
        true
    }

    /// Receiver that sees every stored snapshot
    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.value.subscribe()
    }
}

impl<T: Clone> SnapshotSlot<T> {
    pub fn latest(&self) -> Option<T> {
        self.value.borrow().clone()
    }
}

impl<T> Default for SnapshotSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_until_published() {
        let slot: SnapshotSlot<u32> = SnapshotSlot::new();
        assert_eq!(slot.latest(), None);

        let g = slot.begin();
        assert!(slot.publish(g, 7));
        assert_eq!(slot.latest(), Some(7));
    }

    #[test]
    fn test_late_response_discarded() {
        let slot = SnapshotSlot::new();
        let older = slot.begin();
        let newer = slot.begin();

        assert!(slot.publish(newer, "fresh"));
        assert!(!slot.publish(older, "stale"));
        assert_eq!(slot.latest(), Some("fresh"));
    }

    #[test]
    fn test_older_generation_cannot_publish_first() {
        let slot = SnapshotSlot::new();
        let older = slot.begin();
        let _newer = slot.begin();

        assert!(!slot.publish(older, 1));
        assert_eq!(slot.latest(), None);
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let slot = SnapshotSlot::new();
        let mut rx = slot.subscribe();

        let g = slot.begin();
        slot.publish(g, 42u64);

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Some(42));
    }
}
