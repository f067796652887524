use std::collections::BTreeSet;

/// Dense, recyclable integer ids.
///
/// Released ids are handed out again before new ones are minted, smallest
/// first, so live ids stay compact enough to pack into a sort key.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u32,
    free: BTreeSet<u32>,
}

impl IdAllocator {
    #[inline]
    pub const fn new() -> Self {
        Self { next: 0, free: BTreeSet::new() }
    }

    pub fn assign(&mut self) -> u32 {
        if let Some(id) = self.free.pop_first() {
            return id;
        }
        let id = self.next;
        self.next += 1;
        id
    }

    /// Returns `false` for ids that were never assigned or are already free.
    pub fn release(&mut self, id: u32) -> bool {
        id < self.next && self.free.insert(id)
    }

    #[inline]
    pub fn is_live(&self, id: u32) -> bool {
        id < self.next && !self.free.contains(&id)
    }

    /// Number of live ids.
    #[inline]
    pub fn count(&self) -> usize {
        self.next as usize - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_sequentially() {
        let mut ids = IdAllocator::new();
        assert_eq!((ids.assign(), ids.assign(), ids.assign()), (0, 1, 2));
        assert_eq!(ids.count(), 3);
    }

    #[test]
    fn reuses_smallest_released_first() {
        let mut ids = IdAllocator::new();
        for _ in 0..5 {
            ids.assign();
        }
        assert!(ids.release(3));
        assert!(ids.release(1));
        assert_eq!(ids.count(), 3);
        assert_eq!(ids.assign(), 1);
        assert_eq!(ids.assign(), 3);
        assert_eq!(ids.assign(), 5);
    }

    #[test]
    fn live_ids_stay_unique() {
        let mut ids = IdAllocator::new();
        let mut live = Vec::new();
        for round in 0..20u32 {
            live.push(ids.assign());
            if round % 3 == 0 {
                let id = live.remove(0);
                ids.release(id);
            }
        }
        let mut sorted = live.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), live.len());
        assert_eq!(ids.count(), live.len());
    }

    #[test]
    fn double_release_is_rejected() {
        let mut ids = IdAllocator::new();
        let id = ids.assign();
        assert!(ids.release(id));
        assert!(!ids.release(id));
        assert!(!ids.release(42));
        assert_eq!(ids.count(), 0);
    }
}
