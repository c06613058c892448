use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);

/// A reusable execution context, or "virtual user".
///
/// Slots can only be created by a [SlotPool] and are moved out of it while lent, so holding a slot
/// is proof that no other iteration is using it.
#[derive(Debug)]
pub struct Slot<S> {
    id: usize,
    pool_id: u64,
    values: S,
}

impl<S> Slot<S> {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn values(&self) -> &S {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut S {
        &mut self.values
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPoolError {
    #[display("Slot {slot_id} belongs to a different pool")]
    ForeignSlot { slot_id: usize },
    #[display("Slot {slot_id} was returned but is not lent out")]
    NotLent { slot_id: usize },
}

/// A fixed size set of slots that are lent out to one iteration at a time.
///
/// The size never changes after creation. When every slot is lent, [SlotPool::acquire] returns
/// `None` straight away instead of waiting, which is what lets a scenario drop ticks rather than
/// fall behind its schedule.
#[derive(Debug)]
pub struct SlotPool<S> {
    pool_id: u64,
    size: usize,
    inner: Mutex<PoolInner<S>>,
}

#[derive(Debug)]
struct PoolInner<S> {
    idle: Vec<Slot<S>>,
    lent: Vec<bool>,
}

impl<S> SlotPool<S> {
    /// Create a pool of `size` slots, creating the values of each slot with `init`.
    pub fn new(size: usize, mut init: impl FnMut(usize) -> S) -> Self {
        let pool_id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);

        // Reversed so that slot 0 is handed out first.
        let idle = (0..size)
            .rev()
            .map(|id| Slot {
                id,
                pool_id,
                values: init(id),
            })
            .collect();

        Self {
            pool_id,
            size,
            inner: Mutex::new(PoolInner {
                idle,
                lent: vec![false; size],
            }),
        }
    }

    /// Take an idle slot, or `None` if all of them are lent. Never waits.
    pub fn acquire(&self) -> Option<Slot<S>> {
        let mut inner = self.inner.lock();
        let slot = inner.idle.pop()?;
        inner.lent[slot.id] = true;
        Some(slot)
    }

    /// Return a lent slot to the pool.
    ///
    /// Fails if the slot was lent by a different pool, or if it has already been replaced with
    /// [SlotPool::restore]. The slot is dropped in either case.
    pub fn release(&self, slot: Slot<S>) -> Result<(), SlotPoolError> {
        if slot.pool_id != self.pool_id {
            return Err(SlotPoolError::ForeignSlot { slot_id: slot.id });
        }

        let mut inner = self.inner.lock();
        if !inner.lent[slot.id] {
            return Err(SlotPoolError::NotLent { slot_id: slot.id });
        }

        inner.lent[slot.id] = false;
        // Reused last-in first-out, so that the most recently used slot, with the warmest
        // connections, goes out next.
        inner.idle.push(slot);
        Ok(())
    }

    /// Put a new slot with `values` in place of a lent slot that was lost, for example because
    /// the task holding it panicked.
    ///
    /// Only call this once the lost slot has been dropped. Fails if `slot_id` is not lent out.
    pub fn restore(&self, slot_id: usize, values: S) -> Result<(), SlotPoolError> {
        let mut inner = self.inner.lock();
        if !inner.lent.get(slot_id).copied().unwrap_or(false) {
            return Err(SlotPoolError::NotLent { slot_id });
        }

        inner.lent[slot_id] = false;
        inner.idle.push(Slot {
            id: slot_id,
            pool_id: self.pool_id,
            values,
        });
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The number of slots currently lent out.
    pub fn in_use(&self) -> usize {
        let inner = self.inner.lock();
        self.size - inner.idle.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn acquire_until_exhausted() {
        let pool = SlotPool::new(2, |id| id * 10);

        let first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();
        assert_eq!(0, first.id());
        assert_eq!(&0, first.values());
        assert_eq!(1, second.id());
        assert_eq!(&10, second.values());
        assert!(pool.acquire().is_none());
        assert_eq!(2, pool.in_use());

        pool.release(first).unwrap();
        assert_eq!(1, pool.in_use());

        let again = pool.acquire().unwrap();
        assert_eq!(0, again.id());
        assert!(pool.acquire().is_none());
    }

    #[test]
    fn slot_values_survive_release() {
        let pool = SlotPool::new(1, |_| Vec::<u32>::new());

        let mut slot = pool.acquire().unwrap();
        slot.values_mut().push(7);
        pool.release(slot).unwrap();

        let slot = pool.acquire().unwrap();
        assert_eq!(&vec![7], slot.values());
    }

    #[test]
    fn release_to_another_pool_is_an_error() {
        let pool_a = SlotPool::new(1, |_| ());
        let pool_b = SlotPool::new(1, |_| ());

        let slot = pool_a.acquire().unwrap();
        assert_eq!(
            Err(SlotPoolError::ForeignSlot { slot_id: 0 }),
            pool_b.release(slot)
        );
        assert_eq!(0, pool_b.in_use());
    }

    #[test]
    fn lost_slot_can_be_restored_once() {
        let pool = SlotPool::new(2, |_| vec![1]);

        let lost = pool.acquire().unwrap();
        let lost_id = lost.id();
        drop(lost);
        assert_eq!(1, pool.in_use());

        pool.restore(lost_id, Vec::new()).unwrap();
        assert_eq!(0, pool.in_use());
        assert_eq!(
            Err(SlotPoolError::NotLent { slot_id: lost_id }),
            pool.restore(lost_id, Vec::new())
        );
        assert_eq!(
            Err(SlotPoolError::NotLent { slot_id: 7 }),
            pool.restore(7, Vec::new())
        );

        let restored = pool.acquire().unwrap();
        assert_eq!(lost_id, restored.id());
        assert!(restored.values().is_empty());
    }

    #[test]
    fn release_after_restore_is_an_error() {
        let pool = SlotPool::new(1, |_| ());

        let slot = pool.acquire().unwrap();
        pool.restore(slot.id(), ()).unwrap();

        assert_eq!(
            Err(SlotPoolError::NotLent { slot_id: 0 }),
            pool.release(slot)
        );
        assert_eq!(0, pool.in_use());
    }

    #[test]
    fn zero_sized_pool_never_lends() {
        let pool = SlotPool::new(0, |_| ());
        assert!(pool.acquire().is_none());
        assert_eq!(0, pool.size());
    }

    #[test]
    fn slot_is_never_borrowed_twice_under_contention() {
        const SLOTS: usize = 4;
        let pool = Arc::new(SlotPool::new(SLOTS, |id| id));
        let borrowed = Arc::new((0..SLOTS).map(|_| AtomicBool::new(false)).collect::<Vec<_>>());

        let handles = (0..16)
            .map(|_| {
                let pool = pool.clone();
                let borrowed = borrowed.clone();
                std::thread::spawn(move || {
                    let mut acquired = 0;
                    for _ in 0..5_000 {
                        if let Some(slot) = pool.acquire() {
                            acquired += 1;
                            let was_borrowed = borrowed[slot.id()].swap(true, Ordering::SeqCst);
                            assert!(!was_borrowed, "Slot {} lent twice", slot.id());
                            assert_eq!(slot.id(), *slot.values());
                            std::thread::yield_now();
                            borrowed[slot.id()].store(false, Ordering::SeqCst);
                            pool.release(slot).unwrap();
                        }
                    }
                    acquired
                })
            })
            .collect::<Vec<_>>();

        let acquired: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert!(acquired > 0);
        assert_eq!(0, pool.in_use());
    }
}
