//! Bounded pools of small callback IDs, one per [`FuncType`].
//!
//! IDs live in exactly one of two places: the `used` set or the `available`
//! min-heap. The heap is filled lazily, the first time it runs dry, with
//! every integer in `1..=max` that is not already in use, so the lowest free
//! ID is always handed out first.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::signature::FuncType;

/// Outstanding callbacks allowed per signature unless configured otherwise.
pub const DEFAULT_MAX_CALLBACKS: u32 = 40;

/// A callback ID, unique within its [`FuncType`] while it is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(pub u32);

impl CallbackId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for CallbackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ID pool for a single signature.
#[derive(Debug)]
pub struct CallbackPool {
    used: HashSet<u32>,
    available: BinaryHeap<Reverse<u32>>,
    max_size: u32,
    filled: bool,
}

impl CallbackPool {
    pub fn new(max_size: u32) -> Self {
        Self {
            used: HashSet::new(),
            available: BinaryHeap::new(),
            max_size,
            filled: false,
        }
    }

    /// Take the lowest free ID, or `None` when all `max_size` IDs are in use.
    pub fn acquire(&mut self) -> Option<u32> {
        if self.available.is_empty() && !self.filled {
            for id in 1..=self.max_size {
                if !self.used.contains(&id) {
                    self.available.push(Reverse(id));
                }
            }
            self.filled = true;
        }
        let Reverse(id) = self.available.pop()?;
        self.used.insert(id);
        Some(id)
    }

    /// Return `id` to the pool. `false` (and no change) if it was not in use.
    pub fn release(&mut self, id: u32) -> bool {
        if !self.used.remove(&id) {
            return false;
        }
        self.available.push(Reverse(id));
        true
    }

    pub fn is_used(&self, id: u32) -> bool {
        self.used.contains(&id)
    }

    pub fn in_use(&self) -> usize {
        self.used.len()
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Sorted snapshot of `(available, used)`.
    pub fn snapshot(&self) -> (Vec<u32>, Vec<u32>) {
        let mut available: Vec<u32> = self.available.iter().map(|Reverse(id)| *id).collect();
        let mut used: Vec<u32> = self.used.iter().copied().collect();
        available.sort_unstable();
        used.sort_unstable();
        (available, used)
    }
}

/// All pools, behind one mutex.
#[derive(Debug)]
pub struct IdPools {
    pools: Mutex<HashMap<FuncType, CallbackPool>>,
    max_size: u32,
}

impl Default for IdPools {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALLBACKS)
    }
}

impl IdPools {
    pub fn new(max_size: u32) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            max_size,
        }
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Allocate the next free ID for `func_type`.
    pub fn next_id(&self, func_type: FuncType) -> Result<CallbackId> {
        let mut pools = self.pools.lock();
        let pool = pools
            .entry(func_type)
            .or_insert_with(|| CallbackPool::new(self.max_size));
        match pool.acquire() {
            Some(id) => Ok(CallbackId(id)),
            None => Err(Error::PoolExhausted {
                func_type,
                max: self.max_size,
            }),
        }
    }

    /// Give `id` back. Releasing an ID that is not in use is an error.
    pub fn release_id(&self, func_type: FuncType, id: CallbackId) -> Result<()> {
        let mut pools = self.pools.lock();
        let released = pools
            .get_mut(&func_type)
            .is_some_and(|pool| pool.release(id.0));
        if released {
            Ok(())
        } else {
            Err(Error::IdNotInUse { func_type, id: id.0 })
        }
    }

    /// Run `f` with the pool lock held, provided `id` is in use.
    ///
    /// `id` cannot be released while `f` runs.
    pub(crate) fn with_used<R>(
        &self,
        func_type: FuncType,
        id: CallbackId,
        f: impl FnOnce() -> R,
    ) -> Result<R> {
        let pools = self.pools.lock();
        if !pools.get(&func_type).is_some_and(|pool| pool.is_used(id.0)) {
            return Err(Error::IdNotInUse { func_type, id: id.0 });
        }
        Ok(f())
    }

    /// Run `f`, then release `id`, both under the pool lock. Neither happens
    /// if `id` is not in use.
    pub(crate) fn release_after<R>(
        &self,
        func_type: FuncType,
        id: CallbackId,
        f: impl FnOnce() -> R,
    ) -> Result<R> {
        let mut pools = self.pools.lock();
        let Some(pool) = pools.get_mut(&func_type).filter(|pool| pool.is_used(id.0)) else {
            return Err(Error::IdNotInUse { func_type, id: id.0 });
        };
        let out = f();
        pool.release(id.0);
        Ok(out)
    }

    pub fn is_used(&self, func_type: FuncType, id: CallbackId) -> bool {
        self.pools
            .lock()
            .get(&func_type)
            .is_some_and(|pool| pool.is_used(id.0))
    }

    pub fn in_use(&self, func_type: FuncType) -> usize {
        self.pools.lock().get(&func_type).map_or(0, CallbackPool::in_use)
    }

    /// Sorted `(available, used)` for one signature; empty if never touched.
    pub fn snapshot(&self, func_type: FuncType) -> (Vec<u32>, Vec<u32>) {
        self.pools
            .lock()
            .get(&func_type)
            .map(CallbackPool::snapshot)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_id_on_empty_pool_is_one() {
        let pools = IdPools::default();
        assert_eq!(pools.next_id(FuncType::OnNewImage).unwrap(), CallbackId(1));
    }

    #[test]
    fn consecutive_allocations_are_distinct() {
        let pools = IdPools::default();
        let a = pools.next_id(FuncType::OnNewImage).unwrap();
        let b = pools.next_id(FuncType::OnNewImage).unwrap();
        assert_ne!(a, b);
        assert_eq!(b, CallbackId(2));
    }

    #[test]
    fn pools_are_scoped_per_func_type() {
        let pools = IdPools::default();
        assert_eq!(pools.next_id(FuncType::OnNewImage).unwrap(), CallbackId(1));
        assert_eq!(pools.next_id(FuncType::ApiLog).unwrap(), CallbackId(1));
    }

    #[test]
    fn lowest_released_id_is_reused_first() {
        let pools = IdPools::default();
        for _ in 0..5 {
            pools.next_id(FuncType::ChangeObserver).unwrap();
        }
        pools.release_id(FuncType::ChangeObserver, CallbackId(4)).unwrap();
        pools.release_id(FuncType::ChangeObserver, CallbackId(2)).unwrap();
        assert_eq!(pools.next_id(FuncType::ChangeObserver).unwrap(), CallbackId(2));
        assert_eq!(pools.next_id(FuncType::ChangeObserver).unwrap(), CallbackId(4));
        assert_eq!(pools.next_id(FuncType::ChangeObserver).unwrap(), CallbackId(6));
    }

    #[test]
    fn exhaustion_is_an_error() {
        let pools = IdPools::new(3);
        for _ in 0..3 {
            pools.next_id(FuncType::ButtonClicked).unwrap();
        }
        match pools.next_id(FuncType::ButtonClicked) {
            Err(Error::PoolExhausted { func_type, max }) => {
                assert_eq!(func_type, FuncType::ButtonClicked);
                assert_eq!(max, 3);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        pools.release_id(FuncType::ButtonClicked, CallbackId(2)).unwrap();
        assert_eq!(pools.next_id(FuncType::ButtonClicked).unwrap(), CallbackId(2));
    }

    #[test]
    fn double_release_errors_without_mutating() {
        let pools = IdPools::default();
        let id = pools.next_id(FuncType::OnNewImage).unwrap();
        pools.next_id(FuncType::OnNewImage).unwrap();
        pools.release_id(FuncType::OnNewImage, id).unwrap();

        let before = pools.snapshot(FuncType::OnNewImage);
        assert!(matches!(
            pools.release_id(FuncType::OnNewImage, id),
            Err(Error::IdNotInUse { id: 1, .. })
        ));
        assert_eq!(pools.snapshot(FuncType::OnNewImage), before);
    }

    #[test]
    fn releasing_on_untouched_pool_errors() {
        let pools = IdPools::default();
        assert!(pools.release_id(FuncType::MouseEvent, CallbackId(1)).is_err());
        assert_eq!(pools.snapshot(FuncType::MouseEvent), (vec![], vec![]));
    }

    #[test]
    fn release_after_skips_work_for_unused_ids() {
        let pools = IdPools::default();
        let id = pools.next_id(FuncType::ApiLog).unwrap();

        let mut ran = false;
        assert!(pools
            .release_after(FuncType::ApiLog, CallbackId(9), || ran = true)
            .is_err());
        assert!(!ran);

        pools.release_after(FuncType::ApiLog, id, || ran = true).unwrap();
        assert!(ran);
        assert!(!pools.is_used(FuncType::ApiLog, id));
        assert!(pools.with_used(FuncType::ApiLog, id, || ()).is_err());
    }

    #[test]
    fn available_and_used_partition_the_range() {
        let pools = IdPools::new(10);
        let mut held = Vec::new();
        for _ in 0..6 {
            held.push(pools.next_id(FuncType::ApiLog).unwrap());
        }
        pools.release_id(FuncType::ApiLog, held[1]).unwrap();
        pools.release_id(FuncType::ApiLog, held[4]).unwrap();

        let (available, used) = pools.snapshot(FuncType::ApiLog);
        assert!(available.iter().all(|id| !used.contains(id)));
        let mut all: Vec<u32> = available.iter().chain(used.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (1..=10).collect::<Vec<_>>());
    }
}
