use core::marker::PhantomData;
use core::sync::atomic::{AtomicU8, Ordering};

use super::group::Group;

/// A group element stored in an `AtomicU8`.
///
/// Only values produced by [`Group::to_raw`] are ever written, so every
/// load decodes to an element.
pub struct AtomicGroupCell<G: Group> {
    raw: AtomicU8,
    _group: PhantomData<G>,
}

impl<G: Group> AtomicGroupCell<G> {
    pub fn new(initial: G) -> Self {
        Self {
            raw: AtomicU8::new(initial.to_raw()),
            _group: PhantomData,
        }
    }

    // Only `to_raw` output is ever stored, so a miss means memory corruption
    #[allow(clippy::panic)]
    fn decode(raw: u8) -> G {
        match G::from_raw(raw) {
            Some(g) => g,
            None => panic!("group cell holds non-element {raw}"),
        }
    }

    pub fn load(&self, order: Ordering) -> G {
        Self::decode(self.raw.load(order))
    }

    pub fn store(&self, value: G, order: Ordering) {
        self.raw.store(value.to_raw(), order);
    }

    /// Single compare-and-swap from `expected` to `desired`.
    ///
    /// Returns the previous element: `Ok` if the swap happened, `Err` with
    /// the element actually found otherwise.
    pub fn try_transition(&self, expected: G, desired: G) -> Result<G, G> {
        self.raw
            .compare_exchange(
                expected.to_raw(),
                desired.to_raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(Self::decode)
            .map_err(Self::decode)
    }

    /// Atomically replace the state `s` with `s + delta`, retrying the CAS
    /// until no other writer intervened. Returns the element it replaced.
    pub fn apply(&self, delta: G) -> G {
        let mut current = self.raw.load(Ordering::Relaxed);
        loop {
            let next = Self::decode(current).add(delta).to_raw();
            match self
                .raw
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(prev) => return Self::decode(prev),
                Err(seen) => current = seen,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::group::Z2;
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_try_transition() {
        let cell = AtomicGroupCell::new(Z2::Identity);
        assert_eq!(cell.try_transition(Z2::Identity, Z2::Locked), Ok(Z2::Identity));
        assert_eq!(cell.try_transition(Z2::Identity, Z2::Locked), Err(Z2::Locked));
        assert_eq!(cell.load(Ordering::Acquire), Z2::Locked);
    }

    #[test]
    fn test_apply_returns_previous() {
        let cell = AtomicGroupCell::new(Z2::Identity);
        assert_eq!(cell.apply(Z2::Locked), Z2::Identity);
        assert_eq!(cell.load(Ordering::Acquire), Z2::Locked);
        assert_eq!(cell.apply(Z2::Locked), Z2::Locked);
        assert_eq!(cell.load(Ordering::Acquire), Z2::Identity);
    }

    #[test]
    #[should_panic(expected = "non-element 7")]
    fn test_corrupt_cell_fails_fast() {
        let cell = AtomicGroupCell::new(Z2::Identity);
        cell.raw.store(7, Ordering::Relaxed);
        let _ = cell.load(Ordering::Acquire);
    }

    #[test]
    fn test_concurrent_apply_is_not_lost() {
        // An even number of toggles from every thread lands back on identity
        let cell = Arc::new(AtomicGroupCell::new(Z2::Identity));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cell = Arc::clone(&cell);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        cell.apply(Z2::Locked);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cell.load(Ordering::Acquire), Z2::Identity);
    }
}
