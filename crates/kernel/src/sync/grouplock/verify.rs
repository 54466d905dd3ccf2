//! Exhaustive self-checks of the lock algebra.
//!
//! The element sets are tiny, so every law is checked over all tuples.
//! Run once at boot (a failure there is fatal) and on demand through the
//! verify syscall.

use core::sync::atomic::Ordering;

use kcore_error::define_kernel_error;

use super::atomic::AtomicGroupCell;
use super::group::Group;

define_kernel_error! {
    /// Group law or atomic-operation self-check failure.
    pub enum VerifyError(0x11) {
        Closure = 0x01 => "Group is not closed under addition",
        Associativity = 0x02 => "Group addition is not associative",
        Commutativity = 0x03 => "Group addition is not commutative",
        Identity = 0x04 => "Identity element is not neutral",
        Inverse = 0x05 => "Element plus inverse is not identity",
        Unreachable = 0x06 => "State cannot return to identity",
        AtomicAdd = 0x07 => "Atomic add produced the wrong element",
        AtomicInverse = 0x08 => "Atomic inverse produced the wrong element",
    }
}

/// Closure, commutativity, associativity, identity and inverse laws.
pub fn verify_group_properties<G: Group>() -> Result<(), VerifyError> {
    let elems = G::ELEMENTS;
    log::debug!("[GROUPLOCK] verifying group laws over {} elements", elems.len());

    for &a in elems {
        for &b in elems {
            if !elems.contains(&a.add(b)) {
                log::error!("[GROUPLOCK] closure fails for {a:?} + {b:?}");
                return Err(VerifyError::Closure);
            }
            if a.add(b) != b.add(a) {
                log::error!("[GROUPLOCK] {a:?} + {b:?} differs from {b:?} + {a:?}");
                return Err(VerifyError::Commutativity);
            }
            for &c in elems {
                if a.add(b).add(c) != a.add(b.add(c)) {
                    log::error!("[GROUPLOCK] associativity fails for {a:?}, {b:?}, {c:?}");
                    return Err(VerifyError::Associativity);
                }
            }
        }
    }

    for &a in elems {
        if a.add(G::IDENTITY) != a || G::IDENTITY.add(a) != a {
            log::error!("[GROUPLOCK] identity is not neutral for {a:?}");
            return Err(VerifyError::Identity);
        }
        if !a.add(a.inverse()).is_identity() {
            log::error!("[GROUPLOCK] {a:?} + inverse is not identity");
            return Err(VerifyError::Inverse);
        }
    }

    log::debug!("[GROUPLOCK] group laws verified");
    Ok(())
}

/// Every state returns to identity in one step by adding its inverse, so
/// no state can block forever.
pub fn verify_deadlock_freedom<G: Group>() -> Result<(), VerifyError> {
    for &state in G::ELEMENTS {
        let back = state.add(state.inverse());
        if !back.is_identity() {
            log::error!("[GROUPLOCK] state {state:?} cannot reach identity");
            return Err(VerifyError::Unreachable);
        }
        log::trace!("[GROUPLOCK] {state:?} + inverse = {back:?}");
    }
    log::debug!("[GROUPLOCK] every state reaches identity in one step");
    Ok(())
}

/// Drive a scratch cell through `e + g` and back with `g + inverse(g)` for
/// every non-identity `g`.
pub fn verify_atomic_group_operations<G: Group>() -> Result<(), VerifyError> {
    let cell = AtomicGroupCell::new(G::IDENTITY);
    for &g in G::ELEMENTS.iter().filter(|g| !g.is_identity()) {
        let old = cell.apply(g);
        let new = cell.load(Ordering::Acquire);
        if old != G::IDENTITY || new != g {
            log::error!("[GROUPLOCK] atomic add: old={old:?} new={new:?}");
            return Err(VerifyError::AtomicAdd);
        }

        let old = cell.apply(g.inverse());
        let new = cell.load(Ordering::Acquire);
        if old != g || !new.is_identity() {
            log::error!("[GROUPLOCK] atomic inverse: old={old:?} new={new:?}");
            return Err(VerifyError::AtomicInverse);
        }
    }
    log::debug!("[GROUPLOCK] atomic group operations verified");
    Ok(())
}

/// All three checks, stopping at the first failure.
pub fn verify_all<G: Group>() -> Result<(), VerifyError> {
    verify_group_properties::<G>()?;
    verify_deadlock_freedom::<G>()?;
    verify_atomic_group_operations::<G>()
}

#[cfg(test)]
mod tests {
    use super::super::group::Z2;
    use super::*;

    /// Z/3Z, to show the checks are not tied to two elements.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct Z3(u8);

    impl Group for Z3 {
        const IDENTITY: Self = Z3(0);
        const ELEMENTS: &'static [Self] = &[Z3(0), Z3(1), Z3(2)];

        fn add(self, rhs: Self) -> Self {
            Z3((self.0 + rhs.0) % 3)
        }
        fn inverse(self) -> Self {
            Z3((3 - self.0) % 3)
        }
        fn to_raw(self) -> u8 {
            self.0
        }
        fn from_raw(raw: u8) -> Option<Self> {
            (raw < 3).then_some(Z3(raw))
        }
    }

    /// Claims every element is its own inverse, which is false in Z/3Z.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct BrokenInverse(u8);

    impl Group for BrokenInverse {
        const IDENTITY: Self = BrokenInverse(0);
        const ELEMENTS: &'static [Self] = &[BrokenInverse(0), BrokenInverse(1), BrokenInverse(2)];

        fn add(self, rhs: Self) -> Self {
            BrokenInverse((self.0 + rhs.0) % 3)
        }
        fn inverse(self) -> Self {
            self
        }
        fn to_raw(self) -> u8 {
            self.0
        }
        fn from_raw(raw: u8) -> Option<Self> {
            (raw < 3).then_some(BrokenInverse(raw))
        }
    }

    /// Plain integer addition over {0, 1}: 1 + 1 leaves the set.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct Escapes(u8);

    impl Group for Escapes {
        const IDENTITY: Self = Escapes(0);
        const ELEMENTS: &'static [Self] = &[Escapes(0), Escapes(1)];

        fn add(self, rhs: Self) -> Self {
            Escapes(self.0 + rhs.0)
        }
        fn inverse(self) -> Self {
            self
        }
        fn to_raw(self) -> u8 {
            self.0
        }
        fn from_raw(raw: u8) -> Option<Self> {
            Some(Escapes(raw))
        }
    }

    #[test]
    fn test_z2_passes_everything() {
        assert_eq!(verify_group_properties::<Z2>(), Ok(()));
        assert_eq!(verify_deadlock_freedom::<Z2>(), Ok(()));
        assert_eq!(verify_atomic_group_operations::<Z2>(), Ok(()));
        assert_eq!(verify_all::<Z2>(), Ok(()));
    }

    #[test]
    fn test_z3_passes_everything() {
        assert_eq!(verify_all::<Z3>(), Ok(()));
    }

    #[test]
    fn test_wrong_inverse_is_caught() {
        assert_eq!(
            verify_group_properties::<BrokenInverse>(),
            Err(VerifyError::Inverse)
        );
        assert_eq!(
            verify_deadlock_freedom::<BrokenInverse>(),
            Err(VerifyError::Unreachable)
        );
        assert_eq!(
            verify_atomic_group_operations::<BrokenInverse>(),
            Err(VerifyError::AtomicInverse)
        );
    }

    #[test]
    fn test_unclosed_addition_is_caught() {
        assert_eq!(verify_group_properties::<Escapes>(), Err(VerifyError::Closure));
        assert_eq!(verify_all::<Escapes>(), Err(VerifyError::Closure));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(VerifyError::Closure.code(), 0x1101);
        assert_eq!(VerifyError::AtomicInverse.status(), -1);
        assert_eq!(
            format!("{}", VerifyError::Unreachable),
            "E1106: State cannot return to identity"
        );
    }
}
