use core::fmt;

/// A finite group small enough for its elements to live in one byte.
///
/// Lock states are group elements: acquiring adds a generator, releasing
/// adds its inverse. The identity element is the unlocked state.
pub trait Group: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    const IDENTITY: Self;

    /// Every element of the group, identity first.
    const ELEMENTS: &'static [Self];

    fn add(self, rhs: Self) -> Self;

    fn inverse(self) -> Self;

    fn to_raw(self) -> u8;

    fn from_raw(raw: u8) -> Option<Self>;

    fn is_identity(self) -> bool {
        self == Self::IDENTITY
    }

    /// Steps back to the identity. Adding the inverse always takes one.
    fn distance_to_identity(self) -> u8 {
        u8::from(!self.is_identity())
    }
}

/// The integers mod 2. `Identity` is unlocked, `Locked` is held.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Z2 {
    Identity = 0,
    Locked = 1,
}

impl Z2 {
    pub const fn label(self) -> &'static str {
        match self {
            Z2::Identity => "IDENTITY/UNLOCKED",
            Z2::Locked => "LOCKED",
        }
    }
}

impl Group for Z2 {
    const IDENTITY: Self = Z2::Identity;
    const ELEMENTS: &'static [Self] = &[Z2::Identity, Z2::Locked];

    fn add(self, rhs: Self) -> Self {
        if (self as u8 + rhs as u8) % 2 == 0 {
            Z2::Identity
        } else {
            Z2::Locked
        }
    }

    // Every element of Z/2Z is its own inverse
    fn inverse(self) -> Self {
        self
    }

    fn to_raw(self) -> u8 {
        self as u8
    }

    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Z2::Identity),
            1 => Some(Z2::Locked),
            _ => None,
        }
    }
}

impl fmt::Display for Z2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addition_table() {
        assert_eq!(Z2::Identity.add(Z2::Identity), Z2::Identity);
        assert_eq!(Z2::Identity.add(Z2::Locked), Z2::Locked);
        assert_eq!(Z2::Locked.add(Z2::Identity), Z2::Locked);
        assert_eq!(Z2::Locked.add(Z2::Locked), Z2::Identity);
    }

    #[test]
    fn test_inverse_and_distance() {
        for &g in Z2::ELEMENTS {
            assert!(g.add(g.inverse()).is_identity());
        }
        assert_eq!(Z2::Identity.distance_to_identity(), 0);
        assert_eq!(Z2::Locked.distance_to_identity(), 1);
    }

    #[test]
    fn test_raw_roundtrip_rejects_out_of_group() {
        assert_eq!(Z2::from_raw(Z2::Locked.to_raw()), Some(Z2::Locked));
        assert_eq!(Z2::from_raw(2), None);
    }

    #[test]
    fn test_display_is_numeric() {
        assert_eq!(format!("{}", Z2::Locked), "1");
        assert_eq!(Z2::Identity.label(), "IDENTITY/UNLOCKED");
    }
}
