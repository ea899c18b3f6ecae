//! Record identifiers.
//!
//! Every record in the store lives under a 128-bit [`Id`]. The same value is
//! embedded in other records as a lookup-only reference; following one means
//! asking the store, never dereferencing a pointer.

use std::fmt;

use uuid::Uuid;

use crate::layout::ID_SIZE;

/// A 128-bit opaque record identifier.
///
/// The all-zero value ([`Id::ZERO`]) marks an absent or unallocated slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Id([u8; ID_SIZE]);

impl Id {
    /// The reserved "absent / unallocated" identifier.
    pub const ZERO: Id = Id([0; ID_SIZE]);

    /// Generates a fresh random identifier.
    ///
    /// Uses UUID v4, so collisions are statistically negligible and the
    /// result is never [`Id::ZERO`].
    pub fn generate() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    /// Wraps raw identifier bytes.
    pub const fn from_bytes(bytes: [u8; ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Builds an identifier from a `u128` (big-endian byte order).
    pub const fn from_u128(value: u128) -> Self {
        Self(value.to_be_bytes())
    }

    /// Returns the raw bytes used as the store key.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    /// Returns true if this is the unallocated sentinel.
    #[inline]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Reads an identifier from the first [`ID_SIZE`] bytes of `buf`.
    ///
    /// Callers guarantee the slice is long enough; the codec only calls this
    /// after validating the record size.
    pub(crate) fn read_from(buf: &[u8]) -> Self {
        let mut bytes = [0u8; ID_SIZE];
        bytes.copy_from_slice(&buf[..ID_SIZE]);
        Self(bytes)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0).hyphenated())
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            write!(f, "Id(<zero>)")
        } else {
            write!(f, "Id({self})")
        }
    }
}

impl From<Uuid> for Id {
    fn from(uuid: Uuid) -> Self {
        Self(*uuid.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_default() {
        assert_eq!(Id::default(), Id::ZERO);
        assert!(Id::ZERO.is_zero());
    }

    #[test]
    fn test_generated_ids_are_distinct_and_nonzero() {
        let a = Id::generate();
        let b = Id::generate();
        assert_ne!(a, b);
        assert!(!a.is_zero());
        assert!(!b.is_zero());
    }

    #[test]
    fn test_display_is_hyphenated_uuid() {
        let id = Id::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        assert_eq!(id.to_string(), "01234567-89ab-cdef-0123-456789abcdef");
        assert_eq!(format!("{:?}", Id::ZERO), "Id(<zero>)");
    }
}
