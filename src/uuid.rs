//! 128-bit UUIDs and the stack's vendor UUID table types.
//!
//! The stack keeps 128-bit UUIDs in a small table of vendor bases. Services
//! and characteristics are then addressed by a 16-bit alias that is placed in
//! bytes 12-13 of the registered base, together with the type tag that the
//! stack assigned to that base.

#![allow(clippy::use_self)]

use std::fmt::{Debug, Display, Formatter};
use std::num::NonZeroU128;

use crate::util::name_of;

const SHIFT: u32 = u128::BITS - u32::BITS;
const SIG_BASE: u128 = 0x00000000_0000_1000_8000_00805F9B34FB;
const MASK_32: u128 = !((u32::MAX as u128) << SHIFT);
const ALIAS_MASK: u128 = (u16::MAX as u128) << SHIFT;

/// 128-bit UUID ([Vol 3] Part B, Section 2.5.1).
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Uuid(NonZeroU128);

impl Uuid {
    /// Creates a UUID from a `u128`. Returns [`None`] if `v` is zero.
    #[inline]
    #[must_use]
    pub const fn new(v: u128) -> Option<Self> {
        match NonZeroU128::new(v) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Returns the 128-bit form of an assigned 16-bit Bluetooth SIG UUID.
    #[inline]
    #[must_use]
    pub const fn sig(v: u16) -> Option<Self> {
        if v == 0 {
            return None;
        }
        Self::new((v as u128) << SHIFT | SIG_BASE)
    }

    /// Creates a UUID from its little-endian byte representation.
    #[inline]
    #[must_use]
    pub const fn from_bytes(b: [u8; 16]) -> Option<Self> {
        Self::new(u128::from_le_bytes(b))
    }

    /// Returns whether the UUID is derived from the Bluetooth SIG base UUID.
    /// Such UUIDs are assigned numbers and cannot be used as a vendor base.
    #[inline]
    #[must_use]
    pub const fn is_sig(self) -> bool {
        self.0.get() & MASK_32 == SIG_BASE
    }

    /// Returns the vendor base of this UUID with the 16-bit alias bytes
    /// cleared, or [`None`] if nothing remains after clearing them.
    #[inline]
    #[must_use]
    pub const fn base(self) -> Option<Self> {
        Self::new(self.0.get() & !ALIAS_MASK)
    }

    /// Returns the 16-bit alias stored in bytes 12-13.
    #[inline]
    #[must_use]
    pub const fn alias(self) -> u16 {
        #[allow(clippy::cast_possible_truncation)]
        let v = (self.0.get() >> SHIFT) as u16;
        v
    }

    /// Returns the UUID formed by placing `alias` into bytes 12-13 of `self`.
    #[inline]
    #[must_use]
    pub const fn with_alias(self, alias: u16) -> Self {
        let v = (self.0.get() & !ALIAS_MASK) | (alias as u128) << SHIFT;
        match NonZeroU128::new(v) {
            Some(nz) => Self(nz),
            // Only reachable for a zero base and a zero alias, and a zero base
            // is never a valid `Uuid`.
            None => self,
        }
    }

    /// Returns the UUID as a little-endian byte array.
    #[inline]
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.get().to_le_bytes()
    }
}

impl Debug for Uuid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        #[allow(clippy::cast_possible_truncation)]
        let v = self.0.get();
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:04X}-{:012X}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            (v & ((1 << 48) - 1)) as u64
        )
    }
}

impl Display for Uuid {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl From<Uuid> for u128 {
    #[inline]
    fn from(u: Uuid) -> Self {
        u.0.get()
    }
}

/// UUID type tag assigned by the stack. Tag 1 refers to the Bluetooth SIG
/// base; vendor bases receive tags starting at [`UuidType::VENDOR_BEGIN`].
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct UuidType(u8);

impl UuidType {
    /// Invalid UUID type.
    pub const UNKNOWN: Self = Self(0x00);
    /// Bluetooth SIG UUID.
    pub const SIG: Self = Self(0x01);
    /// First vendor-specific UUID type.
    pub const VENDOR_BEGIN: Self = Self(0x02);

    /// Wraps a raw type tag.
    #[inline]
    #[must_use]
    pub const fn from_raw(v: u8) -> Self {
        Self(v)
    }

    /// Returns whether the tag refers to a vendor base.
    #[inline]
    #[must_use]
    pub const fn is_vendor(self) -> bool {
        self.0 >= Self::VENDOR_BEGIN.0
    }
}

impl From<UuidType> for u8 {
    #[inline]
    fn from(t: UuidType) -> Self {
        t.0
    }
}

impl Debug for UuidType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:#04X})", name_of!(UuidType), self.0)
    }
}

impl Display for UuidType {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// 16-bit alias qualified by the type tag of its registered base.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct ShortUuid {
    pub uuid: u16,
    pub typ: UuidType,
}

impl ShortUuid {
    /// Creates a qualified 16-bit alias.
    #[inline]
    #[must_use]
    pub const fn new(uuid: u16, typ: UuidType) -> Self {
        Self { uuid, typ }
    }
}

impl Debug for ShortUuid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}/{:#04X}", self.uuid, self.typ.0)
    }
}

impl Display for ShortUuid {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}
