#![allow(clippy::use_self)]

use std::fmt::{Debug, Display, Formatter};
use std::num::NonZeroU16;

use crate::util::name_of;

/// Attribute handle assigned by the stack ([Vol 3] Part F, Section 3.2.2).
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Handle(NonZeroU16);

impl Handle {
    /// Wraps a raw handle. Returns [`None`] if the handle is invalid.
    #[inline]
    #[must_use]
    pub const fn new(h: u16) -> Option<Self> {
        match NonZeroU16::new(h) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Returns the next handle or [`None`] if the maximum handle was reached.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        Self::new(self.0.get().wrapping_add(1))
    }
}

impl Debug for Handle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:#06X})", name_of!(Handle), self.0.get())
    }
}

impl Display for Handle {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl From<Handle> for u16 {
    #[inline]
    fn from(h: Handle) -> Self {
        h.0.get()
    }
}

/// Connection handle of an active link. The stack uses `0xFFFF` as the
/// "no connection" sentinel, which is never representable by this type;
/// absence of a link is `Option::<ConnHandle>::None`.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct ConnHandle(NonZeroU16);

impl ConnHandle {
    /// Raw sentinel value used by the stack for "no connection".
    pub const INVALID: u16 = 0xFFFF;

    /// Wraps a raw connection handle. Returns [`None`] for the sentinel.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Option<Self> {
        // !v is zero only for the sentinel
        match NonZeroU16::new(!v) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Converts an optional handle into the stack's raw representation.
    #[inline]
    #[must_use]
    pub fn raw(cn: Option<Self>) -> u16 {
        cn.map_or(Self::INVALID, u16::from)
    }
}

impl From<ConnHandle> for u16 {
    #[inline]
    fn from(cn: ConnHandle) -> Self {
        !cn.0.get()
    }
}

impl Debug for ConnHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:#06X})", name_of!(ConnHandle), u16::from(*self))
    }
}

impl Display for ConnHandle {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Handles assigned to a registered characteristic.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CharHandles {
    /// Characteristic value handle. This is the handle used for publishing.
    pub value: Handle,
    /// Client Characteristic Configuration descriptor handle, if configured.
    pub cccd: Option<Handle>,
}
