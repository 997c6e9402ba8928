//! Attribute security requirements.

use crate::consts::ErrorCode;

/// Security level required for one type of attribute access. Levels are
/// ordered, so a link that satisfies a level also satisfies all lower ones
/// except [`SecLevel::NoAccess`], which no link satisfies.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum SecLevel {
    /// Access is not permitted over the air.
    NoAccess = 0,
    /// No security requirement.
    Open = 1,
    /// Encryption without MITM protection.
    Encrypted = 2,
    /// Encryption with MITM protection.
    Authenticated = 3,
    /// LE Secure Connections pairing with MITM protection.
    SecureConnections = 4,
}

impl Default for SecLevel {
    #[inline]
    fn default() -> Self {
        Self::NoAccess
    }
}

impl SecLevel {
    /// Returns the stack's (security mode, level) pair.
    #[inline]
    #[must_use]
    pub const fn mode(self) -> (u8, u8) {
        match self {
            Self::NoAccess => (0, 0),
            lv => (1, lv as u8),
        }
    }

    /// Returns whether a link at security level `link` satisfies `self`.
    #[inline]
    #[must_use]
    pub const fn allows(self, link: Self) -> bool {
        !matches!(self, Self::NoAccess) && self as u8 <= link as u8
    }
}

/// Read and write security requirements of an attribute.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[must_use]
pub struct Perms {
    pub read: SecLevel,
    pub write: SecLevel,
}

impl Perms {
    /// No access in either direction.
    pub const NONE: Self = Self::new(SecLevel::NoAccess, SecLevel::NoAccess);
    /// Open read and write access.
    pub const OPEN: Self = Self::new(SecLevel::Open, SecLevel::Open);

    /// Creates a permission set.
    #[inline]
    pub const fn new(read: SecLevel, write: SecLevel) -> Self {
        Self { read, write }
    }

    /// Creates a read-only permission set.
    #[inline]
    pub const fn read_only(read: SecLevel) -> Self {
        Self::new(read, SecLevel::NoAccess)
    }

    /// Tests whether a read (`write == false`) or write request over a link
    /// with security level `link` should be allowed.
    pub const fn test(self, write: bool, link: SecLevel) -> Result<(), ErrorCode> {
        use ErrorCode::*;
        let need = if write { self.write } else { self.read };
        if matches!(need, SecLevel::NoAccess) {
            return Err(if write {
                WriteNotPermitted
            } else {
                ReadNotPermitted
            });
        }
        if need.allows(link) {
            Ok(())
        } else if (link as u8) < SecLevel::Encrypted as u8 {
            Err(InsufficientEncryption)
        } else {
            Err(InsufficientAuthentication)
        }
    }
}

impl From<SecLevel> for Perms {
    /// Returns a permission set with the same level for reads and writes.
    #[inline]
    fn from(lv: SecLevel) -> Self {
        Self::new(lv, lv)
    }
}
