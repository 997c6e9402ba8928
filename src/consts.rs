#![allow(clippy::use_self)]

use bitflags::bitflags;

use crate::util::impl_display_via_debug;

/// Maximum variable attribute value length supported by the stack
/// ([Vol 3] Part F, Section 3.2.9).
pub const MAX_ATTR_LEN: usize = 512;

bitflags! {
    /// Characteristic properties ([Vol 3] Part G, Section 3.3.1.1).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct Prop: u8 {
        /// Permits broadcasts of the Characteristic Value.
        const BROADCAST = 0x01;
        /// Permits reads of the Characteristic Value.
        const READ = 0x02;
        /// Permits writes of the Characteristic Value without response.
        const WRITE_CMD = 0x04;
        /// Permits writes of the Characteristic Value with response.
        const WRITE = 0x08;
        /// Permits notifications of a Characteristic Value without
        /// acknowledgment. If set, the Client Characteristic Configuration
        /// descriptor shall exist.
        const NOTIFY = 0x10;
        /// Permits indications of a Characteristic Value with acknowledgment.
        /// If set, the Client Characteristic Configuration descriptor shall
        /// exist.
        const INDICATE = 0x20;
        /// Permits signed writes to the Characteristic Value.
        const SIGNED_WRITE_CMD = 0x40;
        /// Additional properties are defined in the Characteristic Extended
        /// Properties descriptor.
        const EXT_PROPS = 0x80;
    }
}

impl Prop {
    /// Properties that require a Client Characteristic Configuration
    /// descriptor.
    pub const SERVER_INITIATED: Self = Self::NOTIFY.union(Self::INDICATE);
    /// Properties that permit any kind of client write.
    pub const ANY_WRITE: Self = Self::WRITE
        .union(Self::WRITE_CMD)
        .union(Self::SIGNED_WRITE_CMD);
}

bitflags! {
    /// Client Characteristic Configuration descriptor value
    /// ([Vol 3] Part G, Section 3.3.3.3).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct Cccd: u16 {
        /// The Characteristic Value shall be notified.
        const NOTIFY = 1 << 0;
        /// The Characteristic Value shall be indicated.
        const INDICATE = 1 << 1;
    }
}

impl Cccd {
    /// Decodes a CCCD value written by the client. Short values are invalid
    /// and reserved bits are ignored.
    #[inline]
    #[must_use]
    pub fn from_value(v: &[u8]) -> Option<Self> {
        let &[lo, hi, ..] = v else { return None };
        Some(Self::from_bits_truncate(u16::from_le_bytes([lo, hi])))
    }
}

/// Service declaration type ([Vol 3] Part G, Section 3.1).
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[repr(u8)]
pub enum ServiceKind {
    Primary = 0x01,
    Secondary = 0x02,
}

/// Location of an attribute value.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[repr(u8)]
pub enum Vloc {
    /// Value is stored in memory owned by the stack.
    Stack = 0x01,
    /// Value is stored in memory owned by the application.
    User = 0x02,
}

impl Default for Vloc {
    #[inline]
    fn default() -> Self {
        Self::Stack
    }
}

/// Handle Value operation type.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[repr(u8)]
pub enum HvxType {
    /// Unacknowledged push ([Vol 3] Part G, Section 4.10).
    Notification = 0x01,
    /// Acknowledged push ([Vol 3] Part G, Section 4.11).
    Indication = 0x02,
}

/// Write operation reported by the stack.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::FromPrimitive,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum WriteOp {
    #[default]
    Invalid = 0x00,
    /// Write Request.
    WriteReq = 0x01,
    /// Write Command.
    WriteCmd = 0x02,
    /// Signed Write Command.
    SignWriteCmd = 0x03,
    /// Prepare Write Request.
    PrepWriteReq = 0x04,
    /// Execute Write Request with queued writes committed.
    ExecWriteReqNow = 0x05,
}

/// ATT error codes used by permission checks
/// ([Vol 3] Part F, Section 3.4.1.1).
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    thiserror::Error,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum ErrorCode {
    /// The attribute handle given was not valid on this server.
    InvalidHandle = 0x01,
    /// The attribute cannot be read.
    ReadNotPermitted = 0x02,
    /// The attribute cannot be written.
    WriteNotPermitted = 0x03,
    /// The attribute requires authentication before it can be read or written.
    InsufficientAuthentication = 0x05,
    /// Offset specified was past the end of the attribute.
    InvalidOffset = 0x07,
    /// The attribute value length is invalid for the operation.
    InvalidAttributeValueLength = 0x0D,
    /// The attribute requires encryption before it can be read or written.
    InsufficientEncryption = 0x0F,
}

impl_display_via_debug! { ErrorCode }
