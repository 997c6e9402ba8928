//! Interface to the vendor BLE stack.
//!
//! The stack owns the radio, the attribute table, per-connection CCCD storage,
//! and the notification queue. This crate only drives it through the
//! synchronous calls of the [`Stack`] trait. Every call must return promptly;
//! implementations must not block waiting for the link layer.

use tracing::warn;

use crate::consts::{HvxType, Prop, ServiceKind, Vloc};
use crate::handle::{CharHandles, ConnHandle, Handle};
use crate::perm::{Perms, SecLevel};
use crate::util::impl_display_via_debug;
use crate::uuid::{ShortUuid, Uuid, UuidType};

/// Status codes returned by the stack.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    thiserror::Error,
)]
#[non_exhaustive]
#[repr(u32)]
pub enum StackError {
    Internal = 0x0003,
    NoMem = 0x0004,
    NotFound = 0x0005,
    NotSupported = 0x0006,
    InvalidParam = 0x0007,
    InvalidState = 0x0008,
    InvalidLength = 0x0009,
    InvalidFlags = 0x000A,
    DataSize = 0x000C,
    Forbidden = 0x000F,
    InvalidAddr = 0x0010,
    Busy = 0x0011,
    /// The notification queue is full. Retry after a TX-complete event.
    Resources = 0x0013,
    InvalidConnHandle = 0x3001,
    InvalidAttrHandle = 0x3002,
    /// CCCD storage for the connection has not been initialized, which the
    /// stack reports when the client has not subscribed.
    SysAttrMissing = 0x3401,
}

impl_display_via_debug! { StackError }

impl StackError {
    /// Converts a raw status code into a result. Unknown non-zero codes are
    /// reported as [`StackError::Internal`].
    pub fn check(code: u32) -> Result<()> {
        if code == 0 {
            return Ok(());
        }
        Err(Self::try_from(code).unwrap_or_else(|_| {
            warn!("Unknown stack status code: {code:#06X}");
            Self::Internal
        }))
    }
}

/// Common stack result type.
pub type Result<T> = std::result::Result<T, StackError>;

/// Characteristic definition as submitted to the stack.
#[derive(Clone, Copy, Debug)]
pub struct CharAttr<'a> {
    pub uuid: ShortUuid,
    pub props: Prop,
    pub perms: Perms,
    /// CCCD security requirement. The CCCD is always readable without
    /// security ([Vol 3] Part G, Section 3.3.3.3), so this only applies to
    /// writes.
    pub cccd: Option<SecLevel>,
    pub vloc: Vloc,
    pub vlen: bool,
    pub max_len: u16,
    pub value: &'a [u8],
}

/// Handle Value Notification or Indication parameters.
#[derive(Clone, Copy, Debug)]
pub struct HvxParams<'a> {
    pub handle: Handle,
    pub typ: HvxType,
    pub offset: u16,
    pub data: &'a [u8],
}

/// Synchronous calls into the vendor stack.
pub trait Stack {
    /// Adds a 128-bit vendor base to the stack's UUID table and returns its
    /// type tag. The 16-bit alias bytes of `base` are ignored.
    fn uuid_vs_add(&mut self, base: Uuid) -> Result<UuidType>;

    /// Adds a service declaration and returns its handle.
    fn service_add(&mut self, kind: ServiceKind, uuid: ShortUuid) -> Result<Handle>;

    /// Adds a characteristic to the most recently added service.
    fn characteristic_add(&mut self, svc: Handle, attr: &CharAttr<'_>) -> Result<CharHandles>;

    /// Submits a notification or indication and returns the number of bytes
    /// that were queued.
    fn hvx(&mut self, conn: ConnHandle, p: &HvxParams<'_>) -> Result<u16>;
}

impl<T: Stack + ?Sized> Stack for &mut T {
    #[inline(always)]
    fn uuid_vs_add(&mut self, base: Uuid) -> Result<UuidType> {
        (**self).uuid_vs_add(base)
    }

    #[inline(always)]
    fn service_add(&mut self, kind: ServiceKind, uuid: ShortUuid) -> Result<Handle> {
        (**self).service_add(kind, uuid)
    }

    #[inline(always)]
    fn characteristic_add(&mut self, svc: Handle, attr: &CharAttr<'_>) -> Result<CharHandles> {
        (**self).characteristic_add(svc, attr)
    }

    #[inline(always)]
    fn hvx(&mut self, conn: ConnHandle, p: &HvxParams<'_>) -> Result<u16> {
        (**self).hvx(conn, p)
    }
}
