//! In-memory stack for tests and host-side demos.
//!
//! [`SimStack`] implements [`Stack`] over a plain attribute table and plays the
//! role of the peer: it produces the events that a real stack would deliver
//! for connects, client writes, and transmit completions.

use std::collections::VecDeque;

use tracing::trace;

use crate::consts::{Cccd, ErrorCode, HvxType, Prop, ServiceKind, WriteOp};
use crate::event::{StackEvent, Write};
use crate::handle::{CharHandles, ConnHandle, Handle};
use crate::perm::{Perms, SecLevel};
use crate::stack::{CharAttr, HvxParams, Result, Stack, StackError};
use crate::uuid::{ShortUuid, Uuid, UuidType};

/// First handle available to the application. Lower handles belong to the
/// GAP and GATT services.
const FIRST_HANDLE: u16 = 0x000C;

/// Number of vendor bases the simulated stack can hold.
const MAX_BASES: usize = 8;

/// Recorded HVX call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HvxCall {
    pub conn: ConnHandle,
    pub handle: Handle,
    pub typ: HvxType,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug)]
enum Attr {
    Service,
    Decl,
    Value {
        props: Prop,
        perms: Perms,
        max_len: u16,
        val: Vec<u8>,
    },
    Cccd {
        chr: Handle,
        write: SecLevel,
    },
}

#[derive(Clone, Debug)]
struct Link {
    conn: ConnHandle,
    sec: SecLevel,
    queued: u8,
    indicating: Option<Handle>,
    cccd: Vec<(Handle, Cccd)>,
}

impl Link {
    fn cccd(&self, chr: Handle) -> Cccd {
        (self.cccd.iter())
            .find_map(|&(h, v)| (h == chr).then_some(v))
            .unwrap_or_default()
    }
}

/// Simulated vendor stack.
#[derive(Debug)]
pub struct SimStack {
    cap: usize,
    attrs: Vec<Attr>,
    bases: Vec<Uuid>,
    open_svc: Option<Handle>,
    links: Vec<Link>,
    queue_size: u8,
    strict: bool,
    fail: VecDeque<StackError>,
    calls: Vec<HvxCall>,
}

impl SimStack {
    /// Creates a stack with room for 256 attributes.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Creates a stack with room for `n` attributes.
    #[must_use]
    pub fn with_capacity(n: u16) -> Self {
        Self {
            cap: usize::from(n),
            attrs: Vec::new(),
            bases: Vec::new(),
            open_svc: None,
            links: Vec::new(),
            queue_size: 8,
            strict: false,
            fail: VecDeque::new(),
            calls: Vec::new(),
        }
    }

    /// Rejects notifications and indications that the client has not enabled
    /// via the CCCD.
    #[inline]
    #[must_use]
    pub const fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Sets the number of notifications that can be queued per link before
    /// a TX-complete event.
    #[inline]
    #[must_use]
    pub const fn queue_size(mut self, n: u8) -> Self {
        self.queue_size = n;
        self
    }

    /// Returns the number of registered vendor bases.
    #[inline]
    #[must_use]
    pub fn vendor_bases(&self) -> usize {
        self.bases.len()
    }

    /// Returns the number of attributes in the table.
    #[inline]
    #[must_use]
    pub fn attr_count(&self) -> usize {
        self.attrs.len()
    }

    /// Returns all HVX calls, including failed ones.
    #[inline]
    #[must_use]
    pub fn hvx_calls(&self) -> &[HvxCall] {
        &self.calls
    }

    /// Makes the next HVX call fail with `e`. Multiple failures are consumed
    /// in order.
    #[inline]
    pub fn fail_next_hvx(&mut self, e: StackError) {
        self.fail.push_back(e);
    }

    /// Returns the value stored in the stack for characteristic `hdl`.
    #[must_use]
    pub fn value(&self, hdl: Handle) -> Option<&[u8]> {
        match self.attr(hdl) {
            Some(Attr::Value { val, .. }) => Some(val.as_slice()),
            _ => None,
        }
    }

    /// Establishes a link.
    pub fn connect(&mut self, conn: ConnHandle) -> StackEvent<'static> {
        self.links.retain(|l| l.conn != conn);
        self.links.push(Link {
            conn,
            sec: SecLevel::Open,
            queued: 0,
            indicating: None,
            cccd: Vec::new(),
        });
        StackEvent::Connected { conn }
    }

    /// Terminates a link.
    pub fn disconnect(&mut self, conn: ConnHandle, reason: u8) -> StackEvent<'static> {
        self.links.retain(|l| l.conn != conn);
        StackEvent::Disconnected { conn, reason }
    }

    /// Sets link security level.
    pub fn set_security(&mut self, conn: ConnHandle, sec: SecLevel) {
        if let Some(l) = self.link_mut(conn) {
            l.sec = sec;
        }
    }

    /// Transmits all queued notifications on link `conn`.
    pub fn tx_complete(&mut self, conn: ConnHandle) -> Option<StackEvent<'static>> {
        let l = self.link_mut(conn)?;
        let count = std::mem::take(&mut l.queued);
        (count > 0).then_some(StackEvent::HvnTxComplete { conn, count })
    }

    /// Confirms the pending indication on link `conn`.
    pub fn confirm(&mut self, conn: ConnHandle) -> Option<StackEvent<'static>> {
        let handle = self.link_mut(conn)?.indicating.take()?;
        Some(StackEvent::HvcConfirmed { conn, handle })
    }

    /// Performs a client read.
    pub fn peer_read(&self, conn: ConnHandle, hdl: Handle) -> std::result::Result<&[u8], ErrorCode> {
        let l = self.link(conn).ok_or(ErrorCode::InvalidHandle)?;
        match self.attr(hdl) {
            Some(Attr::Value {
                props, perms, val, ..
            }) => {
                if !props.contains(Prop::READ) {
                    return Err(ErrorCode::ReadNotPermitted);
                }
                perms.test(false, l.sec)?;
                Ok(val.as_slice())
            }
            Some(_) => Err(ErrorCode::ReadNotPermitted),
            None => Err(ErrorCode::InvalidHandle),
        }
    }

    /// Performs a client Write Request and returns the resulting event.
    pub fn peer_write<'a>(
        &mut self,
        conn: ConnHandle,
        hdl: Handle,
        data: &'a [u8],
    ) -> std::result::Result<StackEvent<'a>, ErrorCode> {
        let sec = self.link(conn).ok_or(ErrorCode::InvalidHandle)?.sec;
        let i = self.index(hdl).ok_or(ErrorCode::InvalidHandle)?;
        let sub = match self.attrs[i] {
            Attr::Value {
                props,
                perms,
                max_len,
                ref mut val,
            } => {
                if !props.intersects(Prop::ANY_WRITE) {
                    return Err(ErrorCode::WriteNotPermitted);
                }
                perms.test(true, sec)?;
                if data.len() > usize::from(max_len) {
                    return Err(ErrorCode::InvalidAttributeValueLength);
                }
                val.clear();
                val.extend_from_slice(data);
                None
            }
            Attr::Cccd { chr, write } => {
                Perms::new(SecLevel::Open, write).test(true, sec)?;
                let v = (Cccd::from_value(data))
                    .filter(|_| data.len() == 2)
                    .ok_or(ErrorCode::InvalidAttributeValueLength)?;
                Some((chr, v))
            }
            Attr::Service | Attr::Decl => return Err(ErrorCode::WriteNotPermitted),
        };
        if let (Some((chr, v)), Some(l)) = (sub, self.link_mut(conn)) {
            l.cccd.retain(|&(h, _)| h != chr);
            l.cccd.push((chr, v));
        }
        trace!("Peer write to {hdl} on {conn}: {data:02X?}");
        Ok(StackEvent::Write(Write {
            conn,
            handle: hdl,
            op: WriteOp::WriteReq,
            offset: 0,
            data,
        }))
    }

    fn link(&self, conn: ConnHandle) -> Option<&Link> {
        self.links.iter().find(|l| l.conn == conn)
    }

    fn link_mut(&mut self, conn: ConnHandle) -> Option<&mut Link> {
        self.links.iter_mut().find(|l| l.conn == conn)
    }

    fn index(&self, hdl: Handle) -> Option<usize> {
        let i = usize::from(u16::from(hdl).checked_sub(FIRST_HANDLE)?);
        (i < self.attrs.len()).then_some(i)
    }

    fn attr(&self, hdl: Handle) -> Option<&Attr> {
        self.index(hdl).map(|i| &self.attrs[i])
    }

    /// Appends an attribute and returns its handle.
    fn push(&mut self, a: Attr) -> Result<Handle> {
        let h = u16::try_from(self.attrs.len())
            .ok()
            .and_then(|i| Handle::new(FIRST_HANDLE.checked_add(i)?))
            .ok_or(StackError::NoMem)?;
        self.attrs.push(a);
        Ok(h)
    }

    fn check_uuid(&self, u: ShortUuid) -> Result<()> {
        let known = u.typ == UuidType::SIG
            || (u.typ.is_vendor()
                && usize::from(u8::from(u.typ) - u8::from(UuidType::VENDOR_BEGIN)) < self.bases.len());
        if known {
            Ok(())
        } else {
            Err(StackError::NotFound)
        }
    }

    fn reserve(&self, n: usize) -> Result<()> {
        if self.attrs.len() + n > self.cap {
            return Err(StackError::NoMem);
        }
        Ok(())
    }
}

impl Default for SimStack {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Stack for SimStack {
    fn uuid_vs_add(&mut self, base: Uuid) -> Result<UuidType> {
        let i = match self.bases.iter().position(|&b| b == base) {
            Some(i) => i,
            None if self.bases.len() >= MAX_BASES => return Err(StackError::NoMem),
            None => {
                self.bases.push(base);
                self.bases.len() - 1
            }
        };
        let i = u8::try_from(i).map_err(|_| StackError::NoMem)?;
        Ok(UuidType::from_raw(u8::from(UuidType::VENDOR_BEGIN) + i))
    }

    fn service_add(&mut self, kind: ServiceKind, uuid: ShortUuid) -> Result<Handle> {
        self.check_uuid(uuid)?;
        self.reserve(1)?;
        let h = self.push(Attr::Service)?;
        trace!("Sim: {kind:?} service {uuid} at {h}");
        self.open_svc = Some(h);
        Ok(h)
    }

    fn characteristic_add(&mut self, svc: Handle, attr: &CharAttr<'_>) -> Result<CharHandles> {
        if self.open_svc != Some(svc) {
            return Err(StackError::InvalidState);
        }
        self.check_uuid(attr.uuid)?;
        if attr.value.len() > usize::from(attr.max_len) {
            return Err(StackError::InvalidLength);
        }
        self.reserve(2 + usize::from(attr.cccd.is_some()))?;
        self.push(Attr::Decl)?;
        let value = self.push(Attr::Value {
            props: attr.props,
            perms: attr.perms,
            max_len: attr.max_len,
            val: attr.value.to_vec(),
        })?;
        let cccd = match attr.cccd {
            Some(write) => Some(self.push(Attr::Cccd { chr: value, write })?),
            None => None,
        };
        Ok(CharHandles { value, cccd })
    }

    fn hvx(&mut self, conn: ConnHandle, p: &HvxParams<'_>) -> Result<u16> {
        self.calls.push(HvxCall {
            conn,
            handle: p.handle,
            typ: p.typ,
            data: p.data.to_vec(),
        });
        if let Some(e) = self.fail.pop_front() {
            return Err(e);
        }
        let (strict, queue_size) = (self.strict, self.queue_size);
        let i = self.index(p.handle).ok_or(StackError::InvalidAttrHandle)?;
        let Attr::Value {
            props, max_len, ..
        } = self.attrs[i]
        else {
            return Err(StackError::InvalidAttrHandle);
        };
        if p.data.len() > usize::from(max_len) {
            return Err(StackError::DataSize);
        }
        let l = self.link_mut(conn).ok_or(StackError::InvalidConnHandle)?;
        let (need, prop) = match p.typ {
            HvxType::Notification => (Cccd::NOTIFY, Prop::NOTIFY),
            HvxType::Indication => (Cccd::INDICATE, Prop::INDICATE),
        };
        if !props.contains(prop) || (strict && !l.cccd(p.handle).contains(need)) {
            return Err(StackError::InvalidState);
        }
        match p.typ {
            HvxType::Notification if l.queued >= queue_size => return Err(StackError::Resources),
            HvxType::Notification => l.queued += 1,
            HvxType::Indication if l.indicating.is_some() => return Err(StackError::Busy),
            HvxType::Indication => l.indicating = Some(p.handle),
        }
        if let Attr::Value { ref mut val, .. } = self.attrs[i] {
            val.clear();
            val.extend_from_slice(p.data);
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(p.data.len() as u16)
    }
}
