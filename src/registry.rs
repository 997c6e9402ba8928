//! Attribute table registration.
//!
//! The stack builds its attribute table sequentially: a service declaration is
//! followed by all of its characteristics before the next service may be
//! opened. [`Registry`] enforces that order, validates characteristic
//! definitions before they reach the stack, accounts for the finite number of
//! table slots, and keeps a local mirror of every registered characteristic
//! that the event and notification paths consult later.

use std::collections::BTreeMap;

use smallvec::SmallVec;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::consts::{ErrorCode, Prop, ServiceKind, Vloc};
use crate::handle::{CharHandles, Handle};
use crate::perm::{Perms, SecLevel};
use crate::stack::{CharAttr, Stack, StackError};
use crate::uuid::{ShortUuid, Uuid, UuidType};

/// Value storage used by the local characteristic mirror. Values up to the
/// default ATT payload size stay inline.
pub type Value = SmallVec<[u8; 20]>;

/// Error type returned during attribute table construction. Any error leaves
/// the table partially built, so the registry refuses further registration
/// after the first one.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum RegistrationError {
    #[error("invalid vendor base UUID {0}")]
    InvalidUuid(Uuid),
    #[error("vendor UUID table is full")]
    UuidTableFull,
    #[error("no registered base for {0}")]
    UnknownBase(Uuid),
    #[error("attribute table is full")]
    TableFull,
    #[error("{0} is not the most recently registered service")]
    ServiceClosed(Handle),
    #[error("invalid characteristic {uuid:#06X}: {reason}")]
    InvalidChar { uuid: u16, reason: &'static str },
    #[error("stack rejected registration: {0}")]
    Stack(#[from] StackError),
    #[error("registry failed earlier and cannot be used")]
    Poisoned,
}

/// Common registration result type.
pub type Result<T> = std::result::Result<T, RegistrationError>;

/// Registered service.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct ServiceDesc {
    pub handle: Handle,
    pub uuid: Uuid,
    pub short: ShortUuid,
    pub kind: ServiceKind,
}

/// Base UUID selector of a characteristic definition.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum BaseSel {
    /// Same base as the owning service.
    #[default]
    Service,
    /// A previously registered vendor base.
    Vendor(Uuid),
    /// Bluetooth SIG base.
    Sig,
}

/// Characteristic definition.
///
/// The default definition has no properties, no access, no CCCD, and a
/// stack-stored fixed-length value. Every property that the client can use
/// must be paired with a matching security requirement.
#[derive(Clone, Debug, Default)]
#[must_use]
pub struct CharDesc {
    uuid: u16,
    base: BaseSel,
    props: Prop,
    perms: Perms,
    cccd: Option<SecLevel>,
    vloc: Vloc,
    vlen: bool,
    max_len: u16,
    value: Value,
}

impl CharDesc {
    /// Creates a characteristic whose 16-bit alias uses the owning service's
    /// base.
    #[inline]
    pub fn new(uuid: u16) -> Self {
        Self {
            uuid,
            ..Self::default()
        }
    }

    /// Creates a characteristic with an assigned Bluetooth SIG UUID.
    #[inline]
    pub fn sig(uuid: u16) -> Self {
        Self {
            uuid,
            base: BaseSel::Sig,
            ..Self::default()
        }
    }

    /// Uses a different, previously registered, vendor base.
    #[inline]
    pub fn base(mut self, base: Uuid) -> Self {
        self.base = BaseSel::Vendor(base);
        self
    }

    /// Sets characteristic properties.
    #[inline]
    pub fn props(mut self, props: Prop) -> Self {
        self.props = props;
        self
    }

    /// Sets value read and write security.
    #[inline]
    pub fn perms(mut self, perms: impl Into<Perms>) -> Self {
        self.perms = perms.into();
        self
    }

    /// Sets value read security.
    #[inline]
    pub fn read(mut self, lv: SecLevel) -> Self {
        self.perms.read = lv;
        self
    }

    /// Sets value write security.
    #[inline]
    pub fn write(mut self, lv: SecLevel) -> Self {
        self.perms.write = lv;
        self
    }

    /// Adds a Client Characteristic Configuration descriptor with the
    /// specified write security.
    #[inline]
    pub fn cccd(mut self, write: SecLevel) -> Self {
        self.cccd = Some(write);
        self
    }

    /// Sets value storage location.
    #[inline]
    pub fn vloc(mut self, vloc: Vloc) -> Self {
        self.vloc = vloc;
        self
    }

    /// Allows value lengths below `max_len`.
    #[inline]
    pub fn vlen(mut self, vlen: bool) -> Self {
        self.vlen = vlen;
        self
    }

    /// Sets maximum value length.
    #[inline]
    pub fn max_len(mut self, n: u16) -> Self {
        self.max_len = n;
        self
    }

    /// Sets the initial value.
    #[inline]
    pub fn value(mut self, v: impl AsRef<[u8]>) -> Self {
        self.value = Value::from_slice(v.as_ref());
        self
    }

    /// Checks property, security, and length invariants.
    fn validate(&self, ceiling: u16) -> Result<()> {
        let err = |reason| {
            Err(RegistrationError::InvalidChar {
                uuid: self.uuid,
                reason,
            })
        };
        if self.props.is_empty() {
            return err("no properties");
        }
        if self.props.intersects(Prop::SERVER_INITIATED) && self.cccd.is_none() {
            return err("NOTIFY or INDICATE requires a CCCD");
        }
        if self.cccd.is_some() && !self.props.intersects(Prop::SERVER_INITIATED) {
            return err("CCCD requires NOTIFY or INDICATE");
        }
        if self.cccd == Some(SecLevel::NoAccess) {
            return err("CCCD must be writable");
        }
        if self.props.contains(Prop::READ) && self.perms.read == SecLevel::NoAccess {
            return err("READ property without read access");
        }
        if self.props.intersects(Prop::ANY_WRITE) && self.perms.write == SecLevel::NoAccess {
            return err("write property without write access");
        }
        if self.max_len == 0 {
            return err("zero max_len");
        }
        if self.max_len > ceiling {
            return err("max_len exceeds stack limit");
        }
        if self.value.len() > usize::from(self.max_len) {
            return err("initial value longer than max_len");
        }
        Ok(())
    }
}

/// Registered characteristic and its current value.
#[derive(Clone, Debug)]
pub struct CharEntry {
    svc: Handle,
    uuid: Uuid,
    props: Prop,
    perms: Perms,
    vloc: Vloc,
    vlen: bool,
    max_len: u16,
    handles: CharHandles,
    val: Value,
}

impl CharEntry {
    /// Returns the owning service handle.
    #[inline(always)]
    #[must_use]
    pub const fn service(&self) -> Handle {
        self.svc
    }

    /// Returns the full 128-bit UUID.
    #[inline(always)]
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[inline(always)]
    #[must_use]
    pub const fn props(&self) -> Prop {
        self.props
    }

    #[inline(always)]
    pub const fn perms(&self) -> Perms {
        self.perms
    }

    #[inline(always)]
    #[must_use]
    pub const fn vloc(&self) -> Vloc {
        self.vloc
    }

    /// Returns whether the value length may be below `max_len`.
    #[inline(always)]
    #[must_use]
    pub const fn is_vlen(&self) -> bool {
        self.vlen
    }

    #[inline(always)]
    #[must_use]
    pub const fn max_len(&self) -> u16 {
        self.max_len
    }

    #[inline(always)]
    #[must_use]
    pub const fn handles(&self) -> CharHandles {
        self.handles
    }

    /// Returns the current value.
    #[inline(always)]
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.val
    }

    /// Replaces the current value after a successful publish.
    pub(crate) fn set(&mut self, v: &[u8]) {
        self.val.clear();
        self.val.extend_from_slice(v);
        if !self.vlen {
            self.val.resize(usize::from(self.max_len), 0);
        }
    }

    /// Applies a client write at offset `off`. Variable-length values are
    /// truncated at the end of the write; fixed-length values keep their
    /// length.
    pub(crate) fn write(&mut self, off: u16, v: &[u8]) -> std::result::Result<(), ErrorCode> {
        let off = usize::from(off);
        let end = off + v.len();
        if off > self.val.len() {
            return Err(ErrorCode::InvalidOffset);
        }
        if end > usize::from(self.max_len) {
            return Err(ErrorCode::InvalidAttributeValueLength);
        }
        if self.vlen || end > self.val.len() {
            self.val.resize(end, 0);
        }
        self.val[off..end].copy_from_slice(v);
        Ok(())
    }
}

/// Attribute table builder and registry of everything it produced.
#[derive(Debug)]
pub struct Registry {
    cfg: Config,
    bases: SmallVec<[(Uuid, UuidType); 4]>,
    svcs: Vec<ServiceDesc>,
    chars: BTreeMap<Handle, CharEntry>,
    cccds: BTreeMap<Handle, Handle>,
    slots: u16,
    poisoned: bool,
}

impl Registry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            bases: SmallVec::new(),
            svcs: Vec::new(),
            chars: BTreeMap::new(),
            cccds: BTreeMap::new(),
            slots: 0,
            poisoned: false,
        }
    }

    /// Registers a 128-bit vendor base and returns its stack-assigned type.
    /// Registering the same base again returns the existing type.
    pub fn register_base(&mut self, stack: &mut impl Stack, uuid: Uuid) -> Result<UuidType> {
        self.check()?;
        let r = self.add_base(stack, uuid);
        self.poison_on_err(r)
    }

    /// Registers a service whose UUID is `alias` placed into `base`. The base
    /// is registered first if it has not been already.
    pub fn register_service(
        &mut self,
        stack: &mut impl Stack,
        base: Uuid,
        alias: u16,
        kind: ServiceKind,
    ) -> Result<Handle> {
        self.check()?;
        let r = self.add_service(stack, base, alias, kind);
        self.poison_on_err(r)
    }

    /// Adds a characteristic to service `svc`, which must be the most recently
    /// registered service.
    pub fn add_characteristic(
        &mut self,
        stack: &mut impl Stack,
        svc: Handle,
        desc: CharDesc,
    ) -> Result<CharHandles> {
        self.check()?;
        let r = self.add_char(stack, svc, desc);
        self.poison_on_err(r)
    }

    /// Defines a primary service and calls `chars` to add its
    /// characteristics.
    #[inline]
    pub fn primary_service<S: Stack, T>(
        &mut self,
        stack: &mut S,
        base: Uuid,
        alias: u16,
        chars: impl FnOnce(&mut ServiceDef<'_, S>) -> Result<T>,
    ) -> Result<(Handle, T)> {
        self.service_def(stack, base, alias, ServiceKind::Primary, chars)
    }

    /// Defines a secondary service and calls `chars` to add its
    /// characteristics.
    #[inline]
    pub fn secondary_service<S: Stack, T>(
        &mut self,
        stack: &mut S,
        base: Uuid,
        alias: u16,
        chars: impl FnOnce(&mut ServiceDef<'_, S>) -> Result<T>,
    ) -> Result<(Handle, T)> {
        self.service_def(stack, base, alias, ServiceKind::Secondary, chars)
    }

    /// Returns the registered services in registration order.
    #[inline]
    pub fn services(&self) -> impl Iterator<Item = &ServiceDesc> {
        self.svcs.iter()
    }

    /// Returns the service with handle `hdl`.
    #[inline]
    #[must_use]
    pub fn service(&self, hdl: Handle) -> Option<&ServiceDesc> {
        self.svcs.iter().find(|s| s.handle == hdl)
    }

    /// Returns the characteristic with value handle `hdl`.
    #[inline]
    #[must_use]
    pub fn characteristic(&self, hdl: Handle) -> Option<&CharEntry> {
        self.chars.get(&hdl)
    }

    #[inline]
    pub(crate) fn characteristic_mut(&mut self, hdl: Handle) -> Option<&mut CharEntry> {
        self.chars.get_mut(&hdl)
    }

    /// Returns the value handle of the characteristic that owns CCCD `hdl`.
    #[inline]
    #[must_use]
    pub fn cccd_owner(&self, hdl: Handle) -> Option<Handle> {
        self.cccds.get(&hdl).copied()
    }

    /// Returns the current value of characteristic `hdl`.
    #[inline]
    #[must_use]
    pub fn value(&self, hdl: Handle) -> Option<&[u8]> {
        self.chars.get(&hdl).map(CharEntry::value)
    }

    /// Returns the number of unused attribute table slots.
    #[inline]
    #[must_use]
    pub const fn free_slots(&self) -> u16 {
        self.cfg.attr_table_size.saturating_sub(self.slots)
    }

    /// Logs registry contents.
    pub fn dump(&self) {
        info!("Attribute table ({} slots free):", self.free_slots());
        for s in &self.svcs {
            info!(
                "[{:#06X}] {:?} service <{}> ({})",
                u16::from(s.handle),
                s.kind,
                s.uuid,
                s.short,
            );
            for (hdl, c) in self.chars.iter().filter(|(_, c)| c.svc == s.handle) {
                info!(
                    "[{:#06X}] |__ Characteristic <{}> {:?} max_len={}{}",
                    u16::from(*hdl),
                    c.uuid,
                    c.props,
                    c.max_len,
                    c.handles
                        .cccd
                        .map_or_else(String::new, |h| format!(" cccd={:#06X}", u16::from(h))),
                );
            }
        }
    }

    fn service_def<S: Stack, T>(
        &mut self,
        stack: &mut S,
        base: Uuid,
        alias: u16,
        kind: ServiceKind,
        chars: impl FnOnce(&mut ServiceDef<'_, S>) -> Result<T>,
    ) -> Result<(Handle, T)> {
        let hdl = self.register_service(stack, base, alias, kind)?;
        let v = chars(&mut ServiceDef {
            reg: self,
            stack,
            hdl,
        })?;
        Ok((hdl, v))
    }

    fn add_base(&mut self, stack: &mut impl Stack, uuid: Uuid) -> Result<UuidType> {
        let base = match uuid.base() {
            Some(b) if !b.is_sig() => b,
            _ => return Err(RegistrationError::InvalidUuid(uuid)),
        };
        if let Some(typ) = self.find_base(base) {
            return Ok(typ);
        }
        if self.bases.len() >= usize::from(self.cfg.max_vendor_uuids) {
            return Err(RegistrationError::UuidTableFull);
        }
        let typ = stack.uuid_vs_add(base).map_err(|e| match e {
            StackError::NoMem => RegistrationError::UuidTableFull,
            e => RegistrationError::Stack(e),
        })?;
        debug!("Registered vendor base <{base}> as {typ}");
        self.bases.push((base, typ));
        Ok(typ)
    }

    fn add_service(
        &mut self,
        stack: &mut impl Stack,
        base: Uuid,
        alias: u16,
        kind: ServiceKind,
    ) -> Result<Handle> {
        let typ = self.add_base(stack, base)?;
        self.reserve(1)?;
        let short = ShortUuid::new(alias, typ);
        let handle = stack.service_add(kind, short).map_err(table_err)?;
        self.slots += 1;
        let uuid = base.with_alias(alias);
        debug!("Registered {kind:?} service <{uuid}> ({short}) at {handle}");
        self.svcs.push(ServiceDesc {
            handle,
            uuid,
            short,
            kind,
        });
        Ok(handle)
    }

    fn add_char(
        &mut self,
        stack: &mut impl Stack,
        svc: Handle,
        desc: CharDesc,
    ) -> Result<CharHandles> {
        let Some(open) = self.svcs.last().copied() else {
            return Err(RegistrationError::ServiceClosed(svc));
        };
        if open.handle != svc {
            return Err(RegistrationError::ServiceClosed(svc));
        }
        desc.validate(self.cfg.max_attr_len)?;
        let (short, uuid) = match desc.base {
            BaseSel::Service => {
                let base = open.uuid.base().unwrap_or(open.uuid);
                (ShortUuid::new(desc.uuid, open.short.typ), base.with_alias(desc.uuid))
            }
            BaseSel::Vendor(b) => {
                let base = b.base().unwrap_or(b);
                let typ = (self.find_base(base)).ok_or(RegistrationError::UnknownBase(b))?;
                (ShortUuid::new(desc.uuid, typ), base.with_alias(desc.uuid))
            }
            BaseSel::Sig => (
                ShortUuid::new(desc.uuid, UuidType::SIG),
                Uuid::sig(desc.uuid).ok_or(RegistrationError::InvalidChar {
                    uuid: desc.uuid,
                    reason: "zero SIG UUID",
                })?,
            ),
        };
        // Declaration and value, plus the CCCD
        let need = 2 + u16::from(desc.cccd.is_some());
        self.reserve(need)?;

        let mut val = desc.value;
        if !desc.vlen {
            val.resize(usize::from(desc.max_len), 0);
        }
        let attr = CharAttr {
            uuid: short,
            props: desc.props,
            perms: desc.perms,
            cccd: desc.cccd,
            vloc: desc.vloc,
            vlen: desc.vlen,
            max_len: desc.max_len,
            value: &val,
        };
        let handles = stack.characteristic_add(svc, &attr).map_err(table_err)?;
        if handles.cccd.is_some() != desc.cccd.is_some() {
            error!("Stack returned {handles:?} for a characteristic with cccd={:?}", desc.cccd);
            return Err(RegistrationError::Stack(StackError::Internal));
        }
        self.slots += need;
        debug!(
            "Registered characteristic <{uuid}> ({short}) {:?} at {}",
            desc.props, handles.value
        );
        if let Some(cccd) = handles.cccd {
            self.cccds.insert(cccd, handles.value);
        }
        self.chars.insert(
            handles.value,
            CharEntry {
                svc,
                uuid,
                props: desc.props,
                perms: desc.perms,
                vloc: desc.vloc,
                vlen: desc.vlen,
                max_len: desc.max_len,
                handles,
                val,
            },
        );
        Ok(handles)
    }

    fn find_base(&self, base: Uuid) -> Option<UuidType> {
        (self.bases.iter()).find_map(|&(b, t)| (b == base).then_some(t))
    }

    /// Ensures that `n` attribute table slots are available.
    fn reserve(&self, n: u16) -> Result<()> {
        if self.free_slots() < n {
            return Err(RegistrationError::TableFull);
        }
        Ok(())
    }

    #[inline]
    fn check(&self) -> Result<()> {
        if self.poisoned {
            return Err(RegistrationError::Poisoned);
        }
        Ok(())
    }

    #[inline]
    fn poison_on_err<T>(&mut self, r: Result<T>) -> Result<T> {
        if let Err(ref e) = r {
            warn!("Registration failed: {e}");
            self.poisoned = true;
        }
        r
    }
}

/// Service definition scope passed to [`Registry::primary_service`] and
/// [`Registry::secondary_service`].
#[derive(Debug)]
pub struct ServiceDef<'a, S> {
    reg: &'a mut Registry,
    stack: &'a mut S,
    hdl: Handle,
}

impl<S: Stack> ServiceDef<'_, S> {
    /// Returns the service handle.
    #[inline(always)]
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.hdl
    }

    /// Adds a characteristic to this service.
    #[inline]
    pub fn characteristic(&mut self, desc: CharDesc) -> Result<CharHandles> {
        self.reg.add_characteristic(&mut *self.stack, self.hdl, desc)
    }
}

/// Maps characteristic and service registration failures.
fn table_err(e: StackError) -> RegistrationError {
    match e {
        StackError::NoMem => RegistrationError::TableFull,
        e => RegistrationError::Stack(e),
    }
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;

    use crate::sim::SimStack;

    use super::*;

    const BASE: u128 = 0xF364_0000_0000_4B1B_8C9B_A4B2_9A3D_4E54;

    fn base() -> Uuid {
        Uuid::new(BASE).unwrap()
    }

    fn notify_char() -> CharDesc {
        CharDesc::new(0xBEEF)
            .props(Prop::READ | Prop::WRITE | Prop::NOTIFY)
            .perms(SecLevel::Open)
            .cccd(SecLevel::Open)
            .max_len(4)
            .value([0x12, 0x34, 0x56, 0x78])
    }

    #[test]
    fn reference_service() {
        let mut stack = SimStack::new();
        let mut reg = Registry::new(Config::default());
        let (svc, chr) = reg
            .primary_service(&mut stack, base(), 0xABCD, |s| s.characteristic(notify_char()))
            .unwrap();
        let s = reg.service(svc).unwrap();
        assert_eq!(s.short, ShortUuid::new(0xABCD, UuidType::VENDOR_BEGIN));
        assert_eq!(s.uuid.alias(), 0xABCD);
        assert_eq!(s.kind, ServiceKind::Primary);

        let c = reg.characteristic(chr.value).unwrap();
        assert_eq!(c.uuid(), base().with_alias(0xBEEF));
        assert_eq!(c.value(), &[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(reg.cccd_owner(chr.cccd.unwrap()), Some(chr.value));
        assert_eq!(reg.free_slots(), 64 - 4);
        reg.dump();
    }

    #[test]
    fn base_reuse() {
        let mut stack = SimStack::new();
        let mut reg = Registry::new(Config::default());
        let a = reg.register_base(&mut stack, base()).unwrap();
        let b = reg.register_base(&mut stack, base().with_alias(0x1234)).unwrap();
        assert_eq!(a, b);
        assert_eq!(stack.vendor_bases(), 1);
    }

    #[test]
    fn invalid_base() {
        let mut stack = SimStack::new();
        let mut reg = Registry::new(Config::default());
        let sig = Uuid::sig(0x180F).unwrap();
        assert_matches!(
            reg.register_base(&mut stack, sig),
            Err(RegistrationError::InvalidUuid(_))
        );
        // Fail-fast
        assert_matches!(
            reg.register_base(&mut stack, base()),
            Err(RegistrationError::Poisoned)
        );
    }

    #[test]
    fn uuid_table_full() {
        let mut stack = SimStack::new();
        let cfg = Config {
            max_vendor_uuids: 1,
            ..Config::default()
        };
        let mut reg = Registry::new(cfg);
        reg.register_base(&mut stack, base()).unwrap();
        let other = Uuid::new(BASE ^ 1).unwrap();
        assert_eq!(
            reg.register_base(&mut stack, other),
            Err(RegistrationError::UuidTableFull)
        );
    }

    #[test]
    fn unknown_base() {
        let mut stack = SimStack::new();
        let mut reg = Registry::new(Config::default());
        let other = Uuid::new(BASE ^ 1).unwrap();
        let r = reg.primary_service(&mut stack, base(), 0xABCD, |s| {
            s.characteristic(notify_char().base(other))
        });
        assert_eq!(r, Err(RegistrationError::UnknownBase(other)));
    }

    #[test]
    fn notify_without_cccd() {
        let mut stack = SimStack::new();
        let mut reg = Registry::new(Config::default());
        let svc = (reg.register_service(&mut stack, base(), 0xABCD, ServiceKind::Primary)).unwrap();
        let desc = CharDesc::new(0xBEEF)
            .props(Prop::READ | Prop::NOTIFY)
            .perms(SecLevel::Open)
            .max_len(4);
        assert_matches!(
            reg.add_characteristic(&mut stack, svc, desc),
            Err(RegistrationError::InvalidChar { uuid: 0xBEEF, .. })
        );
        assert_eq!(stack.attr_count(), 1);
    }

    #[test]
    fn invalid_chars() {
        fn try_add(desc: CharDesc) -> Result<CharHandles> {
            let mut stack = SimStack::new();
            let mut reg = Registry::new(Config::default());
            let svc = reg.register_service(&mut stack, base(), 1, ServiceKind::Primary)?;
            reg.add_characteristic(&mut stack, svc, desc)
        }
        let ok = notify_char();
        assert!(try_add(ok.clone()).is_ok());
        for desc in [
            ok.clone().props(Prop::empty()),
            ok.clone().props(Prop::READ),
            ok.clone().read(SecLevel::NoAccess),
            ok.clone().write(SecLevel::NoAccess),
            ok.clone().cccd(SecLevel::NoAccess),
            ok.clone().max_len(0),
            ok.clone().max_len(513),
            ok.clone().max_len(2),
        ] {
            assert_matches!(try_add(desc), Err(RegistrationError::InvalidChar { .. }));
        }
    }

    #[test]
    fn ordering() {
        let mut stack = SimStack::new();
        let mut reg = Registry::new(Config::default());
        let s1 = (reg.register_service(&mut stack, base(), 1, ServiceKind::Primary)).unwrap();
        let _s2 = (reg.register_service(&mut stack, base(), 2, ServiceKind::Secondary)).unwrap();
        assert_eq!(
            reg.add_characteristic(&mut stack, s1, notify_char()),
            Err(RegistrationError::ServiceClosed(s1))
        );
    }

    #[test]
    fn table_full() {
        let mut stack = SimStack::new();
        let cfg = Config {
            attr_table_size: 3,
            ..Config::default()
        };
        let mut reg = Registry::new(cfg);
        let svc = (reg.register_service(&mut stack, base(), 1, ServiceKind::Primary)).unwrap();
        assert_eq!(
            reg.add_characteristic(&mut stack, svc, notify_char()),
            Err(RegistrationError::TableFull)
        );
        assert_eq!(stack.attr_count(), 1);
    }

    #[test]
    fn stack_exhaustion() {
        let mut stack = SimStack::with_capacity(2);
        let mut reg = Registry::new(Config::default());
        let svc = (reg.register_service(&mut stack, base(), 1, ServiceKind::Primary)).unwrap();
        assert_eq!(
            reg.add_characteristic(&mut stack, svc, notify_char()),
            Err(RegistrationError::TableFull)
        );
    }

    #[test]
    fn char_writes() {
        let mut stack = SimStack::new();
        let mut reg = Registry::new(Config::default());
        let (_, (fixed, var)) = reg
            .primary_service(&mut stack, base(), 1, |s| {
                let f = s.characteristic(notify_char().value([1]))?;
                let v = s.characteristic(notify_char().vlen(true).value([1, 2]))?;
                Ok((f.value, v.value))
            })
            .unwrap();
        assert_eq!(reg.value(fixed), Some(&[1, 0, 0, 0][..]));
        assert_eq!(reg.value(var), Some(&[1, 2][..]));

        let c = reg.characteristic_mut(fixed).unwrap();
        c.write(2, &[7, 8]).unwrap();
        assert_eq!(c.value(), &[1, 0, 7, 8]);
        assert_eq!(c.write(3, &[7, 8]), Err(ErrorCode::InvalidAttributeValueLength));

        let c = reg.characteristic_mut(var).unwrap();
        c.write(1, &[9]).unwrap();
        assert_eq!(c.value(), &[1, 9]);
        c.write(0, &[3]).unwrap();
        assert_eq!(c.value(), &[3]);
        assert_eq!(c.write(2, &[3]), Err(ErrorCode::InvalidOffset));
    }

    #[test]
    fn sig_characteristic() {
        let mut stack = SimStack::new();
        let mut reg = Registry::new(Config::default());
        let (_, chr) = reg
            .primary_service(&mut stack, base(), 1, |s| {
                s.characteristic(CharDesc::sig(0x2A6E).props(Prop::READ).read(SecLevel::Open).max_len(2))
            })
            .unwrap();
        let c = reg.characteristic(chr.value).unwrap();
        assert!(c.uuid().is_sig());
        assert_eq!(c.uuid().alias(), 0x2A6E);
    }
}
