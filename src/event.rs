//! Stack event routing.
//!
//! The stack delivers events from its event loop one at a time. Each event is
//! passed to [`ServiceCtx::handle_event`] exactly once; the dispatcher updates
//! connection and subscription state and forwards client writes to the
//! application [`Handler`]. Events this service does not care about are
//! ignored without touching any state.

use tracing::{debug, trace, warn};

use crate::consts::{Cccd, WriteOp};
use crate::handle::{ConnHandle, Handle};
use crate::registry::CharEntry;
use crate::service::ServiceCtx;

/// Raw identifier of a GAP Connected event.
pub const EVT_CONNECTED: u16 = 0x10;
/// Raw identifier of a GAP Disconnected event.
pub const EVT_DISCONNECTED: u16 = 0x11;
/// Raw identifier of a GATTS Write event.
pub const EVT_WRITE: u16 = 0x50;
/// Raw identifier of a GATTS Handle Value Confirmation event.
pub const EVT_HVC: u16 = 0x53;
/// Raw identifier of a GATTS Handle Value Notification TX complete event.
pub const EVT_HVN_TX_COMPLETE: u16 = 0x57;

/// Event delivered by the stack.
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug)]
pub enum StackEvent<'a> {
    /// A link was established.
    Connected { conn: ConnHandle },
    /// A link was terminated with the specified HCI reason code.
    Disconnected { conn: ConnHandle, reason: u8 },
    /// A client wrote an attribute.
    Write(Write<'a>),
    /// Queued notifications were transmitted.
    HvnTxComplete { conn: ConnHandle, count: u8 },
    /// The client confirmed an indication.
    HvcConfirmed { conn: ConnHandle, handle: Handle },
    /// Any other event, identified by its raw event ID.
    Other(u16),
}

impl StackEvent<'_> {
    /// Returns the raw event ID.
    #[must_use]
    pub const fn id(&self) -> u16 {
        match *self {
            Self::Connected { .. } => EVT_CONNECTED,
            Self::Disconnected { .. } => EVT_DISCONNECTED,
            Self::Write(_) => EVT_WRITE,
            Self::HvnTxComplete { .. } => EVT_HVN_TX_COMPLETE,
            Self::HvcConfirmed { .. } => EVT_HVC,
            Self::Other(id) => id,
        }
    }
}

/// Client write to an attribute.
#[derive(Clone, Copy, Debug)]
pub struct Write<'a> {
    pub conn: ConnHandle,
    pub handle: Handle,
    pub op: WriteOp,
    pub offset: u16,
    pub data: &'a [u8],
}

/// Application callbacks invoked by the dispatcher.
pub trait Handler {
    /// Called after a client write to the value of characteristic `chr` was
    /// applied to the local mirror.
    fn on_write(&mut self, chr: &CharEntry, w: &Write<'_>);

    /// Called when the client on link `conn` changes its CCCD value for the
    /// characteristic with value handle `chr`.
    #[inline(always)]
    fn on_subscribe(&mut self, conn: ConnHandle, chr: Handle, cccd: Cccd) {
        let _ = (conn, chr, cccd);
    }

    /// Called when `count` notifications were transmitted on link `conn`,
    /// freeing space in the stack's queue.
    #[inline(always)]
    fn on_tx_complete(&mut self, conn: ConnHandle, count: u8) {
        let _ = (conn, count);
    }

    /// Called when the client confirms an indication of characteristic `chr`.
    #[inline(always)]
    fn on_confirm(&mut self, conn: ConnHandle, chr: Handle) {
        let _ = (conn, chr);
    }
}

impl<F: FnMut(&CharEntry, &Write<'_>)> Handler for F {
    #[inline(always)]
    fn on_write(&mut self, chr: &CharEntry, w: &Write<'_>) {
        self(chr, w);
    }
}

impl<H: Handler> ServiceCtx<H> {
    /// Routes a stack event.
    pub fn handle_event(&mut self, evt: &StackEvent<'_>) {
        match *evt {
            StackEvent::Connected { conn } => {
                debug!("Connected: {conn}");
                self.conns.on_connect(conn);
            }
            StackEvent::Disconnected { conn, reason } => {
                debug!("Disconnected: {conn} (reason {reason:#04X})");
                self.conns.on_disconnect(conn);
            }
            StackEvent::Write(ref w) => self.handle_write(w),
            StackEvent::HvnTxComplete { conn, count } => {
                trace!("{count} notification(s) sent on {conn}");
                self.handler.on_tx_complete(conn, count);
            }
            StackEvent::HvcConfirmed { conn, handle } => {
                trace!("Indication of {handle} confirmed on {conn}");
                self.handler.on_confirm(conn, handle);
            }
            StackEvent::Other(id) => trace!("Ignoring event {id:#06X}"),
        }
    }

    fn handle_write(&mut self, w: &Write<'_>) {
        if !self.conns.is_connected(w.conn) {
            warn!("Write to {} from untracked {}", w.handle, w.conn);
        }
        if let Some(chr) = self.reg.cccd_owner(w.handle) {
            let Some(v) = Cccd::from_value(w.data) else {
                warn!("Invalid CCCD value {:02X?} for {chr}", w.data);
                return;
            };
            debug!("CCCD of {chr} on {} set to {v:?}", w.conn);
            if self.conns.set_cccd(w.conn, chr, v) {
                self.handler.on_subscribe(w.conn, chr, v);
            }
            return;
        }
        let Some(chr) = self.reg.characteristic_mut(w.handle) else {
            trace!("Ignoring write to foreign {}", w.handle);
            return;
        };
        if let Err(e) = chr.write(w.offset, w.data) {
            // The stack already validated the write against the attribute
            // metadata, so the mirror is out of sync.
            warn!("Failed to mirror {:?} to {}: {e}", w.op, w.handle);
            return;
        }
        self.handler.on_write(chr, w);
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::consts::Prop;
    use crate::perm::SecLevel;
    use crate::registry::CharDesc;
    use crate::sim::SimStack;
    use crate::uuid::Uuid;

    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        writes: Vec<(Handle, Vec<u8>)>,
        subs: Vec<(Handle, Cccd)>,
        tx: u32,
    }

    impl Handler for Recorder {
        fn on_write(&mut self, chr: &CharEntry, w: &Write<'_>) {
            self.writes.push((w.handle, chr.value().to_vec()));
        }

        fn on_subscribe(&mut self, _: ConnHandle, chr: Handle, cccd: Cccd) {
            self.subs.push((chr, cccd));
        }

        fn on_tx_complete(&mut self, _: ConnHandle, count: u8) {
            self.tx += u32::from(count);
        }
    }

    fn setup() -> (SimStack, ServiceCtx<Recorder>, Handle, Handle) {
        let mut stack = SimStack::new();
        let mut ctx = ServiceCtx::new(Config::default(), Recorder::default());
        let base = Uuid::new(0xF364_0000_0000_4B1B_8C9B_A4B2_9A3D_4E54).unwrap();
        let (_, hdls) = (ctx.registry_mut())
            .primary_service(&mut stack, base, 0xABCD, |s| {
                s.characteristic(
                    CharDesc::new(0xABCE)
                        .props(Prop::READ | Prop::WRITE | Prop::NOTIFY)
                        .perms(SecLevel::Open)
                        .cccd(SecLevel::Open)
                        .vlen(true)
                        .max_len(4),
                )
            })
            .unwrap();
        (stack, ctx, hdls.value, hdls.cccd.unwrap())
    }

    fn cn(v: u16) -> ConnHandle {
        ConnHandle::new(v).unwrap()
    }

    #[test]
    fn connection() {
        let (_, mut ctx, _, _) = setup();
        ctx.handle_event(&StackEvent::Connected { conn: cn(7) });
        assert_eq!(ctx.current(), Some(cn(7)));
        ctx.handle_event(&StackEvent::Disconnected {
            conn: cn(3),
            reason: 0x13,
        });
        assert_eq!(ctx.current(), Some(cn(7)));
        ctx.handle_event(&StackEvent::Disconnected {
            conn: cn(7),
            reason: 0x13,
        });
        assert_eq!(ctx.current(), None);
    }

    #[test]
    fn writes() {
        let (_, mut ctx, val, cccd) = setup();
        ctx.handle_event(&StackEvent::Connected { conn: cn(1) });
        let write = |handle: Handle, data: &'static [u8]| {
            StackEvent::Write(Write {
                conn: cn(1),
                handle,
                op: WriteOp::WriteReq,
                offset: 0,
                data,
            })
        };
        ctx.handle_event(&write(cccd, &[0x01, 0x00]));
        assert!(ctx.is_subscribed(cn(1), val));
        ctx.handle_event(&write(val, &[1, 2, 3]));
        assert_eq!(ctx.registry().value(val), Some(&[1, 2, 3][..]));

        // Invalid CCCD value and too-long value writes change nothing
        ctx.handle_event(&write(cccd, &[0x00]));
        ctx.handle_event(&write(val, &[1, 2, 3, 4, 5]));
        ctx.handle_event(&write(cccd, &[0x00, 0x00]));
        assert!(!ctx.is_subscribed(cn(1), val));

        let h = ctx.handler();
        assert_eq!(h.writes, [(val, vec![1, 2, 3])]);
        assert_eq!(h.subs, [(val, Cccd::NOTIFY), (val, Cccd::empty())]);
    }

    #[test]
    fn other_events() {
        let (_, mut ctx, val, _) = setup();
        ctx.handle_event(&StackEvent::Connected { conn: cn(2) });
        let before = ctx.registry().value(val).map(<[u8]>::to_vec);
        for id in [0x12, 0x1A, 0x51, 0xFFFF] {
            let evt = StackEvent::Other(id);
            assert_eq!(evt.id(), id);
            ctx.handle_event(&evt);
        }
        assert_eq!(ctx.current(), Some(cn(2)));
        assert_eq!(ctx.registry().value(val).map(<[u8]>::to_vec), before);
        assert!(ctx.handler().writes.is_empty());

        ctx.handle_event(&StackEvent::HvnTxComplete {
            conn: cn(2),
            count: 3,
        });
        assert_eq!(ctx.handler().tx, 3);
    }

    #[test]
    fn closure_handler() {
        let mut stack = SimStack::new();
        let mut seen = Vec::new();
        let mut ctx = ServiceCtx::new(Config::default(), |c: &CharEntry, w: &Write<'_>| {
            seen.push((c.value().to_vec(), w.op));
        });
        let base = Uuid::new(0xF364_0000_0000_4B1B_8C9B_A4B2_9A3D_4E54).unwrap();
        let (_, hdls) = (ctx.registry_mut())
            .primary_service(&mut stack, base, 1, |s| {
                s.characteristic(
                    CharDesc::new(2)
                        .props(Prop::WRITE_CMD)
                        .write(SecLevel::Open)
                        .max_len(2),
                )
            })
            .unwrap();
        ctx.handle_event(&StackEvent::Write(Write {
            conn: cn(1),
            handle: hdls.value,
            op: WriteOp::WriteCmd,
            offset: 1,
            data: &[0xAA],
        }));
        drop(ctx);
        assert_eq!(seen, [(vec![0x00, 0xAA], WriteOp::WriteCmd)]);
    }
}
