//! Notification and indication dispatch.

use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::config::RetryPolicy;
use crate::consts::{HvxType, Prop};
use crate::event::Handler;
use crate::handle::{ConnHandle, Handle};
use crate::service::ServiceCtx;
use crate::stack::{HvxParams, Stack, StackError};

/// Error returned by a publish operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum NotifyError {
    #[error("payload length {len} exceeds maximum {max}")]
    PayloadTooLarge { len: usize, max: u16 },
    #[error("payload length {len} does not match fixed length {expected}")]
    InvalidLength { len: usize, expected: u16 },
    #[error("client is not subscribed")]
    NotSubscribed,
    #[error("notification queue is full")]
    QueueFull,
    #[error("link is down")]
    LinkDown,
    #[error("unknown characteristic {0}")]
    InvalidHandle(Handle),
    #[error("{0} does not permit server-initiated updates")]
    NotPermitted(Handle),
    #[error("stack error: {0}")]
    Stack(StackError),
}

impl NotifyError {
    /// Returns whether the same publish may succeed if retried later.
    #[inline]
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(*self, Self::QueueFull)
    }

    /// Maps a stack status for an HVX call.
    fn from_stack(e: StackError, hdl: Handle, len: usize, max: u16) -> Self {
        use StackError::*;
        match e {
            Resources | Busy => Self::QueueFull,
            SysAttrMissing | InvalidState => Self::NotSubscribed,
            InvalidConnHandle => Self::LinkDown,
            InvalidAttrHandle | NotFound => Self::InvalidHandle(hdl),
            DataSize => Self::PayloadTooLarge { len, max },
            e => Self::Stack(e),
        }
    }
}

/// Common publish result type.
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Outcome of a successful publish.
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Delivery {
    /// No link is active. Nothing was submitted to the stack.
    NoConnection,
    /// The update was queued for transmission on link `conn`.
    Queued { conn: ConnHandle, len: u16 },
}

impl Delivery {
    /// Returns whether the update was submitted to the stack.
    #[inline]
    #[must_use]
    pub const fn is_queued(self) -> bool {
        matches!(self, Self::Queued { .. })
    }
}

impl<H: Handler> ServiceCtx<H> {
    /// Publishes `v` as the new value of characteristic `chr` using a
    /// notification, or an indication if the characteristic only supports
    /// indications. Without an active link this is a no-op that reports
    /// [`Delivery::NoConnection`].
    #[inline]
    pub fn publish<S: Stack>(&mut self, stack: &mut S, chr: Handle, v: &[u8]) -> Result<Delivery> {
        let Some(conn) = self.conns.current() else {
            trace!("No connection, dropping update of {chr}");
            return Ok(Delivery::NoConnection);
        };
        self.submit(stack, conn, chr, None, v)
    }

    /// Publishes `v` using the specified update type.
    #[inline]
    pub fn publish_as<S: Stack>(
        &mut self,
        stack: &mut S,
        chr: Handle,
        typ: HvxType,
        v: &[u8],
    ) -> Result<Delivery> {
        let Some(conn) = self.conns.current() else {
            trace!("No connection, dropping {typ:?} of {chr}");
            return Ok(Delivery::NoConnection);
        };
        self.submit(stack, conn, chr, Some(typ), v)
    }

    /// Publishes `v` to a specific tracked link.
    pub fn publish_to<S: Stack>(
        &mut self,
        stack: &mut S,
        conn: ConnHandle,
        chr: Handle,
        v: &[u8],
    ) -> Result<Delivery> {
        if !self.conns.is_connected(conn) {
            return Err(NotifyError::LinkDown);
        }
        self.submit(stack, conn, chr, None, v)
    }

    /// Publishes `v`, waiting and retrying while the stack's notification
    /// queue is full. Delays follow the configured [`RetryPolicy`]. All other
    /// errors are returned immediately.
    pub async fn publish_with_retry<S: Stack>(
        &mut self,
        stack: &mut S,
        chr: Handle,
        v: &[u8],
    ) -> Result<Delivery> {
        let mut backoff = Backoff::new(&self.cfg.retry);
        loop {
            match self.publish(stack, chr, v) {
                Err(e) if e.is_retryable() => {
                    let Some(d) = backoff.next() else {
                        warn!("Giving up on update of {chr}: {e}");
                        return Err(e);
                    };
                    debug!("Retrying update of {chr} in {d:?}");
                    tokio::time::sleep(d).await;
                }
                r => return r,
            }
        }
    }

    /// Validates and submits an update to the stack.
    fn submit<S: Stack>(
        &mut self,
        stack: &mut S,
        conn: ConnHandle,
        chr: Handle,
        typ: Option<HvxType>,
        v: &[u8],
    ) -> Result<Delivery> {
        let c = (self.reg.characteristic_mut(chr)).ok_or(NotifyError::InvalidHandle(chr))?;
        let max = c.max_len();
        if v.len() > usize::from(max) {
            return Err(NotifyError::PayloadTooLarge { len: v.len(), max });
        }
        if !c.is_vlen() && v.len() != usize::from(max) {
            return Err(NotifyError::InvalidLength {
                len: v.len(),
                expected: max,
            });
        }
        let typ = match typ {
            Some(HvxType::Notification) if c.props().contains(Prop::NOTIFY) => HvxType::Notification,
            Some(HvxType::Indication) if c.props().contains(Prop::INDICATE) => HvxType::Indication,
            None if c.props().contains(Prop::NOTIFY) => HvxType::Notification,
            None if c.props().contains(Prop::INDICATE) => HvxType::Indication,
            _ => return Err(NotifyError::NotPermitted(chr)),
        };
        let p = HvxParams {
            handle: chr,
            typ,
            offset: 0,
            data: v,
        };
        let n = (stack.hvx(conn, &p)).map_err(|e| NotifyError::from_stack(e, chr, v.len(), max))?;
        if usize::from(n) != v.len() {
            warn!("Stack queued {n} of {} bytes for {chr}", v.len());
        }
        c.set(v);
        trace!("{typ:?} of {chr} queued on {conn}: {v:02X?}");
        Ok(Delivery::Queued { conn, len: n })
    }
}

/// Exponential backoff delays for publish retries. Yields one delay per retry
/// permitted by the policy, doubling each time up to the policy maximum.
#[derive(Clone, Debug)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    left: u8,
}

impl Backoff {
    /// Creates a delay sequence for the specified policy.
    #[inline]
    #[must_use]
    pub fn new(p: &RetryPolicy) -> Self {
        Self {
            next: p.initial(),
            max: p.max(),
            left: p.attempts.saturating_sub(1),
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.left == 0 {
            return None;
        }
        self.left -= 1;
        let d = self.next.min(self.max);
        self.next = d.saturating_mul(2);
        Some(d)
    }
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;

    use crate::config::Config;
    use crate::event::{StackEvent, Write};
    use crate::perm::SecLevel;
    use crate::registry::{CharDesc, CharEntry};
    use crate::sim::SimStack;
    use crate::uuid::Uuid;

    use super::*;

    type Ctx = ServiceCtx<fn(&CharEntry, &Write<'_>)>;

    struct Fixture {
        stack: SimStack,
        ctx: Ctx,
        fixed: Handle,
        var: Handle,
        ind: Handle,
        read: Handle,
    }

    fn cn(v: u16) -> ConnHandle {
        ConnHandle::new(v).unwrap()
    }

    fn ignore(_: &CharEntry, _: &Write<'_>) {}

    fn fixture() -> Fixture {
        let mut stack = SimStack::new();
        let mut ctx: Ctx = ServiceCtx::new(Config::default(), ignore as fn(&CharEntry, &Write<'_>));
        let base = Uuid::new(0xF364_0000_0000_4B1B_8C9B_A4B2_9A3D_4E54).unwrap();
        let (_, (fixed, var, ind, read)) = (ctx.registry_mut())
            .primary_service(&mut stack, base, 0xABCD, |s| {
                let notify = CharDesc::new(1)
                    .props(Prop::READ | Prop::NOTIFY)
                    .read(SecLevel::Open)
                    .cccd(SecLevel::Open)
                    .max_len(4);
                let fixed = s.characteristic(notify.clone())?.value;
                let var = s.characteristic(notify.vlen(true).max_len(8))?.value;
                let ind = (s.characteristic(
                    CharDesc::new(3)
                        .props(Prop::INDICATE)
                        .cccd(SecLevel::Open)
                        .max_len(2),
                ))?
                .value;
                let read = (s.characteristic(
                    CharDesc::new(4)
                        .props(Prop::READ)
                        .read(SecLevel::Open)
                        .max_len(2),
                ))?
                .value;
                Ok((fixed, var, ind, read))
            })
            .unwrap();
        Fixture {
            stack,
            ctx,
            fixed,
            var,
            ind,
            read,
        }
    }

    #[test]
    fn no_connection() {
        let mut f = fixture();
        assert_eq!(
            f.ctx.publish(&mut f.stack, f.fixed, &[1, 2, 3, 4]),
            Ok(Delivery::NoConnection)
        );
        // Validation is skipped as well
        assert_eq!(
            f.ctx.publish(&mut f.stack, f.fixed, &[0; 100]),
            Ok(Delivery::NoConnection)
        );
        assert!(f.stack.hvx_calls().is_empty());
    }

    #[test]
    fn lengths() {
        let mut f = fixture();
        f.ctx.handle_event(&f.stack.connect(cn(7)));
        assert_eq!(
            f.ctx.publish(&mut f.stack, f.fixed, &[1, 2, 3, 4, 5]),
            Err(NotifyError::PayloadTooLarge { len: 5, max: 4 })
        );
        assert_eq!(
            f.ctx.publish(&mut f.stack, f.fixed, &[1, 2]),
            Err(NotifyError::InvalidLength {
                len: 2,
                expected: 4
            })
        );
        assert!(f.stack.hvx_calls().is_empty());

        let d = f.ctx.publish(&mut f.stack, f.var, &[1, 2]).unwrap();
        assert_eq!(d, Delivery::Queued { conn: cn(7), len: 2 });
        assert_eq!(f.ctx.registry().value(f.var), Some(&[1, 2][..]));
        let d = f.ctx.publish(&mut f.stack, f.var, &[]).unwrap();
        assert!(d.is_queued());
        assert_eq!(f.stack.hvx_calls().len(), 2);
    }

    #[test]
    fn types() {
        let mut f = fixture();
        f.ctx.handle_event(&f.stack.connect(cn(1)));
        f.ctx.publish(&mut f.stack, f.ind, &[1, 2]).unwrap();
        assert_eq!(f.stack.hvx_calls()[0].typ, HvxType::Indication);
        assert_eq!(
            f.ctx.publish_as(&mut f.stack, f.fixed, HvxType::Indication, &[0; 4]),
            Err(NotifyError::NotPermitted(f.fixed))
        );
        assert_eq!(
            f.ctx.publish(&mut f.stack, f.read, &[0; 2]),
            Err(NotifyError::NotPermitted(f.read))
        );
        let bad = Handle::new(0x0100).unwrap();
        assert_eq!(
            f.ctx.publish(&mut f.stack, bad, &[0; 2]),
            Err(NotifyError::InvalidHandle(bad))
        );
        assert_eq!(f.stack.hvx_calls().len(), 1);
    }

    #[test]
    fn stack_errors() {
        let mut f = fixture();
        f.ctx.handle_event(&f.stack.connect(cn(1)));
        for (e, want) in [
            (StackError::Resources, NotifyError::QueueFull),
            (StackError::Busy, NotifyError::QueueFull),
            (StackError::SysAttrMissing, NotifyError::NotSubscribed),
            (StackError::InvalidState, NotifyError::NotSubscribed),
            (StackError::InvalidConnHandle, NotifyError::LinkDown),
            (StackError::InvalidAttrHandle, NotifyError::InvalidHandle(f.fixed)),
            (StackError::Internal, NotifyError::Stack(StackError::Internal)),
        ] {
            f.stack.fail_next_hvx(e);
            assert_eq!(f.ctx.publish(&mut f.stack, f.fixed, &[9; 4]), Err(want));
            assert_eq!(want.is_retryable(), want == NotifyError::QueueFull);
        }
        // Failed publishes leave the mirror unchanged
        assert_eq!(f.ctx.registry().value(f.fixed), Some(&[0; 4][..]));
    }

    #[test]
    fn publish_to() {
        let mut f = fixture();
        let cfg = Config {
            max_connections: 2,
            ..Config::default()
        };
        f.ctx.conns = crate::conn::ConnTracker::new(cfg.max_connections);
        f.ctx.handle_event(&f.stack.connect(cn(1)));
        f.ctx.handle_event(&f.stack.connect(cn(2)));
        f.ctx.publish_to(&mut f.stack, cn(1), f.fixed, &[0; 4]).unwrap();
        f.ctx.publish(&mut f.stack, f.fixed, &[0; 4]).unwrap();
        let conns: Vec<_> = f.stack.hvx_calls().iter().map(|c| c.conn).collect();
        assert_eq!(conns, [cn(1), cn(2)]);
        assert_matches!(
            f.ctx.publish_to(&mut f.stack, cn(3), f.fixed, &[0; 4]),
            Err(NotifyError::LinkDown)
        );
    }

    #[test]
    fn backoff() {
        let p = RetryPolicy {
            attempts: 6,
            initial_ms: 5,
            max_ms: 30,
        };
        let v: Vec<_> = Backoff::new(&p).map(|d| d.as_millis()).collect();
        assert_eq!(v, [5, 10, 20, 30, 30]);
        let once = RetryPolicy {
            attempts: 1,
            ..p
        };
        assert_eq!(Backoff::new(&once).next(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn retry() {
        let mut f = fixture();
        f.ctx.handle_event(&f.stack.connect(cn(1)));
        f.stack.fail_next_hvx(StackError::Resources);
        f.stack.fail_next_hvx(StackError::Resources);
        let t = tokio::time::Instant::now();
        let d = (f.ctx.publish_with_retry(&mut f.stack, f.fixed, &[1; 4])).await;
        assert!(d.unwrap().is_queued());
        assert_eq!(t.elapsed(), Duration::from_millis(5 + 10));
        assert_eq!(f.stack.hvx_calls().len(), 3);

        // Exhausted
        for _ in 0..4 {
            f.stack.fail_next_hvx(StackError::Resources);
        }
        let r = (f.ctx.publish_with_retry(&mut f.stack, f.fixed, &[2; 4])).await;
        assert_eq!(r, Err(NotifyError::QueueFull));
        assert_eq!(f.ctx.registry().value(f.fixed), Some(&[1; 4][..]));

        // Not retried
        f.stack.fail_next_hvx(StackError::InvalidConnHandle);
        let r = (f.ctx.publish_with_retry(&mut f.stack, f.fixed, &[3; 4])).await;
        assert_eq!(r, Err(NotifyError::LinkDown));
        assert_eq!(f.stack.hvx_calls().len(), 3 + 4 + 1);
    }

    #[test]
    fn disconnect() {
        let mut f = fixture();
        f.ctx.handle_event(&f.stack.connect(cn(7)));
        f.ctx.handle_event(&StackEvent::Disconnected {
            conn: cn(7),
            reason: 0x13,
        });
        assert_eq!(
            f.ctx.publish(&mut f.stack, f.fixed, &[1; 4]),
            Ok(Delivery::NoConnection)
        );
        assert!(f.stack.hvx_calls().is_empty());
    }
}
