//! Service context shared between the stack event loop and publishers.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::event::{Handler, StackEvent};
use crate::handle::{ConnHandle, Handle};
use crate::notify::{Backoff, Delivery, Result};
use crate::service::ServiceCtx;
use crate::stack::Stack;
use crate::{SyncMutex, SyncMutexGuard};

/// Cloneable handle to a [`ServiceCtx`] behind a mutex. Event dispatch and
/// publishing each hold the lock only for the duration of one operation, so
/// a publish never observes a half-applied event.
#[derive(Debug)]
#[repr(transparent)]
pub struct SharedCtx<H>(Arc<SyncMutex<ServiceCtx<H>>>);

impl<H> Clone for SharedCtx<H> {
    #[inline]
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<H: Handler> SharedCtx<H> {
    /// Wraps a context.
    #[inline]
    #[must_use]
    pub fn new(ctx: ServiceCtx<H>) -> Self {
        Self(Arc::new(SyncMutex::new(ctx)))
    }

    /// Locks the context.
    #[inline]
    pub fn lock(&self) -> SyncMutexGuard<ServiceCtx<H>> {
        self.0.lock()
    }

    /// Routes a stack event.
    #[inline]
    pub fn handle_event(&self, evt: &StackEvent<'_>) {
        self.0.lock().handle_event(evt);
    }

    /// Returns the current connection.
    #[inline]
    #[must_use]
    pub fn current(&self) -> Option<ConnHandle> {
        self.0.lock().current()
    }

    /// Publishes `v` as the new value of characteristic `chr`. See
    /// [`ServiceCtx::publish`].
    #[inline]
    pub fn publish<S: Stack>(&self, stack: &mut S, chr: Handle, v: &[u8]) -> Result<Delivery> {
        self.0.lock().publish(stack, chr, v)
    }

    /// Publishes `v`, retrying while the notification queue is full. The lock
    /// is released while waiting, allowing TX-complete events to be
    /// processed.
    pub async fn publish_with_retry<S: Stack>(
        &self,
        stack: &mut S,
        chr: Handle,
        v: &[u8],
    ) -> Result<Delivery> {
        let mut backoff = Backoff::new(&self.0.lock().config().retry);
        loop {
            let r = self.0.lock().publish(stack, chr, v);
            match r {
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
}
