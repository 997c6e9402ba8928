//! Service context.

use crate::config::Config;
use crate::conn::ConnTracker;
use crate::consts::Cccd;
use crate::event::Handler;
use crate::handle::{ConnHandle, Handle};
use crate::registry::Registry;

/// State of one GATT service instance: the registered attributes, the
/// connection tracker, and the application's event handler. The context is
/// owned by the event loop; use [`crate::SharedCtx`] when the event loop and
/// the publishing task run concurrently.
#[derive(Debug)]
pub struct ServiceCtx<H> {
    pub(crate) cfg: Config,
    pub(crate) reg: Registry,
    pub(crate) conns: ConnTracker,
    pub(crate) handler: H,
}

impl<H: Handler> ServiceCtx<H> {
    /// Creates a context with an empty registry and no connection.
    #[must_use]
    pub fn new(cfg: Config, handler: H) -> Self {
        Self {
            cfg,
            reg: Registry::new(cfg),
            conns: ConnTracker::new(cfg.max_connections),
            handler,
        }
    }

    /// Returns the context configuration.
    #[inline(always)]
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.cfg
    }

    /// Returns the attribute registry.
    #[inline(always)]
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.reg
    }

    /// Returns the attribute registry for service registration.
    #[inline(always)]
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.reg
    }

    #[inline(always)]
    #[must_use]
    pub const fn conns(&self) -> &ConnTracker {
        &self.conns
    }

    /// Returns the current connection or [`None`] if no link is active.
    #[inline]
    #[must_use]
    pub fn current(&self) -> Option<ConnHandle> {
        self.conns.current()
    }

    /// Returns whether the client on link `conn` enabled notifications or
    /// indications for characteristic `chr`. Publishing does not consult this
    /// state; the stack enforces subscriptions on its own.
    #[must_use]
    pub fn is_subscribed(&self, conn: ConnHandle, chr: Handle) -> bool {
        self.conns.cccd(conn, chr).intersects(Cccd::all())
    }

    #[inline(always)]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    #[inline(always)]
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}
