//! Connection state tracking.

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::consts::Cccd;
use crate::handle::{ConnHandle, Handle};

/// Connection state of the service.
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ConnState {
    #[default]
    Disconnected,
    Connected(ConnHandle),
}

/// Per-link state.
#[derive(Clone, Debug)]
struct Link {
    conn: ConnHandle,
    /// CCCD values keyed by characteristic value handle.
    cccd: SmallVec<[(Handle, Cccd); 2]>,
}

impl Link {
    #[inline]
    fn new(conn: ConnHandle) -> Self {
        Self {
            conn,
            cccd: SmallVec::new(),
        }
    }
}

/// Tracks active links in connect order. The most recently connected link
/// that has not disconnected is the current one.
///
/// With the default capacity of one link, a connect event for a new handle
/// replaces the tracked one. Higher capacities keep each link until its own
/// disconnect event arrives.
#[derive(Clone, Debug)]
pub struct ConnTracker {
    cap: usize,
    links: SmallVec<[Link; 1]>,
}

impl ConnTracker {
    /// Creates a tracker for up to `max` simultaneous links.
    #[inline]
    #[must_use]
    pub fn new(max: u8) -> Self {
        Self {
            cap: usize::from(max.max(1)),
            links: SmallVec::new(),
        }
    }

    /// Records a new link. A repeated connect for a tracked handle makes it
    /// current again and resets its subscriptions. When the tracker is full,
    /// the oldest link is dropped.
    pub fn on_connect(&mut self, conn: ConnHandle) {
        if let Some(i) = self.position(conn) {
            debug!("Duplicate connect event for {conn}");
            self.links.remove(i);
        } else if self.links.len() >= self.cap {
            let old = self.links.remove(0);
            warn!("Replacing {} with {conn} (tracker capacity {})", old.conn, self.cap);
        }
        self.links.push(Link::new(conn));
    }

    /// Removes a link. Returns `false` and leaves the state unchanged if
    /// `conn` is not tracked.
    pub fn on_disconnect(&mut self, conn: ConnHandle) -> bool {
        let Some(i) = self.position(conn) else {
            debug!("Ignoring disconnect event for untracked {conn}");
            return false;
        };
        self.links.remove(i);
        true
    }

    /// Returns the current link, if any.
    #[inline]
    #[must_use]
    pub fn current(&self) -> Option<ConnHandle> {
        self.links.last().map(|l| l.conn)
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnState {
        self.current().map_or(ConnState::Disconnected, ConnState::Connected)
    }

    /// Returns whether `conn` is an active link.
    #[inline]
    #[must_use]
    pub fn is_connected(&self, conn: ConnHandle) -> bool {
        self.position(conn).is_some()
    }

    /// Returns all active links, oldest first.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = ConnHandle> + '_ {
        self.links.iter().map(|l| l.conn)
    }

    /// Records the CCCD value written by the client on link `conn` for
    /// characteristic `chr`. Returns `false` if the link is not tracked.
    pub fn set_cccd(&mut self, conn: ConnHandle, chr: Handle, v: Cccd) -> bool {
        let Some(i) = self.position(conn) else {
            return false;
        };
        let cccd = &mut self.links[i].cccd;
        match cccd.iter_mut().find(|(h, _)| *h == chr) {
            Some((_, old)) => *old = v,
            None => cccd.push((chr, v)),
        }
        true
    }

    /// Returns the CCCD value of characteristic `chr` on link `conn`.
    #[must_use]
    pub fn cccd(&self, conn: ConnHandle, chr: Handle) -> Cccd {
        (self.position(conn))
            .and_then(|i| self.links[i].cccd.iter().find(|(h, _)| *h == chr))
            .map_or(Cccd::empty(), |&(_, v)| v)
    }

    #[inline]
    fn position(&self, conn: ConnHandle) -> Option<usize> {
        self.links.iter().position(|l| l.conn == conn)
    }
}

impl Default for ConnTracker {
    #[inline]
    fn default() -> Self {
        Self::new(1)
    }
}
