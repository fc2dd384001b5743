#![forbid(unsafe_code)]

//! Disconnect handles for signal registrations.
//!
//! A [`Connection`] is returned by every `connect`/`subscribe` call. It holds
//! a weak reference to the registry it came from, so keeping a connection
//! alive never keeps a signal alive.
//!
//! # Invariants
//!
//! 1. [`Connection::disconnect`] is idempotent: only the first call reaches
//!    the registry.
//! 2. Dropping a connection disconnects it. Use [`Connection::detach`] to
//!    keep the registration for the lifetime of the signal instead.
//! 3. Connection ids are unique for the lifetime of the process.

use std::fmt;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique identifier of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registry that can drop a registration by id.
pub(crate) trait Disconnect: Send + Sync {
    fn disconnect(&self, id: ConnectionId);
}

/// Handle for one sink registration.
///
/// The subscriber must retain the connection for as long as it wants to
/// receive values.
#[must_use = "dropping a Connection disconnects it immediately"]
pub struct Connection {
    id: ConnectionId,
    target: Option<Weak<dyn Disconnect>>,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, target: Weak<dyn Disconnect>) -> Self {
        Self {
            id,
            target: Some(target),
        }
    }

    /// The id of this registration.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the registration is still live.
    ///
    /// Returns `false` after [`disconnect`](Self::disconnect) or once the
    /// originating signal has been dropped.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.target
            .as_ref()
            .is_some_and(|target| target.strong_count() > 0)
    }

    /// Remove the registration.
    ///
    /// Once this returns, the sink is not invoked for any further value,
    /// including values already queued. Calling it again is a no-op.
    pub fn disconnect(&mut self) {
        if let Some(target) = self.target.take()
            && let Some(target) = target.upgrade()
        {
            target.disconnect(self.id);
        }
    }

    /// Give up the handle without disconnecting.
    ///
    /// The sink stays registered until the signal itself is dropped.
    pub fn detach(mut self) {
        self.target = None;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<ConnectionId>>,
    }

    impl Disconnect for Recorder {
        fn disconnect(&self, id: ConnectionId) {
            self.calls.lock().push(id);
        }
    }

    fn connection_to(recorder: &Arc<Recorder>) -> Connection {
        Connection::new(ConnectionId::next(), Arc::downgrade(recorder) as Weak<dyn Disconnect>)
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert!(b > a);
        assert_ne!(a, b);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let recorder = Arc::new(Recorder::default());
        let mut connection = connection_to(&recorder);
        let id = connection.id();

        assert!(connection.is_connected());
        connection.disconnect();
        connection.disconnect();
        assert!(!connection.is_connected());
        drop(connection);

        assert_eq!(*recorder.calls.lock(), vec![id]);
    }

    #[test]
    fn drop_disconnects() {
        let recorder = Arc::new(Recorder::default());
        let id = {
            let connection = connection_to(&recorder);
            connection.id()
        };
        assert_eq!(*recorder.calls.lock(), vec![id]);
    }

    #[test]
    fn detach_keeps_registration() {
        let recorder = Arc::new(Recorder::default());
        connection_to(&recorder).detach();
        assert!(recorder.calls.lock().is_empty());
    }

    #[test]
    fn dead_target_reports_disconnected() {
        let recorder = Arc::new(Recorder::default());
        let mut connection = connection_to(&recorder);
        drop(recorder);
        assert!(!connection.is_connected());
        connection.disconnect();
    }

    #[test]
    fn display_shows_raw_id() {
        let id = ConnectionId::next();
        assert_eq!(id.to_string(), format!("#{}", id.raw()));
    }
}
