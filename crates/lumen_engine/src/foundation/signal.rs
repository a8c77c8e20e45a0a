//! Observer lists with scoped connections
//!
//! A [`Signal`] owns a table of callbacks. [`Signal::connect`] hands back a
//! [`Connection`] that removes its callback when dropped, so an observer
//! stops receiving events as soon as it lets go of the connection. Emission
//! is synchronous: every connected callback has run when `emit` returns.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Key of a connected callback
    pub struct SlotKey;
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;
type SlotTable<T> = Mutex<SlotMap<SlotKey, Callback<T>>>;

/// Synchronous multi-observer event source
pub struct Signal<T> {
    slots: Arc<SlotTable<T>>,
}

impl<T: 'static> Signal<T> {
    /// Create a signal with no observers
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(SlotMap::with_key())),
        }
    }

    /// Register a callback; it stays connected while the returned connection lives
    #[must_use = "dropping the connection disconnects the callback"]
    pub fn connect<F>(&self, callback: F) -> Connection
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let key = self.slots.lock().insert(Arc::new(callback));
        let table: Weak<SlotTable<T>> = Arc::downgrade(&self.slots);

        Connection {
            disconnect: Some(Box::new(move || {
                if let Some(table) = table.upgrade() {
                    table.lock().remove(key);
                }
            })),
        }
    }

    /// Call every connected callback with `value`
    ///
    /// Callbacks run outside the table lock, so they may connect or drop
    /// connections on this same signal.
    pub fn emit(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = self.slots.lock().values().cloned().collect();
        for callback in callbacks {
            callback(value);
        }
    }

    /// Number of connected callbacks
    pub fn slot_count(&self) -> usize {
        self.slots.lock().len()
    }
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("slots", &self.slots.lock().len())
            .finish()
    }
}

/// Scoped subscription to a [`Signal`]
///
/// Dropping it (or calling [`Connection::disconnect`]) removes the callback.
/// Outliving the signal is harmless.
#[derive(Default)]
pub struct Connection {
    disconnect: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Connection {
    /// Remove the callback now
    pub fn disconnect(&mut self) {
        if let Some(disconnect) = self.disconnect.take() {
            disconnect();
        }
    }

    /// True until disconnected
    pub fn is_connected(&self) -> bool {
        self.disconnect.is_some()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_reaches_every_observer() {
        let signal = Signal::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));

        let a = {
            let total = total.clone();
            signal.connect(move |value| {
                total.fetch_add(*value as usize, Ordering::SeqCst);
            })
        };
        let b = {
            let total = total.clone();
            signal.connect(move |value| {
                total.fetch_add(*value as usize * 10, Ordering::SeqCst);
            })
        };

        signal.emit(&2);
        assert_eq!(total.load(Ordering::SeqCst), 22);
        assert_eq!(signal.slot_count(), 2);
        drop((a, b));
    }

    #[test]
    fn test_dropped_connection_stops_delivery() {
        let signal = Signal::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let connection = {
            let hits = hits.clone();
            signal.connect(move |()| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        signal.emit(&());
        drop(connection);
        signal.emit(&());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(signal.slot_count(), 0);
    }

    #[test]
    fn test_connection_outliving_signal() {
        let signal = Signal::<()>::new();
        let mut connection = signal.connect(|()| {});
        drop(signal);

        connection.disconnect();
        assert!(!connection.is_connected());
    }
}
