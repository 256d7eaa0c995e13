//! Ready-made [`StateObserver`] implementations.
//!
//! - [`ChannelObserver`] bridges the monitor's worker thread into async code
//!   through a tokio channel.  The CLI uses it to drive its output loop.
//! - [`LoggingObserver`] writes every event to `tracing`.
//! - [`RecordingObserver`] keeps events in memory and lets a test block until
//!   a given number has arrived.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use devkit_core::{EntityHandle, StateChangeEvent};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::application::monitor::StateObserver;

/// Forwards events into an unbounded tokio channel.
///
/// Sending never blocks, so the poll loop is never stalled by a slow
/// consumer.  Events sent after the receiver is dropped are discarded.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<StateChangeEvent>,
}

impl ChannelObserver {
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<StateChangeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl StateObserver for ChannelObserver {
    fn on_state_changed(&self, event: &StateChangeEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// Logs transitions at `info` and terminal failures at `warn`.
pub struct LoggingObserver {
    entity: EntityHandle,
}

impl LoggingObserver {
    pub fn new(entity: EntityHandle) -> Self {
        Self { entity }
    }
}

impl StateObserver for LoggingObserver {
    fn on_state_changed(&self, event: &StateChangeEvent) {
        match &event.error {
            Some(err) => warn!(
                entity = %self.entity,
                previous = %event.previous_state,
                "monitoring ended: {err}"
            ),
            None => info!(
                entity = %self.entity,
                previous = %event.previous_state,
                new = %event.new_state,
                "execution state changed"
            ),
        }
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<StateChangeEvent>>,
    arrived: Condvar,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StateChangeEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<StateChangeEvent> {
        self.lock().clone()
    }

    /// Blocks until at least `count` events were recorded or `timeout`
    /// passes, and returns the snapshot at that point.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<StateChangeEvent> {
        let guard = self.lock();
        let (guard, _) = self
            .arrived
            .wait_timeout_while(guard, timeout, |events| events.len() < count)
            .unwrap_or_else(PoisonError::into_inner);
        guard.clone()
    }
}

impl StateObserver for RecordingObserver {
    fn on_state_changed(&self, event: &StateChangeEvent) {
        self.lock().push(event.clone());
        self.arrived.notify_all();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
