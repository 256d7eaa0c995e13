//! ExecutionStateMonitor: polls one remote entity and fans out state changes.
//!
//! The device has no push channel for execution state, so the monitor runs a
//! poll loop on a dedicated worker thread while at least one observer is
//! subscribed.
//!
//! # Lifecycle
//!
//! ```text
//!            first subscribe                  terminal query error
//!   Idle ───────────────────────► Polling ──────────────────────► FailedTerminal
//!    ▲                              │  ▲                               │
//!    └──── last unsubscribe ────────┘  └──────── any subscribe ────────┘
//! ```
//!
//! # Poll loop
//!
//! Each tick the worker sleeps for the poll interval (waking early if a stop
//! is requested), queries the device *without* holding the monitor lock, and
//! then:
//!
//! - **state changed** – builds one [`StateChangeEvent`] and invokes every
//!   observer in the current snapshot, in subscription order, before the next
//!   tick starts.
//! - **transient error** – skips the tick silently.
//! - **any other error** – delivers one failure event (new state `Unknown`)
//!   and halts until the next `subscribe`.
//!
//! The worker is the only thread that runs observers.  An observer must not
//! block indefinitely or it stalls this entity's polling.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use devkit_core::{EntityHandle, ExecutionState, QueryError, StateChangeEvent};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Error type for monitor operations.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The OS refused to start the poll worker thread.
    #[error("failed to spawn poll worker for {entity}: {source}")]
    SpawnFailed {
        entity: EntityHandle,
        #[source]
        source: std::io::Error,
    },
}

/// The single remote operation the monitor depends on.
///
/// The production implementation is the versioned device adapter; tests use
/// a mock or [`crate::infrastructure::remote::ScriptedQueryPort`].  Any
/// timeout on the call is the implementation's responsibility.
#[cfg_attr(test, mockall::automock)]
pub trait RemoteQueryPort: Send + Sync {
    /// Asks the device for the current execution state of `entity`.
    fn query_state(&self, entity: &EntityHandle) -> Result<ExecutionState, QueryError>;
}

/// Receives state-change notifications on the monitor's worker thread.
pub trait StateObserver: Send + Sync {
    fn on_state_changed(&self, event: &StateChangeEvent);
}

impl<F> StateObserver for F
where
    F: Fn(&StateChangeEvent) + Send + Sync,
{
    fn on_state_changed(&self, event: &StateChangeEvent) {
        self(event)
    }
}

/// Timing parameters for a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Delay between the end of one query and the start of the next.
    pub poll_interval: Duration,
    /// Upper bound on how long the last `unsubscribe` waits for the worker.
    pub stop_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Where the monitor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    /// No subscribers and no loop.
    Idle,
    /// Loop running with at least one subscriber.
    Polling,
    /// Loop halted after a terminal error; subscribers are still registered.
    FailedTerminal,
}

/// Everything guarded by the monitor lock.
struct MonitorState {
    observers: Vec<Arc<dyn StateObserver>>,
    last_known: ExecutionState,
    phase: MonitorPhase,
    stop_requested: bool,
    worker_alive: bool,
    /// Bumped on every spawn so a stopper never waits on a newer worker.
    generation: u64,
    worker: Option<JoinHandle<()>>,
}

struct Shared {
    entity: EntityHandle,
    port: Arc<dyn RemoteQueryPort>,
    config: MonitorConfig,
    state: Mutex<MonitorState>,
    signal: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks the worker as exited and wakes anyone waiting in `unsubscribe`.
    fn retire(&self, mut state: MutexGuard<'_, MonitorState>) {
        state.worker_alive = false;
        drop(state);
        self.signal.notify_all();
        info!(entity = %self.entity, "execution state monitor stopped");
    }
}

/// Watches one remote entity and notifies observers when its state changes.
pub struct ExecutionStateMonitor {
    shared: Arc<Shared>,
}

impl ExecutionStateMonitor {
    /// Creates an idle monitor.  Nothing is queried until the first `subscribe`.
    pub fn new(
        entity: EntityHandle,
        port: Arc<dyn RemoteQueryPort>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                entity,
                port,
                config,
                state: Mutex::new(MonitorState {
                    observers: Vec::new(),
                    last_known: ExecutionState::Unknown,
                    phase: MonitorPhase::Idle,
                    stop_requested: false,
                    worker_alive: false,
                    generation: 0,
                    worker: None,
                }),
                signal: Condvar::new(),
            }),
        }
    }

    pub fn entity(&self) -> &EntityHandle {
        &self.shared.entity
    }

    pub fn config(&self) -> MonitorConfig {
        self.shared.config
    }

    pub fn phase(&self) -> MonitorPhase {
        self.shared.lock().phase
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.lock().observers.len()
    }

    pub fn last_known_state(&self) -> ExecutionState {
        self.shared.lock().last_known
    }

    /// Registers `observer` and makes sure a poll loop is running.
    ///
    /// Subscribing an observer that is already registered does not add a
    /// second entry, but it does restart polling after a terminal failure.
    /// On every (re)start the last-known state is reset to `Unknown`, so the
    /// first successful query always produces an event.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::SpawnFailed`] if the worker thread cannot be
    /// started.  The observer stays registered and the next `subscribe`
    /// retries.
    pub fn subscribe(&self, observer: Arc<dyn StateObserver>) -> Result<(), MonitorError> {
        let mut state = self.shared.lock();
        if !state.observers.iter().any(|o| same_observer(o, &observer)) {
            state.observers.push(observer);
        }
        if state.phase == MonitorPhase::Polling {
            return Ok(());
        }

        state.phase = MonitorPhase::Polling;
        state.last_known = ExecutionState::Unknown;
        state.stop_requested = false;
        if state.worker_alive {
            // The previous worker has not exited yet; it picks up the new
            // phase instead of a second loop being started.
            debug!(entity = %self.shared.entity, "resuming existing poll worker");
            // Wakes an `unsubscribe` still waiting on this worker.
            self.shared.signal.notify_all();
            return Ok(());
        }
        self.spawn_worker(&mut state)
    }

    /// Removes `observer`.  Returns `false` if it was not registered.
    ///
    /// When the last observer leaves, the loop is asked to stop and this call
    /// blocks (up to `stop_timeout`) until the worker has exited, so no event
    /// is delivered after it returns.  Called from inside an observer
    /// callback, it requests the stop but does not wait.
    pub fn unsubscribe(&self, observer: &Arc<dyn StateObserver>) -> bool {
        let mut state = self.shared.lock();
        let before = state.observers.len();
        state.observers.retain(|o| !same_observer(o, observer));
        let removed = state.observers.len() < before;
        if !removed || !state.observers.is_empty() {
            return removed;
        }

        state.phase = MonitorPhase::Idle;
        self.stop_worker(state);
        true
    }

    fn spawn_worker(&self, state: &mut MonitorState) -> Result<(), MonitorError> {
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("state-monitor".to_string())
            .spawn(move || poll_loop(shared));

        match spawned {
            Ok(handle) => {
                state.worker_alive = true;
                state.generation += 1;
                // Any previous handle belongs to a worker that already retired.
                state.worker = Some(handle);
                Ok(())
            }
            Err(source) => {
                state.phase = MonitorPhase::Idle;
                error!(entity = %self.shared.entity, "failed to spawn poll worker: {source}");
                Err(MonitorError::SpawnFailed {
                    entity: self.shared.entity.clone(),
                    source,
                })
            }
        }
    }

    fn stop_worker(&self, mut state: MutexGuard<'_, MonitorState>) {
        let on_worker = state
            .worker
            .as_ref()
            .is_some_and(|handle| handle.thread().id() == thread::current().id());
        if on_worker {
            state.stop_requested = true;
            return;
        }

        let generation = state.generation;
        if state.worker_alive {
            state.stop_requested = true;
            self.shared.signal.notify_all();
            let (next, wait) = self
                .shared
                .signal
                .wait_timeout_while(state, self.shared.config.stop_timeout, |s| {
                    s.worker_alive && s.generation == generation && s.stop_requested
                })
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
            if state.generation != generation || !state.stop_requested {
                debug!(entity = %self.shared.entity, "stop superseded by a new subscription");
                return;
            }
            if wait.timed_out() {
                warn!(
                    entity = %self.shared.entity,
                    timeout_ms = self.shared.config.stop_timeout.as_millis() as u64,
                    "poll worker did not stop in time"
                );
                return;
            }
        }

        if state.generation != generation {
            return;
        }
        let handle = state.worker.take();
        drop(state);
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(entity = %self.shared.entity, "poll worker panicked");
            }
        }
    }
}

impl Drop for ExecutionStateMonitor {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.observers.clear();
        state.phase = MonitorPhase::Idle;
        self.stop_worker(state);
    }
}

/// The worker body.  Owns the query; everything else goes through the lock.
fn poll_loop(shared: Arc<Shared>) {
    info!(
        entity = %shared.entity,
        interval_ms = shared.config.poll_interval.as_millis() as u64,
        "execution state monitor started"
    );

    loop {
        let state = shared.lock();
        let (state, _) = shared
            .signal
            .wait_timeout_while(state, shared.config.poll_interval, |s| !s.stop_requested)
            .unwrap_or_else(PoisonError::into_inner);
        if state.stop_requested {
            shared.retire(state);
            return;
        }
        drop(state);

        let outcome = shared.port.query_state(&shared.entity);

        let mut state = shared.lock();
        if state.stop_requested {
            shared.retire(state);
            return;
        }

        match outcome {
            Ok(current) => {
                let previous = std::mem::replace(&mut state.last_known, current);
                if previous == current {
                    continue;
                }
                let observers = state.observers.clone();
                drop(state);

                debug!(entity = %shared.entity, %previous, %current, "execution state changed");
                deliver(&observers, &StateChangeEvent::transition(previous, current));
            }
            Err(err) if err.is_transient() => {
                debug!(entity = %shared.entity, "skipping tick after transient failure: {err}");
            }
            Err(err) => {
                let previous =
                    std::mem::replace(&mut state.last_known, ExecutionState::Unknown);
                state.phase = MonitorPhase::FailedTerminal;
                let observers = state.observers.clone();
                drop(state);

                warn!(entity = %shared.entity, "state query failed, polling halted: {err}");
                deliver(&observers, &StateChangeEvent::failure(previous, err));

                let state = shared.lock();
                if state.phase == MonitorPhase::Polling && !state.stop_requested {
                    // Re-subscribed while the failure was being delivered.
                    continue;
                }
                shared.retire(state);
                return;
            }
        }
    }
}

/// Invokes every observer in order.  A panicking observer is logged and
/// skipped so the others still hear about the event.
fn deliver(observers: &[Arc<dyn StateObserver>], event: &StateChangeEvent) {
    for observer in observers {
        let result = panic::catch_unwind(AssertUnwindSafe(|| observer.on_state_changed(event)));
        if result.is_err() {
            error!("state observer panicked while handling {:?}", event.new_state);
        }
    }
}

fn same_observer(a: &Arc<dyn StateObserver>, b: &Arc<dyn StateObserver>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
