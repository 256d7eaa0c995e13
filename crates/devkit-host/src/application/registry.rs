//! One monitor per watched entity.
//!
//! Hosts typically watch several packages on the same device.  The registry
//! hands out a shared [`ExecutionStateMonitor`] per [`EntityHandle`] so that
//! independent callers subscribing to the same package share a single poll
//! loop, while different packages never interfere with each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use devkit_core::EntityHandle;
use tracing::debug;

use super::monitor::{
    ExecutionStateMonitor, MonitorConfig, MonitorError, MonitorPhase, RemoteQueryPort,
    StateObserver,
};

/// Lazily creates and caches monitors that share one query port.
pub struct MonitorRegistry {
    port: Arc<dyn RemoteQueryPort>,
    config: MonitorConfig,
    monitors: Mutex<HashMap<EntityHandle, Arc<ExecutionStateMonitor>>>,
}

impl MonitorRegistry {
    pub fn new(port: Arc<dyn RemoteQueryPort>, config: MonitorConfig) -> Self {
        Self {
            port,
            config,
            monitors: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EntityHandle, Arc<ExecutionStateMonitor>>> {
        self.monitors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the monitor for `entity`, creating an idle one on first use.
    pub fn monitor_for(&self, entity: &EntityHandle) -> Arc<ExecutionStateMonitor> {
        let mut monitors = self.lock();
        let monitor = monitors.entry(entity.clone()).or_insert_with(|| {
            debug!(%entity, "creating execution state monitor");
            Arc::new(ExecutionStateMonitor::new(
                entity.clone(),
                Arc::clone(&self.port),
                self.config,
            ))
        });
        Arc::clone(monitor)
    }

    /// Subscribes `observer` to `entity`'s monitor.
    pub fn subscribe(
        &self,
        entity: &EntityHandle,
        observer: Arc<dyn StateObserver>,
    ) -> Result<Arc<ExecutionStateMonitor>, MonitorError> {
        // The registry lock is released before calling into the monitor.
        let monitor = self.monitor_for(entity);
        monitor.subscribe(observer)?;
        Ok(monitor)
    }

    /// Unsubscribes `observer` from `entity`.  Returns `false` if either the
    /// entity has no monitor or the observer was not registered on it.
    pub fn unsubscribe(&self, entity: &EntityHandle, observer: &Arc<dyn StateObserver>) -> bool {
        let monitor = self.lock().get(entity).cloned();
        monitor.is_some_and(|m| m.unsubscribe(observer))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Entities that currently have a monitor, sorted by name.
    pub fn entities(&self) -> Vec<EntityHandle> {
        let mut entities: Vec<_> = self.lock().keys().cloned().collect();
        entities.sort();
        entities
    }

    /// Drops monitors that are idle and not shared with any caller.
    /// Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let mut monitors = self.lock();
        let before = monitors.len();
        monitors.retain(|_, m| Arc::strong_count(m) > 1 || m.phase() != MonitorPhase::Idle);
        before - monitors.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
