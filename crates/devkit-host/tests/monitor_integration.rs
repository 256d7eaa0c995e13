//! Integration tests for execution state monitoring.
//!
//! These tests drive `ExecutionStateMonitor` and `MonitorRegistry` end-to-end
//! through the public API, with `ScriptedQueryPort` standing in for the device
//! and `RecordingObserver` collecting what observers see.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use devkit_core::{EntityHandle, ExecutionState, QueryError};
use devkit_host::application::monitor::{
    ExecutionStateMonitor, MonitorConfig, MonitorPhase, StateObserver,
};
use devkit_host::application::registry::MonitorRegistry;
use devkit_host::infrastructure::observers::RecordingObserver;
use devkit_host::infrastructure::remote::ScriptedQueryPort;

const WAIT: Duration = Duration::from_secs(3);

fn fast_config() -> MonitorConfig {
    MonitorConfig {
        poll_interval: Duration::from_millis(10),
        stop_timeout: Duration::from_secs(2),
    }
}

fn scripted_monitor(script: &str) -> (ExecutionStateMonitor, Arc<ScriptedQueryPort>) {
    let port = Arc::new(ScriptedQueryPort::from_script(script).expect("valid script"));
    let monitor = ExecutionStateMonitor::new(
        EntityHandle::new("Contoso.Game_1.0.0.0_x64__8wekyb3d8bbwe"),
        Arc::clone(&port) as Arc<_>,
        fast_config(),
    );
    (monitor, port)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn test_full_session_reports_transitions_then_one_failure() {
    // Arrange
    let (monitor, port) =
        scripted_monitor("Constrained,!transient,Running,Running,Suspended,!fatal:uninstalled");
    let recorder = Arc::new(RecordingObserver::new());

    // Act
    monitor.subscribe(Arc::clone(&recorder) as Arc<dyn StateObserver>).unwrap();
    let events = recorder.wait_for(4, WAIT);
    thread::sleep(Duration::from_millis(100));

    // Assert
    let pairs: Vec<_> = events
        .iter()
        .map(|e| (e.previous_state, e.new_state))
        .collect();
    assert_eq!(
        pairs,
        vec![
            (ExecutionState::Unknown, ExecutionState::Constrained),
            (ExecutionState::Constrained, ExecutionState::Running),
            (ExecutionState::Running, ExecutionState::Suspended),
            (ExecutionState::Suspended, ExecutionState::Unknown),
        ]
    );
    assert_eq!(
        events[3].error,
        Some(QueryError::Remote("uninstalled".into()))
    );
    assert_eq!(recorder.events().len(), 4, "nothing after the failure");
    assert_eq!(port.call_count(), 6);
    assert_eq!(monitor.phase(), MonitorPhase::FailedTerminal);
}

#[test]
fn test_unparseable_reply_ends_monitoring() {
    // Arrange
    let (monitor, _port) = scripted_monitor("Running,?Hibernating");
    let recorder = Arc::new(RecordingObserver::new());

    // Act
    monitor.subscribe(Arc::clone(&recorder) as Arc<dyn StateObserver>).unwrap();
    let events = recorder.wait_for(2, WAIT);

    // Assert
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[1].error,
        Some(QueryError::UnexpectedResponse(_))
    ));
    assert_eq!(events[1].previous_state, ExecutionState::Running);
}

#[test]
fn test_every_observer_sees_every_event() {
    // Arrange
    let (monitor, _port) = scripted_monitor("Constrained,Running");
    let first = Arc::new(RecordingObserver::new());
    let second = Arc::new(RecordingObserver::new());

    // Act
    monitor.subscribe(Arc::clone(&first) as Arc<dyn StateObserver>).unwrap();
    monitor.subscribe(Arc::clone(&second) as Arc<dyn StateObserver>).unwrap();
    let seen_by_first = first.wait_for(2, WAIT);
    let seen_by_second = second.wait_for(2, WAIT);

    // Assert
    assert_eq!(seen_by_first.len(), 2);
    assert_eq!(seen_by_second.len(), 2);
    assert_eq!(seen_by_first[1].new_state, ExecutionState::Running);
    assert_eq!(seen_by_second[1].new_state, ExecutionState::Running);
}

#[test]
fn test_unsubscribe_stops_queries_and_resubscribe_starts_fresh() {
    // Arrange
    let (monitor, port) = scripted_monitor("Running");
    let recorder: Arc<dyn StateObserver> = Arc::new(RecordingObserver::new());
    monitor.subscribe(Arc::clone(&recorder)).unwrap();
    while port.call_count() < 3 {
        thread::sleep(Duration::from_millis(5));
    }

    // Act – stop
    assert!(monitor.unsubscribe(&recorder));
    let stopped_at = port.call_count();
    thread::sleep(Duration::from_millis(60));

    // Assert – stopped
    assert_eq!(port.call_count(), stopped_at);
    assert_eq!(monitor.phase(), MonitorPhase::Idle);

    // Act – restart with a fresh observer
    let fresh = Arc::new(RecordingObserver::new());
    monitor.subscribe(Arc::clone(&fresh) as Arc<dyn StateObserver>).unwrap();
    let events = fresh.wait_for(1, WAIT);

    // Assert – the restart reports the state again from Unknown
    assert_eq!(events[0].previous_state, ExecutionState::Unknown);
    assert_eq!(events[0].new_state, ExecutionState::Running);
}

#[test]
fn test_registry_shares_one_loop_per_entity() {
    // Arrange
    let port = Arc::new(ScriptedQueryPort::from_script("Running").unwrap());
    let registry = MonitorRegistry::new(Arc::clone(&port) as Arc<_>, fast_config());
    let entity = EntityHandle::new("Contoso.Game");
    let a: Arc<dyn StateObserver> = Arc::new(RecordingObserver::new());
    let b: Arc<dyn StateObserver> = Arc::new(RecordingObserver::new());

    // Act
    let monitor_a = registry.subscribe(&entity, Arc::clone(&a)).unwrap();
    let monitor_b = registry.subscribe(&entity, Arc::clone(&b)).unwrap();

    // Assert
    assert!(Arc::ptr_eq(&monitor_a, &monitor_b));
    assert_eq!(monitor_a.subscriber_count(), 2);
    assert_eq!(registry.len(), 1);

    // Removing one observer keeps the loop alive for the other.
    assert!(registry.unsubscribe(&entity, &a));
    assert_eq!(monitor_a.phase(), MonitorPhase::Polling);
    assert!(registry.unsubscribe(&entity, &b));
    assert_eq!(monitor_a.phase(), MonitorPhase::Idle);
}
