//! Remote execution state and the events emitted when it changes.
//!
//! # Lifecycle of a remote package (for beginners)
//!
//! The device reports one of these phases for every registered package:
//!
//! ```text
//! Unknown ──► Constrained ──► Running ──► Suspending ──► Suspended
//!                                │                           │
//!                                └──────► Terminated ◄───────┘
//! ```
//!
//! `Unknown` is both the value a monitor starts from and the value attached
//! to the event that reports an unrecoverable query failure.

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle phase of a remote package or process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionState {
    #[default]
    Unknown,
    Constrained,
    Running,
    Suspending,
    Suspended,
    Terminated,
}

impl ExecutionState {
    /// Every state, in declaration order.
    pub const ALL: [ExecutionState; 6] = [
        ExecutionState::Unknown,
        ExecutionState::Constrained,
        ExecutionState::Running,
        ExecutionState::Suspending,
        ExecutionState::Suspended,
        ExecutionState::Terminated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Unknown => "Unknown",
            ExecutionState::Constrained => "Constrained",
            ExecutionState::Running => "Running",
            ExecutionState::Suspending => "Suspending",
            ExecutionState::Suspended => "Suspended",
            ExecutionState::Terminated => "Terminated",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The device answered with a state name this build does not know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised execution state {0:?}")]
pub struct ParseStateError(pub String);

impl FromStr for ExecutionState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ExecutionState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ParseStateError(s.to_string()))
    }
}

/// Opaque handle naming the remote entity being watched, typically a
/// package full name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityHandle(String);

impl EntityHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityHandle {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Error returned by a remote state query.
///
/// Only [`QueryError::ConnectionLost`] is transient.  Every other variant
/// ends the current monitoring session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The device could not be reached for this query.
    #[error("connection to device lost: {0}")]
    ConnectionLost(String),

    /// The device answered with an error.
    #[error("device reported an error: {0}")]
    Remote(String),

    /// The device answered with something that is not a valid state.
    #[error("unexpected response from device: {0}")]
    UnexpectedResponse(String),
}

impl QueryError {
    /// Returns `true` if the query may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueryError::ConnectionLost(_))
    }
}

impl From<ParseStateError> for QueryError {
    fn from(err: ParseStateError) -> Self {
        QueryError::UnexpectedResponse(err.to_string())
    }
}

/// One observed transition, or one terminal query failure.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChangeEvent {
    pub previous_state: ExecutionState,
    pub new_state: ExecutionState,
    pub timestamp: SystemTime,
    /// Set only on the terminal-failure event; `new_state` is then `Unknown`.
    pub error: Option<QueryError>,
}

impl StateChangeEvent {
    /// Builds a transition event stamped with the current time.
    pub fn transition(previous_state: ExecutionState, new_state: ExecutionState) -> Self {
        Self {
            previous_state,
            new_state,
            timestamp: SystemTime::now(),
            error: None,
        }
    }

    /// Builds the terminal-failure event stamped with the current time.
    pub fn failure(previous_state: ExecutionState, error: QueryError) -> Self {
        Self {
            previous_state,
            new_state: ExecutionState::Unknown,
            timestamp: SystemTime::now(),
            error: Some(error),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.error.is_some()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_state_default_is_unknown() {
        assert_eq!(ExecutionState::default(), ExecutionState::Unknown);
    }

    #[test]
    fn test_execution_state_parses_case_insensitively() {
        assert_eq!("running".parse::<ExecutionState>(), Ok(ExecutionState::Running));
        assert_eq!(" SUSPENDED ".parse::<ExecutionState>(), Ok(ExecutionState::Suspended));
    }

    #[test]
    fn test_execution_state_rejects_unknown_names() {
        assert_eq!(
            "Hibernating".parse::<ExecutionState>(),
            Err(ParseStateError("Hibernating".to_string()))
        );
    }

    #[test]
    fn test_execution_state_display_round_trips_through_from_str() {
        for state in ExecutionState::ALL {
            assert_eq!(state.to_string().parse::<ExecutionState>(), Ok(state));
        }
    }

    #[test]
    fn test_only_connection_lost_is_transient() {
        assert!(QueryError::ConnectionLost("timeout".into()).is_transient());
        assert!(!QueryError::Remote("0x8007000e".into()).is_transient());
        assert!(!QueryError::UnexpectedResponse("??".into()).is_transient());
    }

    #[test]
    fn test_parse_state_error_converts_to_terminal_query_error() {
        let err: QueryError = ParseStateError("Zombie".into()).into();
        assert!(matches!(err, QueryError::UnexpectedResponse(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_failure_event_reports_unknown_new_state() {
        // Arrange
        let error = QueryError::Remote("package removed".into());

        // Act
        let event = StateChangeEvent::failure(ExecutionState::Running, error.clone());

        // Assert
        assert_eq!(event.previous_state, ExecutionState::Running);
        assert_eq!(event.new_state, ExecutionState::Unknown);
        assert_eq!(event.error, Some(error));
        assert!(event.is_terminal());
    }

    #[test]
    fn test_transition_event_has_no_error() {
        let event = StateChangeEvent::transition(ExecutionState::Constrained, ExecutionState::Running);
        assert!(!event.is_terminal());
    }
}
