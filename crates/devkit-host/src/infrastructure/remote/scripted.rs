//! A [`RemoteQueryPort`] that replays a fixed script of answers.
//!
//! Used by the `watch` command to rehearse monitoring without a device and by
//! the integration tests.  A script is a comma-separated list of steps:
//!
//! | Step            | Answer                                       |
//! |-----------------|----------------------------------------------|
//! | `Running`       | `Ok(ExecutionState::Running)` (any state)    |
//! | `!transient`    | `Err(QueryError::ConnectionLost)`            |
//! | `!fatal[:msg]`  | `Err(QueryError::Remote(msg))`               |
//! | `?text`         | a raw device reply that fails to parse       |
//!
//! After the last step the final answer repeats forever.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use devkit_core::{EntityHandle, ExecutionState, QueryError};
use thiserror::Error;
use tracing::trace;

use crate::application::monitor::RemoteQueryPort;

/// Error type for script parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("script contains no steps")]
    Empty,

    #[error("invalid script step {step:?}: {reason}")]
    InvalidStep { step: String, reason: String },
}

/// One scripted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    State(ExecutionState),
    ConnectionLost,
    Fail(String),
    /// Raw text handed to the state parser at query time.
    Garbage(String),
}

impl ScriptStep {
    fn answer(&self) -> Result<ExecutionState, QueryError> {
        match self {
            ScriptStep::State(state) => Ok(*state),
            ScriptStep::ConnectionLost => {
                Err(QueryError::ConnectionLost("scripted connection drop".into()))
            }
            ScriptStep::Fail(message) => Err(QueryError::Remote(message.clone())),
            ScriptStep::Garbage(raw) => Ok(raw.parse::<ExecutionState>()?),
        }
    }
}

impl FromStr for ScriptStep {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let step = s.trim();
        if step.is_empty() {
            return Err(ScriptError::InvalidStep {
                step: s.to_string(),
                reason: "empty step".into(),
            });
        }

        if let Some(raw) = step.strip_prefix('?') {
            return Ok(ScriptStep::Garbage(raw.to_string()));
        }
        if let Some(directive) = step.strip_prefix('!') {
            let (name, message) = match directive.split_once(':') {
                Some((name, message)) => (name, Some(message.trim())),
                None => (directive, None),
            };
            return match name.trim().to_ascii_lowercase().as_str() {
                "transient" => Ok(ScriptStep::ConnectionLost),
                "fatal" => Ok(ScriptStep::Fail(
                    message
                        .filter(|m| !m.is_empty())
                        .unwrap_or("scripted failure")
                        .to_string(),
                )),
                other => Err(ScriptError::InvalidStep {
                    step: step.to_string(),
                    reason: format!("unknown directive {other:?}"),
                }),
            };
        }

        step.parse::<ExecutionState>()
            .map(ScriptStep::State)
            .map_err(|err| ScriptError::InvalidStep {
                step: step.to_string(),
                reason: err.to_string(),
            })
    }
}

/// Parses a comma-separated script.
pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>, ScriptError> {
    if text.trim().is_empty() {
        return Err(ScriptError::Empty);
    }
    text.split(',').map(str::parse).collect()
}

/// Replays [`ScriptStep`]s in order, one per query.
#[derive(Debug)]
pub struct ScriptedQueryPort {
    steps: Vec<ScriptStep>,
    calls: AtomicUsize,
}

impl ScriptedQueryPort {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn from_script(text: &str) -> Result<Self, ScriptError> {
        parse_script(text).map(Self::new)
    }

    /// Number of queries answered so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RemoteQueryPort for ScriptedQueryPort {
    fn query_state(&self, entity: &EntityHandle) -> Result<ExecutionState, QueryError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(last) = self.steps.len().checked_sub(1) else {
            return Err(QueryError::Remote("no scripted response".into()));
        };
        let step = &self.steps[index.min(last)];
        trace!(%entity, index, ?step, "scripted query");
        step.answer()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
