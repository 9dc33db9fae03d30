use std::path::PathBuf;

use thiserror::Error;

use crate::model::{Action, Resource, ServiceKind, ServiceState};

/// Transport-level failure talking to the hub or the dataset index.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by lifecycle commands and credential reveal.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("cannot {action} {kind} while it is {state}")]
    InvalidTransition {
        kind: ServiceKind,
        state: ServiceState,
        action: Action,
    },

    #[error("{kind} already has a command in flight")]
    AlreadyPending { kind: ServiceKind },

    #[error("{kind}: {resource} request failed{}: {message}", status_suffix(.status))]
    RemoteFailure {
        kind: ServiceKind,
        resource: Resource,
        status: Option<u16>,
        message: String,
        timed_out: bool,
        /// Composite steps that succeeded before this one failed
        completed: Vec<Resource>,
    },

    #[error("{kind} is {state}, credentials are only available while running")]
    NotRunning { kind: ServiceKind, state: ServiceState },
}

impl LifecycleError {
    /// True when an earlier composite step left a sub-resource running.
    pub fn is_partial(&self) -> bool {
        matches!(self, LifecycleError::RemoteFailure { completed, .. } if !completed.is_empty())
    }
}

/// Errors surfaced by the dataset selector.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DatasetError {
    #[error("no dataset selected")]
    EmptySelection,

    #[error("dataset index unavailable: {message}")]
    SourceUnavailable { message: String },

    #[error("data setup failed{}: {message}", status_suffix(.status))]
    ConfigurationFailed { status: Option<u16>, message: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown service '{0}' (expected loopback, blog or fieldtrip)")]
pub struct ParseKindError(pub String);

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("no config file found, searched: {searched:?}")]
    NotFound { searched: Vec<PathBuf> },
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_failure_message_includes_status() {
        let err = LifecycleError::RemoteFailure {
            kind: ServiceKind::Blog,
            resource: Resource::Wordpress,
            status: Some(500),
            message: "internal error".into(),
            timed_out: false,
            completed: vec![Resource::Mysql],
        };
        assert_eq!(
            err.to_string(),
            "blog: wordpress request failed (HTTP 500): internal error"
        );
        assert!(err.is_partial());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = LifecycleError::InvalidTransition {
            kind: ServiceKind::Loopback,
            state: ServiceState::Running,
            action: Action::Create,
        };
        assert_eq!(err.to_string(), "cannot create loopback while it is running");
    }
}
