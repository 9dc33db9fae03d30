use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, ParseKindError};

/// A logical service the user can manage from the hub.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// API / data loopback service
    Loopback,
    /// Blog stack: MySQL + Wordpress, presented as one service
    Blog,
    /// Fieldtrip service
    Fieldtrip,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 3] = [ServiceKind::Loopback, ServiceKind::Blog, ServiceKind::Fieldtrip];

    pub fn label(&self) -> &'static str {
        match self {
            ServiceKind::Loopback => "loopback",
            ServiceKind::Blog => "blog",
            ServiceKind::Fieldtrip => "fieldtrip",
        }
    }

    /// Endpoint whose status stands for the whole service.
    pub fn status_resource(&self) -> Resource {
        match self {
            ServiceKind::Loopback => Resource::Loopback,
            ServiceKind::Blog => Resource::Wordpress,
            ServiceKind::Fieldtrip => Resource::Fieldtrip,
        }
    }

    /// Endpoint that hands out this service's credential.
    pub fn credential_resource(&self) -> Resource {
        self.status_resource()
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            ServiceKind::Loopback => 0,
            ServiceKind::Blog => 1,
            ServiceKind::Fieldtrip => 2,
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ServiceKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "loopback" | "api" => Ok(ServiceKind::Loopback),
            "blog" | "wordpress" => Ok(ServiceKind::Blog),
            "fieldtrip" => Ok(ServiceKind::Fieldtrip),
            other => Err(ParseKindError(other.to_string())),
        }
    }
}

/// An independently addressable hub endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Loopback,
    Mysql,
    Wordpress,
    Fieldtrip,
}

impl Resource {
    /// Path segment under `/api/users/<user>/`
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Loopback => "loopback",
            Resource::Mysql => "mysql",
            Resource::Wordpress => "wordpress",
            Resource::Fieldtrip => "fieldtrip",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// No instance exists for this user
    Unprovisioned,
    /// Instance exists but is not running
    Stopped,
    /// Instance exists and is reachable
    Running,
    /// A lifecycle command is in flight
    Pending,
    /// Status query failed or the signal was not recognized
    #[default]
    Unknown,
}

impl ServiceState {
    pub fn label(&self) -> &'static str {
        match self {
            ServiceState::Unprovisioned => "unprovisioned",
            ServiceState::Stopped => "stopped",
            ServiceState::Running => "running",
            ServiceState::Pending => "pending",
            ServiceState::Unknown => "unknown",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            ServiceState::Unprovisioned => "○",
            ServiceState::Stopped => "◯",
            ServiceState::Running => "●",
            ServiceState::Pending => "◐",
            ServiceState::Unknown => "?",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ServiceState::Running)
    }

    /// User actions the presentation layer should offer in this state.
    pub fn actions(&self, kind: ServiceKind) -> Vec<Action> {
        match self {
            ServiceState::Unprovisioned => vec![Action::Create],
            ServiceState::Stopped => vec![Action::Start, Action::RevealCredential],
            ServiceState::Running => {
                let mut actions = vec![Action::Stop, Action::RevealCredential];
                if kind == ServiceKind::Loopback {
                    actions.push(Action::ConfigureData);
                }
                actions
            }
            ServiceState::Pending | ServiceState::Unknown => Vec::new(),
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Start,
    Stop,
    RevealCredential,
    ConfigureData,
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Start => "start",
            Action::Stop => "stop",
            Action::RevealCredential => "credential",
            Action::ConfigureData => "configure",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Steps of a composite command that went through before a later one failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialFailure {
    pub completed: Vec<Resource>,
    pub failed: Resource,
}

/// Last known lifecycle state of one managed service.
///
/// Only the lifecycle controller mutates this; every change bumps
/// `revision` so late status replies can be recognized as stale.
#[derive(Clone, Debug)]
pub struct ServiceModel {
    kind: ServiceKind,
    state: ServiceState,
    revision: u64,
    partial: Option<PartialFailure>,
}

impl ServiceModel {
    pub fn new(kind: ServiceKind) -> Self {
        Self {
            kind,
            state: ServiceState::Unknown,
            revision: 0,
            partial: None,
        }
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn current_state(&self) -> ServiceState {
        self.state
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn has_credential(&self) -> bool {
        self.state.is_running()
    }

    pub fn partial_failure(&self) -> Option<&PartialFailure> {
        self.partial.as_ref()
    }

    pub fn set(&mut self, state: ServiceState) {
        self.state = state;
        self.partial = None;
        self.revision += 1;
    }

    /// Leaves the model `Unknown` with the composite steps that did complete.
    pub fn set_partial(&mut self, partial: PartialFailure) {
        self.set(ServiceState::Unknown);
        self.partial = Some(partial);
    }

    pub fn mark_pending(&mut self) -> Result<u64, LifecycleError> {
        if self.state == ServiceState::Pending {
            return Err(LifecycleError::AlreadyPending { kind: self.kind });
        }
        self.set(ServiceState::Pending);
        Ok(self.revision)
    }

    /// Applies a status observation issued at `issued_at`.
    ///
    /// Returns false when the model moved on since the query was issued or a
    /// command is still in flight; the observation is then dropped.
    pub fn reconcile(&mut self, issued_at: u64, observed: ServiceState) -> bool {
        if self.revision != issued_at || self.state == ServiceState::Pending {
            return false;
        }
        self.set(observed);
        true
    }
}

/// One dataset the loopback service can import.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetCandidate {
    pub id: String,
    pub display_name: String,
    pub detail_url: String,
    pub source_identifier: String,
}

/// Datasets picked by the user, keyed by candidate id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetSelection(BTreeMap<String, String>);

impl DatasetSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pick(&mut self, candidate: &DatasetCandidate) {
        self.0
            .insert(candidate.id.clone(), candidate.source_identifier.clone());
    }

    pub fn insert(&mut self, id: impl Into<String>, source: impl Into<String>) {
        self.0.insert(id.into(), source.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
