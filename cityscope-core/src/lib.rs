pub mod config;
pub mod error;
pub mod model;
pub mod status;

// Hub boundary
pub mod authority;

// Lifecycle commands and reconciliation
pub mod composite;
pub mod controller;
pub mod credential;
pub mod events;

// Dataset selection for the loopback service
pub mod dataset;

// In-memory hub for demo mode and tests
pub mod fake;

pub use authority::{HubRequest, Method, RemoteAuthority, Reply};
pub use controller::{CommandOutcome, LifecycleController};
pub use credential::Credential;
pub use dataset::{Candidates, DatasetIndex, DatasetSelector, IndexRecord};
pub use error::{ConfigError, DatasetError, LifecycleError, TransportError};
pub use model::{
    Action, DatasetCandidate, DatasetSelection, Resource, ServiceKind, ServiceModel, ServiceState,
};
