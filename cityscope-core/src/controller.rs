//! Lifecycle controller
//!
//! Owns one `ServiceModel` per service kind and is the only code that
//! changes them. Commands mark the model `Pending`, run their composite
//! sequence against the hub and always settle on a final state. Status
//! queries are advisory: they never fail and never override a newer
//! command-driven state.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::authority::{HubRequest, RemoteAuthority, send_bounded};
use crate::composite::{Sequence, SequenceReport, Verb};
use crate::error::LifecycleError;
use crate::events::{EventBus, EventEnvelope, LifecycleEvent};
use crate::model::{Action, PartialFailure, ServiceKind, ServiceModel, ServiceState};
use crate::status::interpret;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a successful lifecycle command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutcome {
    pub state: ServiceState,
    /// Confirmation text from the hub's last reply
    pub message: Option<String>,
}

pub struct LifecycleController {
    pub(crate) authority: Arc<dyn RemoteAuthority>,
    pub(crate) user: String,
    pub(crate) timeout: Duration,
    models: [Mutex<ServiceModel>; 3],
    events: EventBus,
}

impl LifecycleController {
    pub fn new(authority: Arc<dyn RemoteAuthority>, user: impl Into<String>) -> Self {
        Self {
            authority,
            user: user.into(),
            timeout: DEFAULT_TIMEOUT,
            models: ServiceKind::ALL.map(|kind| Mutex::new(ServiceModel::new(kind))),
            events: EventBus::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    pub fn state(&self, kind: ServiceKind) -> ServiceState {
        self.lock(kind).current_state()
    }

    pub fn model(&self, kind: ServiceKind) -> ServiceModel {
        self.lock(kind).clone()
    }

    pub fn snapshot(&self) -> Vec<ServiceModel> {
        ServiceKind::ALL.iter().map(|&k| self.model(k)).collect()
    }

    fn lock(&self, kind: ServiceKind) -> MutexGuard<'_, ServiceModel> {
        self.models[kind.index()]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Publishes a transition. Callers hold the model lock so the feed sees
    /// changes in revision order.
    fn changed(&self, model: &ServiceModel, from: ServiceState) {
        let to = model.current_state();
        if from != to {
            self.events.emit(LifecycleEvent::StateChanged {
                kind: model.kind(),
                from,
                to,
                revision: model.revision(),
            });
        }
    }

    /// Ask the hub for the current status of `kind` and reconcile the model.
    ///
    /// Returns the model's state afterwards. A reply that arrives after a
    /// command changed the model, or while one is in flight, is dropped.
    pub async fn query(&self, kind: ServiceKind) -> ServiceState {
        let issued_at = self.lock(kind).revision();
        let resource = kind.status_resource();

        let response = send_bounded(
            self.authority.as_ref(),
            HubRequest::status(&self.user, resource),
            self.timeout,
        )
        .await;
        let observed = interpret(&response);

        match &response {
            Ok(reply) => debug!(service = %kind, status = reply.status, %observed, "Status reply"),
            Err(e) => warn!(service = %kind, error = %e, "Status query failed"),
        }

        let mut model = self.lock(kind);
        let from = model.current_state();
        if model.reconcile(issued_at, observed) {
            self.changed(&model, from);
        } else {
            debug!(service = %kind, %observed, current = %from, "Discarding stale status");
        }
        model.current_state()
    }

    /// Query every service.
    pub async fn refresh(&self) -> Vec<(ServiceKind, ServiceState)> {
        let mut states = Vec::with_capacity(ServiceKind::ALL.len());
        for kind in ServiceKind::ALL {
            states.push((kind, self.query(kind).await));
        }
        states
    }

    /// Provision a service that does not exist yet.
    pub async fn create(&self, kind: ServiceKind) -> Result<CommandOutcome, LifecycleError> {
        self.command(kind, Action::Create, ServiceState::Unprovisioned, Verb::Start)
            .await
    }

    pub async fn start(&self, kind: ServiceKind) -> Result<CommandOutcome, LifecycleError> {
        self.command(kind, Action::Start, ServiceState::Stopped, Verb::Start)
            .await
    }

    /// Stop a running service. For the blog this only stops Wordpress.
    pub async fn stop(&self, kind: ServiceKind) -> Result<CommandOutcome, LifecycleError> {
        self.command(kind, Action::Stop, ServiceState::Running, Verb::Stop)
            .await
    }

    async fn command(
        &self,
        kind: ServiceKind,
        action: Action,
        required: ServiceState,
        verb: Verb,
    ) -> Result<CommandOutcome, LifecycleError> {
        let revision = {
            let mut model = self.lock(kind);
            let current = model.current_state();
            if current == ServiceState::Pending {
                return Err(LifecycleError::AlreadyPending { kind });
            }
            if current != required {
                return Err(LifecycleError::InvalidTransition {
                    kind,
                    state: current,
                    action,
                });
            }
            let revision = model.mark_pending()?;
            self.changed(&model, current);
            revision
        };
        let guard = PendingGuard {
            controller: self,
            kind,
            revision,
            armed: true,
        };
        info!(service = %kind, %action, "Sending command");

        let sequence = Sequence::plan(kind, verb);
        let report = sequence
            .run(self.authority.as_ref(), &self.user, self.timeout, &self.events)
            .await;

        self.settle(guard, verb, report)
    }

    fn settle(
        &self,
        guard: PendingGuard<'_>,
        verb: Verb,
        report: SequenceReport,
    ) -> Result<CommandOutcome, LifecycleError> {
        let kind = guard.disarm();

        let partial = report.is_partial();
        let SequenceReport {
            completed,
            failure,
            message,
        } = report;

        let Some(failure) = failure else {
            let state = match verb {
                Verb::Start => ServiceState::Running,
                Verb::Stop => ServiceState::Stopped,
            };
            {
                let mut model = self.lock(kind);
                model.set(state);
                self.changed(&model, ServiceState::Pending);
            }
            info!(service = %kind, %state, "Command succeeded");
            return Ok(CommandOutcome { state, message });
        };

        {
            let mut model = self.lock(kind);
            if partial {
                model.set_partial(PartialFailure {
                    completed: completed.clone(),
                    failed: failure.resource,
                });
            } else {
                model.set(ServiceState::Unknown);
            }
            self.changed(&model, ServiceState::Pending);
        }
        if partial {
            warn!(
                service = %kind,
                completed = ?completed,
                failed = %failure.resource,
                "Composite command left sub-resources running"
            );
        }

        Err(LifecycleError::RemoteFailure {
            kind,
            resource: failure.resource,
            status: failure.status,
            message: failure.message,
            timed_out: failure.timed_out,
            completed,
        })
    }
}

/// Settles a command whose future was dropped before the hub answered.
///
/// The hub may or may not have acted on the request, so the model goes to
/// `Unknown` and the next query decides.
struct PendingGuard<'a> {
    controller: &'a LifecycleController,
    kind: ServiceKind,
    revision: u64,
    armed: bool,
}

impl PendingGuard<'_> {
    fn disarm(mut self) -> ServiceKind {
        self.armed = false;
        self.kind
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut model = self.controller.lock(self.kind);
        if model.revision() != self.revision {
            return;
        }
        model.set(ServiceState::Unknown);
        self.controller.changed(&model, ServiceState::Pending);
        warn!(service = %self.kind, "Command abandoned before the hub answered");
    }
}
