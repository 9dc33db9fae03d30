//! Ordered multi-step commands
//!
//! Every lifecycle command is a plan of hub resources to hit in order. Most
//! services are a single step; the blog needs its database before its front
//! end. Execution stops at the first failing step and the report says which
//! steps went through, so partial failures stay visible.

use std::time::Duration;

use tracing::{debug, warn};

use crate::authority::{HubRequest, RemoteAuthority, send_bounded};
use crate::error::TransportError;
use crate::events::{EventBus, LifecycleEvent};
use crate::model::{Resource, ServiceKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Start,
    Stop,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepFailure {
    pub resource: Resource,
    pub status: Option<u16>,
    pub message: String,
    pub timed_out: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SequenceReport {
    pub completed: Vec<Resource>,
    pub failure: Option<StepFailure>,
    /// Body of the last successful reply
    pub message: Option<String>,
}

impl SequenceReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Some steps succeeded and a later one failed.
    pub fn is_partial(&self) -> bool {
        self.failure.is_some() && !self.completed.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sequence {
    pub kind: ServiceKind,
    pub verb: Verb,
    pub steps: Vec<Resource>,
}

impl Sequence {
    pub fn plan(kind: ServiceKind, verb: Verb) -> Self {
        let steps = match (kind, verb) {
            (ServiceKind::Loopback, _) => vec![Resource::Loopback],
            (ServiceKind::Fieldtrip, _) => vec![Resource::Fieldtrip],
            (ServiceKind::Blog, Verb::Start) => vec![Resource::Mysql, Resource::Wordpress],
            // TODO: decide whether stopping the blog should also stop MySQL;
            // the hub has only ever been asked to stop Wordpress here.
            (ServiceKind::Blog, Verb::Stop) => vec![Resource::Wordpress],
        };
        Self { kind, verb, steps }
    }

    pub async fn run(
        &self,
        authority: &dyn RemoteAuthority,
        user: &str,
        timeout: Duration,
        events: &EventBus,
    ) -> SequenceReport {
        let mut report = SequenceReport::default();

        for &resource in &self.steps {
            let request = match self.verb {
                Verb::Start => HubRequest::start(user, resource),
                Verb::Stop => HubRequest::stop(user, resource),
            };
            debug!(service = %self.kind, %resource, verb = ?self.verb, "Sending step");

            let failure = match send_bounded(authority, request, timeout).await {
                Ok(reply) if reply.is_success() => {
                    events.emit(LifecycleEvent::StepSucceeded {
                        kind: self.kind,
                        resource,
                    });
                    report.completed.push(resource);
                    report.message = Some(reply.message());
                    continue;
                }
                Ok(reply) => StepFailure {
                    resource,
                    status: Some(reply.status),
                    message: reply.message(),
                    timed_out: false,
                },
                Err(e) => StepFailure {
                    resource,
                    status: None,
                    timed_out: e == TransportError::Timeout,
                    message: e.to_string(),
                },
            };

            warn!(
                service = %self.kind,
                %resource,
                status = ?failure.status,
                completed = report.completed.len(),
                "Step failed: {}",
                failure.message
            );
            events.emit(LifecycleEvent::StepFailed {
                kind: self.kind,
                resource,
                status: failure.status,
            });
            report.failure = Some(failure);
            break;
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::Method;
    use crate::fake::FakeAuthority;

    #[test]
    fn test_plans() {
        assert_eq!(
            Sequence::plan(ServiceKind::Blog, Verb::Start).steps,
            vec![Resource::Mysql, Resource::Wordpress]
        );
        assert_eq!(
            Sequence::plan(ServiceKind::Blog, Verb::Stop).steps,
            vec![Resource::Wordpress]
        );
        assert_eq!(
            Sequence::plan(ServiceKind::Fieldtrip, Verb::Stop).steps,
            vec![Resource::Fieldtrip]
        );
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let hub = FakeAuthority::new();
        hub.fail_next(Resource::Mysql, 500);
        let events = EventBus::default();

        let report = Sequence::plan(ServiceKind::Blog, Verb::Start)
            .run(&hub, "alice", Duration::from_secs(1), &events)
            .await;

        assert!(!report.succeeded());
        assert!(!report.is_partial());
        assert_eq!(report.failure.as_ref().map(|f| f.resource), Some(Resource::Mysql));
        assert_eq!(hub.count(Resource::Wordpress, Method::Post), 0);
    }

    #[tokio::test]
    async fn test_reports_partial() {
        let hub = FakeAuthority::new();
        hub.fail_next(Resource::Wordpress, 503);
        let events = EventBus::default();

        let report = Sequence::plan(ServiceKind::Blog, Verb::Start)
            .run(&hub, "alice", Duration::from_secs(1), &events)
            .await;

        assert!(report.is_partial());
        assert_eq!(report.completed, vec![Resource::Mysql]);
        assert_eq!(report.failure.unwrap().status, Some(503));
    }
}
