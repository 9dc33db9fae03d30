//! In-memory hub and dataset index.
//!
//! Backs `--demo` mode and the test suites. The fake hub answers like the
//! real one (200/204/404 for status, 2xx for accepted commands) and records
//! every request so callers can assert on call counts. Failures, held replies
//! and stalls can be scripted per resource.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Notify;

use crate::authority::{HubRequest, Method, RemoteAuthority, Reply};
use crate::dataset::{DatasetIndex, IndexRecord};
use crate::error::TransportError;
use crate::model::Resource;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Instance {
    #[default]
    Absent,
    Stopped,
    Running,
}

#[derive(Default)]
struct Inner {
    instances: BTreeMap<Resource, Instance>,
    calls: Vec<HubRequest>,
    command_failures: BTreeMap<Resource, VecDeque<Result<u16, TransportError>>>,
    status_overrides: BTreeMap<Resource, VecDeque<Result<u16, TransportError>>>,
    gates: BTreeMap<Resource, Arc<Notify>>,
    stalled: Vec<Resource>,
}

#[derive(Default)]
pub struct FakeAuthority {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

impl FakeAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance(self, resource: Resource, instance: Instance) -> Self {
        self.lock().instances.insert(resource, instance);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn instance(&self, resource: Resource) -> Instance {
        self.lock().instances.get(&resource).copied().unwrap_or_default()
    }

    /// The next command against `resource` answers with `status`.
    pub fn fail_next(&self, resource: Resource, status: u16) {
        self.lock()
            .command_failures
            .entry(resource)
            .or_default()
            .push_back(Ok(status));
    }

    /// The next command against `resource` fails at the transport level.
    pub fn drop_next(&self, resource: Resource, error: TransportError) {
        self.lock()
            .command_failures
            .entry(resource)
            .or_default()
            .push_back(Err(error));
    }

    /// The next status query against `resource` answers with `outcome`.
    pub fn answer_status(&self, resource: Resource, outcome: Result<u16, TransportError>) {
        self.lock()
            .status_overrides
            .entry(resource)
            .or_default()
            .push_back(outcome);
    }

    /// Hold the next reply for `resource` until the returned handle is notified.
    ///
    /// The reply is computed when the request arrives, so it reflects the
    /// hub as it was at that moment.
    pub fn gate(&self, resource: Resource) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.lock().gates.insert(resource, notify.clone());
        notify
    }

    /// Requests against `resource` never get a reply.
    pub fn stall(&self, resource: Resource) {
        self.lock().stalled.push(resource);
    }

    pub fn calls(&self) -> Vec<HubRequest> {
        self.lock().calls.clone()
    }

    pub fn count(&self, resource: Resource, method: Method) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.resource == resource && c.method == method)
            .count()
    }

    /// Calls other than status and credential reads.
    pub fn command_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.method != Method::Get)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn answer(inner: &mut Inner, request: &HubRequest) -> Result<Reply, TransportError> {
        let resource = request.resource;
        let current = inner.instances.get(&resource).copied().unwrap_or_default();

        if request.method == Method::Get && !request.credential {
            if let Some(outcome) = inner
                .status_overrides
                .get_mut(&resource)
                .and_then(|q| q.pop_front())
            {
                return outcome.map(Reply::empty);
            }
            let status = match current {
                Instance::Running => 200,
                Instance::Stopped => 204,
                Instance::Absent => 404,
            };
            return Ok(Reply::empty(status));
        }

        if request.method != Method::Get {
            if let Some(outcome) = inner
                .command_failures
                .get_mut(&resource)
                .and_then(|q| q.pop_front())
            {
                return outcome.map(|status| Reply::new(status, r#"{"message": "hub error"}"#));
            }
        }

        let reply = match request.method {
            Method::Get => match current {
                Instance::Absent => Reply::empty(404),
                _ => Reply::new(
                    200,
                    format!("user: {}\npassword: {}-s3cret", request.user, resource),
                ),
            },
            Method::Post => {
                inner.instances.insert(resource, Instance::Running);
                Reply::new(201, json!({ "message": format!("{} started", resource) }).to_string())
            }
            Method::Delete => {
                if current == Instance::Absent {
                    Reply::empty(404)
                } else {
                    inner.instances.insert(resource, Instance::Stopped);
                    Reply::new(200, json!({ "message": format!("{} stopped", resource) }).to_string())
                }
            }
            Method::Put => {
                if current != Instance::Running {
                    Reply::new(
                        503,
                        json!({ "message": format!("{} is not running", resource) }).to_string(),
                    )
                } else {
                    let keys: Vec<String> = request
                        .body
                        .as_ref()
                        .and_then(|b| b.as_object())
                        .map(|o| o.keys().cloned().collect())
                        .unwrap_or_default();
                    Reply::new(
                        200,
                        json!({ "message": format!("Data setup started for {}", keys.join(", ")) })
                            .to_string(),
                    )
                }
            }
        };
        Ok(reply)
    }
}

#[async_trait]
impl RemoteAuthority for FakeAuthority {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn send(&self, request: HubRequest) -> Result<Reply, TransportError> {
        let (outcome, gate, stalled) = {
            let mut inner = self.lock();
            inner.calls.push(request.clone());
            let stalled = inner.stalled.contains(&request.resource);
            let gate = inner.gates.remove(&request.resource);
            (Self::answer(&mut inner, &request), gate, stalled)
        };

        if stalled {
            std::future::pending::<()>().await;
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(gate) = gate {
            gate.notified().await;
        }
        outcome
    }
}

/// Dataset index serving a fixed record list.
pub struct FakeIndex {
    records: Vec<IndexRecord>,
    unavailable: bool,
    searches: AtomicUsize,
}

impl FakeIndex {
    pub fn new(records: Vec<IndexRecord>) -> Self {
        Self {
            records,
            unavailable: false,
            searches: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new(Vec::new())
        }
    }

    /// A handful of repositories in the shape the public index returns,
    /// including the infrastructure repos that must be filtered out.
    pub fn sample() -> Self {
        let record = |name: &str, description: &str| IndexRecord {
            name: name.to_string(),
            full_name: format!("EdinburghCityScope/{}", name),
            description: Some(description.to_string()),
            html_url: format!("https://github.com/EdinburghCityScope/{}", name),
        };
        Self::new(vec![
            record("cityscope-loopback-docker", "Loopback container"),
            record("edinburgh-libraries", "Edinburgh public libraries"),
            record("edinburgh-greenspace", "Parks and green spaces"),
            record("edinburghcityscope-utils", "Utility scripts"),
            record("edinburgh-census-2011", "Census 2011 output areas"),
            record("cityscope-notebook", "Notebook image"),
        ])
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatasetIndex for FakeIndex {
    async fn search(&self) -> Result<Vec<IndexRecord>, TransportError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(TransportError::Connect("index unreachable".into()));
        }
        Ok(self.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn status(hub: &FakeAuthority) -> u16 {
        hub.send(HubRequest::status("alice", Resource::Fieldtrip))
            .await
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn test_fake_hub_lifecycle_codes() {
        let hub = FakeAuthority::new();

        assert_eq!(status(&hub).await, 404);
        hub.send(HubRequest::start("alice", Resource::Fieldtrip))
            .await
            .unwrap();
        assert_eq!(status(&hub).await, 200);
        hub.send(HubRequest::stop("alice", Resource::Fieldtrip))
            .await
            .unwrap();
        assert_eq!(status(&hub).await, 204);
        assert_eq!(hub.command_count(), 2);
    }

    #[tokio::test]
    async fn test_scripted_failure_is_consumed_once() {
        let hub = FakeAuthority::new();
        hub.fail_next(Resource::Mysql, 500);

        let first = hub.send(HubRequest::start("alice", Resource::Mysql)).await.unwrap();
        let second = hub.send(HubRequest::start("alice", Resource::Mysql)).await.unwrap();
        assert_eq!(first.status, 500);
        assert!(second.is_success());
        assert_eq!(hub.instance(Resource::Mysql), Instance::Running);
    }
}
