use std::fmt;

use tracing::{info, warn};

use crate::authority::{HubRequest, send_bounded};
use crate::controller::LifecycleController;
use crate::error::{LifecycleError, TransportError};
use crate::model::{ServiceKind, ServiceState};

/// Opaque connection secret for a running service.
///
/// Handed out for one-time display; nothing in the core keeps a copy.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl LifecycleController {
    /// Fetch the credential for a running service.
    ///
    /// Always a fresh hub request, never cached and never retried.
    pub async fn reveal(&self, kind: ServiceKind) -> Result<Credential, LifecycleError> {
        let state = self.state(kind);
        if state != ServiceState::Running {
            return Err(LifecycleError::NotRunning { kind, state });
        }

        let resource = kind.credential_resource();
        let request = HubRequest::credential(&self.user, resource);
        let failure = match send_bounded(self.authority.as_ref(), request, self.timeout).await {
            Ok(reply) if reply.is_success() => {
                info!(service = %kind, "Credential fetched");
                return Ok(Credential(reply.body));
            }
            Ok(reply) => LifecycleError::RemoteFailure {
                kind,
                resource,
                status: Some(reply.status),
                message: reply.message(),
                timed_out: false,
                completed: Vec::new(),
            },
            Err(e) => LifecycleError::RemoteFailure {
                kind,
                resource,
                status: None,
                timed_out: e == TransportError::Timeout,
                message: e.to_string(),
                completed: Vec::new(),
            },
        };
        warn!(service = %kind, error = %failure, "Credential fetch failed");
        Err(failure)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::authority::Method;
    use crate::fake::{FakeAuthority, Instance};
    use crate::model::Resource;

    #[tokio::test]
    async fn test_not_running_makes_no_call() {
        let hub = Arc::new(
            FakeAuthority::new()
                .with_instance(Resource::Wordpress, Instance::Stopped)
                .with_instance(Resource::Fieldtrip, Instance::Running),
        );
        let c = LifecycleController::new(hub.clone(), "alice");

        // Unknown before any query
        assert!(matches!(
            c.reveal(ServiceKind::Fieldtrip).await,
            Err(LifecycleError::NotRunning { state: ServiceState::Unknown, .. })
        ));

        c.refresh().await;
        let before = hub.calls().len();
        assert!(matches!(
            c.reveal(ServiceKind::Blog).await,
            Err(LifecycleError::NotRunning { state: ServiceState::Stopped, .. })
        ));
        assert!(matches!(
            c.reveal(ServiceKind::Loopback).await,
            Err(LifecycleError::NotRunning { state: ServiceState::Unprovisioned, .. })
        ));
        assert_eq!(hub.calls().len(), before);
    }

    #[tokio::test]
    async fn test_pending_makes_no_call() {
        let hub = Arc::new(FakeAuthority::new().with_instance(Resource::Loopback, Instance::Stopped));
        let c = Arc::new(LifecycleController::new(hub.clone(), "alice"));
        c.refresh().await;
        let gate = hub.gate(Resource::Loopback);

        let task = {
            let c = c.clone();
            tokio::spawn(async move { c.start(ServiceKind::Loopback).await })
        };
        tokio::task::yield_now().await;

        let before = hub.calls().len();
        assert!(matches!(
            c.reveal(ServiceKind::Loopback).await,
            Err(LifecycleError::NotRunning { state: ServiceState::Pending, .. })
        ));
        assert_eq!(hub.calls().len(), before);

        gate.notify_one();
        task.await.unwrap().unwrap();
        assert!(c.reveal(ServiceKind::Loopback).await.is_ok());
    }

    #[tokio::test]
    async fn test_each_service_reveals_its_own_credential() {
        let hub = Arc::new(
            FakeAuthority::new()
                .with_instance(Resource::Loopback, Instance::Running)
                .with_instance(Resource::Wordpress, Instance::Running),
        );
        let c = LifecycleController::new(hub.clone(), "alice");
        c.refresh().await;

        let api = c.reveal(ServiceKind::Loopback).await.unwrap();
        let blog = c.reveal(ServiceKind::Blog).await.unwrap();

        assert!(api.expose().contains("loopback"));
        assert!(blog.expose().contains("wordpress"));
        let credential_calls: Vec<Resource> = hub
            .calls()
            .into_iter()
            .filter(|r| r.credential)
            .map(|r| r.resource)
            .collect();
        assert_eq!(credential_calls, vec![Resource::Loopback, Resource::Wordpress]);
    }

    #[tokio::test]
    async fn test_never_cached() {
        let hub = Arc::new(FakeAuthority::new().with_instance(Resource::Fieldtrip, Instance::Running));
        let c = LifecycleController::new(hub.clone(), "alice");
        c.refresh().await;

        c.reveal(ServiceKind::Fieldtrip).await.unwrap();
        c.reveal(ServiceKind::Fieldtrip).await.unwrap();

        assert_eq!(
            hub.calls()
                .iter()
                .filter(|r| r.credential && r.method == Method::Get)
                .count(),
            2
        );
    }

    #[test]
    fn test_debug_is_redacted() {
        let credential = Credential("user: alice\npassword: hunter2".into());
        assert_eq!(format!("{:?}", credential), "Credential(***)");
    }
}
