//! Remote authority trait
//!
//! The hub is the only thing that actually spawns and tears down per-user
//! services. The core talks to it through a single request/response channel,
//! so the HTTP client, the demo fake and test doubles are interchangeable.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;
use crate::model::Resource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// A request against `/api/users/<user>/<resource>`
#[derive(Clone, Debug, PartialEq)]
pub struct HubRequest {
    pub user: String,
    pub resource: Resource,
    pub method: Method,
    /// Ask for the credential instead of the status (GET only)
    pub credential: bool,
    pub body: Option<Value>,
}

impl HubRequest {
    fn new(user: &str, resource: Resource, method: Method) -> Self {
        Self {
            user: user.to_string(),
            resource,
            method,
            credential: false,
            body: None,
        }
    }

    pub fn status(user: &str, resource: Resource) -> Self {
        Self::new(user, resource, Method::Get)
    }

    /// Create and start share one verb on the hub.
    pub fn start(user: &str, resource: Resource) -> Self {
        Self::new(user, resource, Method::Post)
    }

    pub fn stop(user: &str, resource: Resource) -> Self {
        Self::new(user, resource, Method::Delete)
    }

    pub fn credential(user: &str, resource: Resource) -> Self {
        Self {
            credential: true,
            ..Self::new(user, resource, Method::Get)
        }
    }

    pub fn configure(user: &str, resource: Resource, body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(user, resource, Method::Put)
        }
    }

    /// Path relative to the hub API root.
    pub fn path(&self) -> String {
        format!("users/{}/{}", self.user, self.resource.path())
    }
}

/// Raw hub reply: status code plus body text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self::new(status, String::new())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The `message` field of a JSON body, or the body itself.
    pub fn message(&self) -> String {
        serde_json::from_str::<Value>(&self.body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| self.body.trim().to_string())
    }
}

/// Backend that provisions services on the user's behalf.
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Human-readable name of this backend
    fn name(&self) -> &'static str;

    /// Send one request and wait for the reply.
    ///
    /// Only transport problems are errors; every HTTP status, including
    /// 4xx/5xx, comes back as a `Reply`.
    async fn send(&self, request: HubRequest) -> Result<Reply, TransportError>;
}

/// Send with an upper bound on how long the reply may take.
pub async fn send_bounded(
    authority: &dyn RemoteAuthority,
    request: HubRequest,
    timeout: Duration,
) -> Result<Reply, TransportError> {
    match tokio::time::timeout(timeout, authority.send(request)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout),
    }
}
