use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url, header};
use tracing::debug;

use cityscope_core::authority::{HubRequest, Method, RemoteAuthority, Reply};
use cityscope_core::error::TransportError;

/// Hub REST API over HTTP.
pub struct HubClient {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HubClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            anyhow::bail!("hub url cannot be used as a base: {}", base_url);
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cityscope/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base,
            token,
        })
    }

    /// `<base>/api/users/<user>/<resource>[?credential=get]`
    pub fn endpoint(&self, request: &HubRequest) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Other(format!("invalid hub url: {}", self.base)))?
            .pop_if_empty()
            .extend(["api", "users", request.user.as_str(), request.resource.path()]);
        if request.credential {
            url.query_pairs_mut().append_pair("credential", "get");
        }
        Ok(url)
    }
}

pub(crate) fn transport_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

#[async_trait]
impl RemoteAuthority for HubClient {
    fn name(&self) -> &'static str {
        "hub"
    }

    async fn send(&self, request: HubRequest) -> Result<Reply, TransportError> {
        let url = self.endpoint(&request)?;
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };
        debug!(method = request.method.as_str(), %url, "Hub request");

        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.header(header::AUTHORIZATION, format!("token {}", token));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        Ok(Reply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cityscope_core::model::Resource;

    fn client(base: &str) -> HubClient {
        HubClient::new(base, None, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_endpoint_with_trailing_slash() {
        let hub = client("http://localhost:8000/hub/");
        let url = hub
            .endpoint(&HubRequest::status("alice", Resource::Loopback))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/hub/api/users/alice/loopback");
    }

    #[test]
    fn test_endpoint_without_trailing_slash() {
        let hub = client("http://localhost:8000/hub");
        let url = hub
            .endpoint(&HubRequest::start("alice", Resource::Mysql))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/hub/api/users/alice/mysql");
    }

    #[test]
    fn test_credential_query() {
        let hub = client("https://hub.example.org/hub/");
        let url = hub
            .endpoint(&HubRequest::credential("alice", Resource::Wordpress))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://hub.example.org/hub/api/users/alice/wordpress?credential=get"
        );
    }

    #[test]
    fn test_user_is_escaped() {
        let hub = client("http://localhost:8000/hub/");
        let url = hub
            .endpoint(&HubRequest::status("a b/c", Resource::Fieldtrip))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/hub/api/users/a%20b%2Fc/fieldtrip"
        );
    }

    #[test]
    fn test_rejects_non_base_url() {
        assert!(HubClient::new("mailto:hub@example.org", None, Duration::from_secs(1)).is_err());
    }
}
