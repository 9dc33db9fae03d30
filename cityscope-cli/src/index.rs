use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url, header};
use serde::Deserialize;

use cityscope_core::dataset::{DatasetIndex, IndexRecord};
use cityscope_core::error::TransportError;

use crate::hub::transport_error;

#[derive(Deserialize)]
struct SearchResponse {
    items: Vec<IndexRecord>,
}

/// Repository search on the GitHub API.
pub struct GithubIndex {
    client: Client,
    search_url: Url,
    owner: String,
}

impl GithubIndex {
    pub fn new(search_url: &str, owner: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cityscope/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            search_url: Url::parse(search_url)?,
            owner: owner.to_string(),
        })
    }

    pub fn query_url(&self) -> Url {
        let mut url = self.search_url.clone();
        url.query_pairs_mut()
            .append_pair("q", &format!("user:{}", self.owner))
            .append_pair("order", "desc");
        url
    }
}

pub fn parse_search(body: &str) -> Result<Vec<IndexRecord>, TransportError> {
    serde_json::from_str::<SearchResponse>(body)
        .map(|r| r.items)
        .map_err(|e| TransportError::Other(format!("unexpected index response: {}", e)))
}

#[async_trait]
impl DatasetIndex for GithubIndex {
    async fn search(&self) -> Result<Vec<IndexRecord>, TransportError> {
        let response = self
            .client
            .get(self.query_url())
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Other(format!("index returned HTTP {}", status)));
        }
        let body = response.text().await.map_err(transport_error)?;
        parse_search(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_url() {
        let index = GithubIndex::new(
            "https://api.github.com/search/repositories",
            "EdinburghCityScope",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            index.query_url().as_str(),
            "https://api.github.com/search/repositories?q=user%3AEdinburghCityScope&order=desc"
        );
    }

    #[test]
    fn test_parse_search_response() {
        let body = r#"{
  "total_count": 2,
  "incomplete_results": false,
  "items": [
    {
      "id": 1,
      "name": "edinburgh-libraries",
      "full_name": "EdinburghCityScope/edinburgh-libraries",
      "description": "Edinburgh public libraries",
      "html_url": "https://github.com/EdinburghCityScope/edinburgh-libraries",
      "stargazers_count": 3
    },
    {
      "id": 2,
      "name": "cityscope-notebook",
      "full_name": "EdinburghCityScope/cityscope-notebook",
      "description": null,
      "html_url": "https://github.com/EdinburghCityScope/cityscope-notebook"
    }
  ]
}"#;
        let records = parse_search(body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].full_name, "EdinburghCityScope/edinburgh-libraries");
        assert_eq!(records[1].description, None);
    }

    #[test]
    fn test_parse_error_is_transport_error() {
        assert!(matches!(
            parse_search(r#"{"message": "API rate limit exceeded"}"#),
            Err(TransportError::Other(_))
        ));
    }
}
