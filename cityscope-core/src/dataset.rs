//! Dataset selection for the loopback service
//!
//! Candidates come from an external repository index. The user picks a
//! subset and the selection is pushed to the loopback endpoint as a flat
//! JSON object (`{id: source}`).

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::authority::{HubRequest, RemoteAuthority, send_bounded};
use crate::error::{DatasetError, TransportError};
use crate::model::{DatasetCandidate, DatasetSelection, Resource};

/// Infrastructure repositories that live next to the datasets but are not
/// datasets themselves.
pub const DEFAULT_EXCLUDED: [&str; 3] = [
    "cityscope-loopback-docker",
    "edinburghcityscope-utils",
    "cityscope-notebook",
];

/// One repository as listed by the index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub html_url: String,
}

impl IndexRecord {
    fn into_candidate(self) -> DatasetCandidate {
        let display_name = match self.description {
            Some(d) if !d.trim().is_empty() => d,
            _ => self.name.clone(),
        };
        DatasetCandidate {
            id: self.name,
            display_name,
            detail_url: self.html_url,
            source_identifier: self.full_name,
        }
    }
}

/// Read-only search over the dataset repositories.
#[async_trait]
pub trait DatasetIndex: Send + Sync {
    async fn search(&self) -> Result<Vec<IndexRecord>, TransportError>;
}

/// One-shot candidate sequence; excluded records are skipped as it is read.
pub struct Candidates {
    records: std::vec::IntoIter<IndexRecord>,
    excluded: BTreeSet<String>,
}

impl Iterator for Candidates {
    type Item = DatasetCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        self.records
            .by_ref()
            .find(|r| !self.excluded.contains(&r.name))
            .map(IndexRecord::into_candidate)
    }
}

pub struct DatasetSelector {
    index: Arc<dyn DatasetIndex>,
    authority: Arc<dyn RemoteAuthority>,
    user: String,
    excluded: BTreeSet<String>,
    timeout: Duration,
}

impl DatasetSelector {
    pub fn new(
        index: Arc<dyn DatasetIndex>,
        authority: Arc<dyn RemoteAuthority>,
        user: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            index,
            authority,
            user: user.into(),
            excluded: DEFAULT_EXCLUDED.iter().map(|s| s.to_string()).collect(),
            timeout,
        }
    }

    pub fn with_excluded<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded = names.into_iter().map(Into::into).collect();
        self
    }

    pub async fn fetch_candidates(&self) -> Result<Candidates, DatasetError> {
        let search = tokio::time::timeout(self.timeout, self.index.search())
            .await
            .unwrap_or(Err(TransportError::Timeout));

        match search {
            Ok(records) => {
                info!(records = records.len(), "Fetched dataset index");
                Ok(Candidates {
                    records: records.into_iter(),
                    excluded: self.excluded.clone(),
                })
            }
            Err(e) => {
                warn!(error = %e, "Dataset index unavailable");
                Err(DatasetError::SourceUnavailable {
                    message: e.to_string(),
                })
            }
        }
    }

    /// Push the selection to the loopback service and return the hub's
    /// confirmation message.
    pub async fn submit(&self, selection: DatasetSelection) -> Result<String, DatasetError> {
        if selection.is_empty() {
            return Err(DatasetError::EmptySelection);
        }

        let body = serde_json::to_value(&selection).map_err(|e| {
            DatasetError::ConfigurationFailed {
                status: None,
                message: e.to_string(),
            }
        })?;
        let request = HubRequest::configure(&self.user, Resource::Loopback, body);

        info!(datasets = selection.len(), "Submitting dataset selection");
        match send_bounded(self.authority.as_ref(), request, self.timeout).await {
            Ok(reply) if reply.is_success() => Ok(reply.message()),
            Ok(reply) => {
                warn!(status = reply.status, "Dataset setup rejected");
                Err(DatasetError::ConfigurationFailed {
                    status: Some(reply.status),
                    message: reply.message(),
                })
            }
            Err(e) => Err(DatasetError::ConfigurationFailed {
                status: None,
                message: e.to_string(),
            }),
        }
    }
}
