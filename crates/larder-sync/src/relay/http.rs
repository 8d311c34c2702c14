//! HTTP client for a `larder-relay` server

use std::time::Duration;

use async_trait::async_trait;
use larder_core::{Document, GroupId, RelayError, RemoteStore};
use reqwest::{Client, Response, Url};
use tracing::{debug, instrument};

/// [`RemoteStore`] backed by a relay server.
///
/// Routes:
/// - `PUT {base}/v1/groups/{group}/collections/{collection}/documents/{id}`
/// - `GET {base}/v1/groups/{group}/collections/{collection}/documents`
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base: Url,
}

impl HttpRemoteStore {
    /// Client for the server at `base_url` with a request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("larder-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::unavailable(e.to_string()))?;
        Self::with_client(base_url, client)
    }

    /// Client for the server at `base_url` using an existing reqwest client
    pub fn with_client(base_url: &str, client: Client) -> Result<Self, RelayError> {
        let base = Url::parse(base_url)
            .map_err(|e| RelayError::unavailable(format!("invalid relay url {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(RelayError::unavailable(format!(
                "invalid relay url {base_url}: not a base url"
            )));
        }
        Ok(Self { client, base })
    }

    /// Server base URL
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn documents_url(&self, group: &GroupId, collection: &str, id: Option<&str>) -> Result<Url, RelayError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RelayError::unavailable("relay url cannot be a base"))?;
            segments
                .pop_if_empty()
                .extend(["v1", "groups", group.as_str(), "collections", collection, "documents"]);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }
}

async fn check_status(response: Response) -> Result<Response, RelayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(RelayError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    #[instrument(skip(self, group, document), fields(group = %group, id = %document.id))]
    async fn upsert(
        &self,
        group: &GroupId,
        collection: &str,
        document: &Document,
    ) -> Result<(), RelayError> {
        let url = self.documents_url(group, collection, Some(document.id.as_str()))?;
        let response = self
            .client
            .put(url)
            .json(&document.to_value())
            .send()
            .await
            .map_err(|e| RelayError::unavailable(e.to_string()))?;
        check_status(response).await?;
        debug!(collection, "Document relayed");
        Ok(())
    }

    #[instrument(skip(self, group), fields(group = %group))]
    async fn list_all(&self, group: &GroupId, collection: &str) -> Result<Vec<Document>, RelayError> {
        let url = self.documents_url(group, collection, None)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RelayError::unavailable(e.to_string()))?;
        check_status(response)
            .await?
            .json::<Vec<Document>>()
            .await
            .map_err(|e| RelayError::decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_urls_are_escaped() {
        let store = HttpRemoteStore::new("http://localhost:8787/", Duration::from_secs(1)).unwrap();
        let url = store
            .documents_url(&GroupId::new("family 42"), "orders", Some("ORD/1"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8787/v1/groups/family%2042/collections/orders/documents/ORD%2F1"
        );
    }

    #[test]
    fn test_base_path_is_kept() {
        let store = HttpRemoteStore::new("http://relay.local/sync", Duration::from_secs(1)).unwrap();
        let url = store.documents_url(&GroupId::new("g"), "users", None).unwrap();
        assert_eq!(url.as_str(), "http://relay.local/sync/v1/groups/g/collections/users/documents");
    }

    #[test]
    fn test_invalid_base_rejected() {
        assert!(HttpRemoteStore::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpRemoteStore::new("mailto:ops@example.com", Duration::from_secs(1)).is_err());
    }
}
