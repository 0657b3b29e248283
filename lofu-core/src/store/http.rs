//! REST document + object store.
//!
//! - `POST   {base}/users/{uid}/captures` -> `{ "id": ... }`
//! - `PATCH  {base}/users/{uid}/captures/{id}`
//! - `GET    {base}/users/{uid}/captures?limit=&cursor=` -> `{ items, next_cursor }`
//! - `DELETE {base}/users/{uid}/captures/{id}`
//! - `PUT    {base}/objects/users/{uid}/captures/{id}/{name}` -> `{ path, url }`

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::{CaptureId, CaptureRecord, CaptureStore, NewRecord, ObjectRef, Page, RecordPatch};
use crate::codec::EncodedImage;
use crate::config::PipelineConfig;
use crate::error::{LofuError, Result};

#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base: Url,
}

#[derive(Deserialize)]
struct CreatedBody {
    id: CaptureId,
}

impl HttpStore {
    /// Build a store client for `config.store_url`.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let base_url = config
            .store_url
            .as_deref()
            .ok_or_else(|| LofuError::Config("no store URL configured".into()))?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LofuError::Config(format!("Failed to create HTTP client: {e}")))?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| LofuError::Config(format!("invalid store URL {base_url:?}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(LofuError::Config(format!("store URL {base_url:?} cannot be a base")));
        }
        Ok(Self { client, base })
    }

    /// Base URL extended with percent-encoded path segments.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| LofuError::Config("store URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn captures_url(&self, uid: &str) -> Result<Url> {
        self.url(&["users", uid, "captures"])
    }

    fn record_url(&self, uid: &str, id: &CaptureId) -> Result<Url> {
        self.url(&["users", uid, "captures", id.as_str()])
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            warn!(operation, error = %e, "Store request failed");
            LofuError::Store(format!("{operation}: {e}"))
        })?;

        let status = response.status();
        debug!(operation, status = %status, "Store responded");
        if !status.is_success() {
            warn!(operation, status = %status, "Store returned an error");
            return Err(LofuError::Store(format!("{operation}: store returned status {status}")));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, operation: &str, request: RequestBuilder) -> Result<T> {
        self.send(operation, request)
            .await?
            .json()
            .await
            .map_err(|e| LofuError::Store(format!("{operation}: unexpected response body: {e}")))
    }
}

#[async_trait]
impl CaptureStore for HttpStore {
    #[instrument(skip(self, record), fields(session = %record.session))]
    async fn create_record(&self, uid: &str, record: &NewRecord) -> Result<CaptureId> {
        let request = self.client.post(self.captures_url(uid)?).json(record);
        let body: CreatedBody = self.send_json("create record", request).await?;
        Ok(body.id)
    }

    #[instrument(skip(self, image), fields(bytes = image.bytes.len()))]
    async fn put_object(
        &self,
        uid: &str,
        id: &CaptureId,
        name: &str,
        image: &EncodedImage,
    ) -> Result<ObjectRef> {
        let url = self.url(&["objects", "users", uid, "captures", id.as_str(), name])?;
        let request = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, image.mime.as_str())
            .body(image.bytes.clone());
        self.send_json("upload object", request).await
    }

    #[instrument(skip(self, patch))]
    async fn update_record(&self, uid: &str, id: &CaptureId, patch: &RecordPatch) -> Result<()> {
        let request = self.client.patch(self.record_url(uid, id)?).json(patch);
        self.send("update record", request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self, uid: &str, page_size: usize, cursor: Option<&str>) -> Result<Page<CaptureRecord>> {
        let mut url = self.captures_url(uid)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &page_size.to_string());
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }
        let page: Page<CaptureRecord> = self.send_json("list records", self.client.get(url)).await?;
        // A short page never carries a cursor, whatever the server says.
        Ok(Page::new(page.items, page_size, page.next_cursor))
    }

    #[instrument(skip(self))]
    async fn delete(&self, uid: &str, id: &CaptureId) -> Result<()> {
        let request = self.client.delete(self.record_url(uid, id)?);
        self.send("delete record", request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(base: &str) -> HttpStore {
        HttpStore::with_client(Client::new(), base).unwrap()
    }

    #[test]
    fn test_urls_are_segment_encoded() {
        let s = store("https://store.example/api/");
        let id = CaptureId::new("r 1");
        assert_eq!(
            s.record_url("u/1", &id).unwrap().as_str(),
            "https://store.example/api/users/u%2F1/captures/r%201"
        );
        assert_eq!(
            s.captures_url("u1").unwrap().as_str(),
            "https://store.example/api/users/u1/captures"
        );
    }

    #[test]
    fn test_rejects_non_base_urls() {
        assert!(HttpStore::with_client(Client::new(), "mailto:someone@example.com").is_err());
        assert!(HttpStore::with_client(Client::new(), "not a url").is_err());
    }

    #[test]
    fn test_requires_store_url() {
        let err = HttpStore::new(&PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, LofuError::Config(_)));
    }
}
