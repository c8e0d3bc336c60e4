//! Chroma vector-store client.
//!
//! Thin reqwest wrapper over Chroma's v1 REST API, speaking to a server
//! such as `http://localhost:8000`. The collection is resolved lazily on
//! first use with `get_or_create`, so a fresh server needs no manual
//! setup. Implements [`VectorStore`] for the embedding index.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::index::{DocMetadata, QueryHit, StoreError, StoredDocument, VectorStore};

/// Collection documents are upserted into unless configured otherwise.
pub const DEFAULT_COLLECTION: &str = "articles";
/// Per-request timeout for store calls.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ChromaStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    collection_id: OnceCell<String>,
}

impl ChromaStore {
    pub fn new(host: &str, port: u16, collection: &str) -> Result<Self, StoreError> {
        Self::with_base_url(format!("http://{host}:{port}"), collection)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        collection: &str,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_STORE_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            collection_id: OnceCell::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{path}", self.base_url)
    }

    /// Resolve (and on first call create) the collection, caching its id
    /// for the life of the store.
    async fn collection_id(&self) -> Result<&str, StoreError> {
        self.collection_id
            .get_or_try_init(|| async {
                let body = json!({
                    "name": self.collection,
                    "metadata": { "description": "Article summaries and content for retrieval" },
                    "get_or_create": true,
                });
                let response = self
                    .client
                    .post(self.url("collections"))
                    .json(&body)
                    .send()
                    .await?;
                let info: CollectionInfo = check(response).await?.json().await?;
                debug!(collection = %self.collection, id = %info.id, "collection resolved");
                Ok(info.id)
            })
            .await
            .map(String::as_str)
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn heartbeat(&self) -> Result<(), StoreError> {
        let response = self.client.get(self.url("heartbeat")).send().await?;
        check(response).await?;
        Ok(())
    }

    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        document: &str,
        metadata: &DocMetadata,
    ) -> Result<(), StoreError> {
        let collection_id = self.collection_id().await?;
        let request = UpsertRequest {
            ids: [id],
            embeddings: [vector],
            documents: [document],
            metadatas: [metadata],
        };
        let response = self
            .client
            .post(self.url(&format!("collections/{collection_id}/upsert")))
            .json(&request)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<QueryHit>, StoreError> {
        let collection_id = self.collection_id().await?;
        let request = QueryRequest {
            query_embeddings: [vector],
            n_results: limit,
            include: INCLUDE_ALL,
        };
        let response = self
            .client
            .post(self.url(&format!("collections/{collection_id}/query")))
            .json(&request)
            .send()
            .await?;
        let payload: QueryResponse = check(response).await?.json().await?;
        payload.into_hits()
    }

    async fn fetch(&self, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        let collection_id = self.collection_id().await?;
        let body = json!({
            "ids": [id],
            "include": ["documents", "metadatas"],
        });
        let response = self
            .client
            .post(self.url(&format!("collections/{collection_id}/get")))
            .json(&body)
            .send()
            .await?;
        let payload: GetResponse = check(response).await?.json().await?;
        Ok(payload.into_document())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let collection_id = self.collection_id().await?;
        let response = self
            .client
            .post(self.url(&format!("collections/{collection_id}/delete")))
            .json(&json!({ "ids": [id] }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let collection_id = self.collection_id().await?;
        let response = self
            .client
            .get(self.url(&format!("collections/{collection_id}/count")))
            .send()
            .await?;
        let count = check(response).await?.json().await?;
        Ok(count)
    }
}

async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(StoreError::Api {
        status: status.as_u16(),
        message,
    })
}

const INCLUDE_ALL: [&str; 3] = ["documents", "metadatas", "distances"];

#[derive(Deserialize)]
struct CollectionInfo {
    id: String,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    ids: [&'a str; 1],
    embeddings: [&'a [f32]; 1],
    documents: [&'a str; 1],
    metadatas: [&'a DocMetadata; 1],
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query_embeddings: [&'a [f32]; 1],
    n_results: usize,
    include: [&'a str; 3],
}

/// Query results come back batched per query vector; we always send one.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Vec<Vec<Option<DocMetadata>>>,
    #[serde(default)]
    distances: Vec<Vec<f32>>,
}

impl QueryResponse {
    fn into_hits(self) -> Result<Vec<QueryHit>, StoreError> {
        let ids = self.ids.into_iter().next().unwrap_or_default();
        let documents = self.documents.into_iter().next().unwrap_or_default();
        let metadatas = self.metadatas.into_iter().next().unwrap_or_default();
        let distances = self.distances.into_iter().next().unwrap_or_default();
        if distances.len() < ids.len() {
            return Err(StoreError::Malformed(format!(
                "{} ids but {} distances",
                ids.len(),
                distances.len()
            )));
        }
        let hits = ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| QueryHit {
                id,
                document: documents.get(i).cloned().flatten().unwrap_or_default(),
                metadata: metadatas.get(i).cloned().flatten().unwrap_or_default(),
                distance: distances[i],
            })
            .collect();
        Ok(hits)
    }
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    documents: Vec<Option<String>>,
    #[serde(default)]
    metadatas: Vec<Option<DocMetadata>>,
}

impl GetResponse {
    fn into_document(mut self) -> Option<StoredDocument> {
        if self.ids.is_empty() {
            return None;
        }
        Some(StoredDocument {
            id: self.ids.swap_remove(0),
            document: self
                .documents
                .first()
                .cloned()
                .flatten()
                .unwrap_or_default(),
            metadata: self
                .metadatas
                .first()
                .cloned()
                .flatten()
                .unwrap_or_default(),
        })
    }
}
