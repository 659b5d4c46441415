//! Knowledge base endpoints
//!
//! The knowledge base is an opaque collaborator: entries go in, relevant
//! segments come out. Every call answers with an [`ApiResult`] envelope.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::stream::DEFAULT_TIMEOUT;

use super::{read_json, ApiResult, ClientError};

/// Default number of segments returned by a search
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// A stored knowledge entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content_length: usize,
    #[serde(default)]
    pub segment_count: usize,
    #[serde(default)]
    pub segment_ids: Vec<String>,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub created_at: i64,
}

/// An entry with the full text of its segments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeDetail {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content_length: usize,
    #[serde(default)]
    pub segment_count: usize,
    #[serde(default)]
    pub segments: Vec<String>,
    #[serde(default)]
    pub created_at: i64,
}

/// A segment matched by a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelevantKnowledge {
    pub content: String,
    pub score: f64,
    #[serde(default)]
    pub source_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeStats {
    pub total_entries: usize,
    pub total_segments: usize,
    #[serde(default)]
    pub total_characters: u64,
    #[serde(default)]
    pub embedding_model: String,
}

#[derive(Debug, Clone)]
pub struct KnowledgeClient {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl KnowledgeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound every call, from connect to the end of the body
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/knowledge{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path)).timeout(self.timeout)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path)).timeout(self.timeout)
    }

    fn delete_request(&self, path: &str) -> RequestBuilder {
        self.client.delete(self.url(path)).timeout(self.timeout)
    }

    pub async fn list(&self) -> Result<ApiResult<Vec<KnowledgeEntry>>, ClientError> {
        let response = self.get("").send().await?;
        read_json(response).await
    }

    /// Add an entry; the new id comes back in [`ApiResult::id`]
    pub async fn add(&self, title: &str, content: &str) -> Result<ApiResult<Value>, ClientError> {
        let response = self
            .post("")
            .json(&json!({ "title": title, "content": content }))
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn delete(&self, id: &str) -> Result<ApiResult<Value>, ClientError> {
        let response = self.delete_request(&format!("/{}", id)).send().await?;
        read_json(response).await
    }

    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<ApiResult<Vec<RelevantKnowledge>>, ClientError> {
        let response = self
            .post("/search")
            .json(&json!({ "query": query, "maxResults": max_results }))
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn stats(&self) -> Result<ApiResult<KnowledgeStats>, ClientError> {
        let response = self.get("/stats").send().await?;
        read_json(response).await
    }

    pub async fn detail(&self, id: &str) -> Result<ApiResult<KnowledgeDetail>, ClientError> {
        let response = self.get(&format!("/{}", id)).send().await?;
        read_json(response).await
    }
}
