//! Cached view of the knowledge base
//!
//! Failures never escape this layer. They are logged and turned into empty
//! results, `None` or `false`, so a flaky knowledge service cannot break the
//! conversation.

use tracing::{info, warn};

use crate::client::knowledge::DEFAULT_MAX_RESULTS;
use crate::client::{
    ApiResult, ClientError, KnowledgeClient, KnowledgeDetail, KnowledgeEntry, KnowledgeStats,
    RelevantKnowledge,
};

pub struct KnowledgeStore {
    client: KnowledgeClient,
    entries: Vec<KnowledgeEntry>,
    stats: KnowledgeStats,
}

impl KnowledgeStore {
    pub fn new(client: KnowledgeClient) -> Self {
        Self {
            client,
            entries: Vec::new(),
            stats: KnowledgeStats::default(),
        }
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn stats(&self) -> &KnowledgeStats {
        &self.stats
    }

    pub fn has_knowledge(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Refresh the entry list. Keeps the old list if the call fails.
    pub async fn load_entries(&mut self) {
        let result = self.client.list().await;
        self.apply_entries(result);
    }

    /// Refresh the statistics. Keeps the old values if the call fails.
    pub async fn load_stats(&mut self) {
        let result = self.client.stats().await;
        self.apply_stats(result);
    }

    /// Refresh entries and statistics together
    pub async fn load(&mut self) {
        let (entries, stats) = tokio::join!(self.client.list(), self.client.stats());
        self.apply_entries(entries);
        self.apply_stats(stats);
    }

    fn apply_entries(&mut self, result: Result<ApiResult<Vec<KnowledgeEntry>>, ClientError>) {
        match result {
            Ok(result) if result.success => self.entries = result.data.unwrap_or_default(),
            Ok(result) => warn!("Knowledge list refused: {:?}", result.message),
            Err(e) => warn!("Failed to load knowledge list: {}", e),
        }
    }

    fn apply_stats(&mut self, result: Result<ApiResult<KnowledgeStats>, ClientError>) {
        match result {
            Ok(result) => {
                if let Some(stats) = result.into_data() {
                    self.stats = stats;
                }
            }
            Err(e) => warn!("Failed to load knowledge stats: {}", e),
        }
    }

    /// Add an entry and refresh on success
    pub async fn add(&mut self, title: &str, content: &str) -> bool {
        match self.client.add(title, content).await {
            Ok(result) if result.success => {
                info!("Added knowledge entry {:?}", result.id);
                self.load().await;
                true
            }
            Ok(result) => {
                warn!("Knowledge add refused: {:?}", result.message);
                false
            }
            Err(e) => {
                warn!("Failed to add knowledge: {}", e);
                false
            }
        }
    }

    /// Delete an entry and refresh on success
    pub async fn delete(&mut self, id: &str) -> bool {
        match self.client.delete(id).await {
            Ok(result) if result.success => {
                info!("Deleted knowledge entry {}", id);
                self.load().await;
                true
            }
            Ok(result) => {
                warn!("Knowledge delete refused: {:?}", result.message);
                false
            }
            Err(e) => {
                warn!("Failed to delete knowledge: {}", e);
                false
            }
        }
    }

    pub async fn detail(&self, id: &str) -> Option<KnowledgeDetail> {
        match self.client.detail(id).await {
            Ok(result) => result.into_data(),
            Err(e) => {
                warn!("Failed to load knowledge detail: {}", e);
                None
            }
        }
    }

    /// Search with the default result limit
    pub async fn search(&self, query: &str) -> Vec<RelevantKnowledge> {
        self.search_with_limit(query, DEFAULT_MAX_RESULTS).await
    }

    pub async fn search_with_limit(&self, query: &str, max_results: usize) -> Vec<RelevantKnowledge> {
        match self.client.search(query, max_results).await {
            Ok(result) => result.into_data().unwrap_or_default(),
            Err(e) => {
                warn!("Failed to search knowledge: {}", e);
                Vec::new()
            }
        }
    }
}
