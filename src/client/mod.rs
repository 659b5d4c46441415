//! HTTP clients for the assistant service

pub mod chat;
pub mod knowledge;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use chat::{ChatBackend, ChatClient, ChatReply};
pub use knowledge::{
    KnowledgeClient, KnowledgeDetail, KnowledgeEntry, KnowledgeStats, RelevantKnowledge,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("HTTP error! status: {0}")]
    Status(StatusCode),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Envelope used by the knowledge endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResult<T> {
    #[serde(default)]
    pub success: bool,

    pub data: Option<T>,

    #[serde(default)]
    pub message: Option<String>,

    /// Entry count on list/search responses
    #[serde(default)]
    pub total: Option<usize>,

    /// New entry id on add responses
    #[serde(default)]
    pub id: Option<String>,
}

impl<T> ApiResult<T> {
    /// Payload of a successful call, `None` otherwise
    pub fn into_data(self) -> Option<T> {
        if self.success {
            self.data
        } else {
            None
        }
    }
}

/// Fail on non-success status, then parse the JSON body
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::Status(status));
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        ClientError::InvalidResponse(format!("Failed to parse response: {} - Body: {}", e, body))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_api_result_success() {
        let result: ApiResult<Vec<String>> =
            serde_json::from_str(r#"{"success":true,"data":["a","b"],"total":2}"#).unwrap();
        assert_eq!(result.total, Some(2));
        assert_eq!(result.into_data(), Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_api_result_failure_hides_data() {
        let result: ApiResult<Value> =
            serde_json::from_str(r#"{"success":false,"message":"not found"}"#).unwrap();
        assert_eq!(result.message.as_deref(), Some("not found"));
        assert!(result.into_data().is_none());
    }
}
