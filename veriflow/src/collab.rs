//! External collaboration seams.
//!
//! The pipeline talks to two outside services: a text-producing
//! capability (planner, analyst, composer backends) and a read-only
//! query executor. Both are trait objects so tests and embedders can
//! supply their own implementations.

use crate::errors::QueryError;
use crate::groundtruth::ResultSet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// One unit of retrieval work, produced by planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    /// Stable task identifier.
    pub id: String,
    /// Why this query is being issued.
    pub purpose: String,
    /// The exact query to execute.
    pub query: String,
}

impl SubTask {
    /// Creates a sub-task.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        purpose: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            purpose: purpose.into(),
            query: query.into(),
        }
    }
}

/// A request to the external capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    /// Stage guidance, possibly amended with validation discrepancies.
    pub guidance: String,
    /// Context the stage hands over, as plain JSON.
    pub context: serde_json::Value,
}

impl CapabilityRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(guidance: impl Into<String>, context: serde_json::Value) -> Self {
        Self {
            guidance: guidance.into(),
            context,
        }
    }
}

/// A capability response: narrative text plus optional structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityResponse {
    /// Free-form text output.
    pub text: String,
    /// Structured payload, when the capability produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
    /// Sub-tasks the capability wants executed (planning only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_requests: Vec<SubTask>,
}

impl CapabilityResponse {
    /// Creates a plain-text response.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            structured: None,
            sub_requests: Vec::new(),
        }
    }

    /// Attaches sub-tasks.
    #[must_use]
    pub fn with_sub_requests(mut self, sub_requests: Vec<SubTask>) -> Self {
        self.sub_requests = sub_requests;
        self
    }
}

/// The external text-producing capability behind every stage.
#[async_trait]
pub trait CapabilityClient: Send + Sync + Debug {
    /// Completes one request. Errors are recoverable and count as a
    /// failed attempt for the calling stage.
    async fn complete(&self, request: CapabilityRequest) -> anyhow::Result<CapabilityResponse>;
}

/// Read-only query execution against the data source.
#[async_trait]
pub trait QueryExecutor: Send + Sync + Debug {
    /// Executes one query and returns its result set verbatim.
    async fn execute(&self, query: &str) -> Result<ResultSet, QueryError>;
}
