//! Mock collaborators with canned responses and call recording.

use crate::collab::{CapabilityClient, CapabilityRequest, CapabilityResponse, QueryExecutor};
use crate::errors::QueryError;
use crate::groundtruth::ResultSet;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// A capability that replays queued responses and records every request.
///
/// Clones share state, so a clone kept by the test observes calls made
/// through the clone handed to the pipeline. When the queue is empty the
/// last queued response is repeated; with nothing queued a neutral text
/// response is returned.
#[derive(Debug, Clone, Default)]
pub struct MockCapability {
    inner: Arc<CapabilityInner>,
}

#[derive(Debug, Default)]
struct CapabilityInner {
    responses: Mutex<VecDeque<CapabilityResponse>>,
    repeat_last: Mutex<Option<CapabilityResponse>>,
    fail_with: Mutex<Option<String>>,
    requests: Mutex<Vec<CapabilityRequest>>,
}

impl MockCapability {
    /// Creates a mock with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock whose every call fails with the given message.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        let mock = Self::new();
        *mock.inner.fail_with.lock() = Some(message.into());
        mock
    }

    /// Queues a response.
    #[must_use]
    pub fn with_response(self, response: CapabilityResponse) -> Self {
        self.inner.responses.lock().push_back(response);
        self
    }

    /// Queues a plain-text response.
    #[must_use]
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_response(CapabilityResponse::text(text))
    }

    /// Number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.inner.requests.lock().len()
    }

    /// The most recent request, if any.
    #[must_use]
    pub fn last_request(&self) -> Option<CapabilityRequest> {
        self.inner.requests.lock().last().cloned()
    }

    /// The guidance of the most recent request, if any.
    #[must_use]
    pub fn last_guidance(&self) -> Option<String> {
        self.last_request().map(|r| r.guidance)
    }
}

#[async_trait]
impl CapabilityClient for MockCapability {
    async fn complete(&self, request: CapabilityRequest) -> anyhow::Result<CapabilityResponse> {
        self.inner.requests.lock().push(request);

        if let Some(message) = self.inner.fail_with.lock().clone() {
            anyhow::bail!(message);
        }

        if let Some(response) = self.inner.responses.lock().pop_front() {
            *self.inner.repeat_last.lock() = Some(response.clone());
            return Ok(response);
        }
        if let Some(last) = self.inner.repeat_last.lock().clone() {
            return Ok(last);
        }
        Ok(CapabilityResponse::text("acknowledged"))
    }
}

/// A query executor with canned per-query results and optional delays.
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockExecutor {
    inner: Arc<ExecutorInner>,
}

#[derive(Debug, Default)]
struct ExecutorInner {
    results: Mutex<HashMap<String, Result<ResultSet, String>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
}

impl MockExecutor {
    /// Creates an executor with no canned results.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cans a successful result for a query.
    #[must_use]
    pub fn with_result(self, query: impl Into<String>, result: ResultSet) -> Self {
        self.inner.results.lock().insert(query.into(), Ok(result));
        self
    }

    /// Cans a failure for a query.
    #[must_use]
    pub fn with_error(self, query: impl Into<String>, error: impl Into<String>) -> Self {
        self.inner
            .results
            .lock()
            .insert(query.into(), Err(error.into()));
        self
    }

    /// Delays a query's completion.
    #[must_use]
    pub fn with_delay(self, query: impl Into<String>, delay: Duration) -> Self {
        self.inner.delays.lock().insert(query.into(), delay);
        self
    }

    /// Queries received, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().clone()
    }
}

#[async_trait]
impl QueryExecutor for MockExecutor {
    async fn execute(&self, query: &str) -> Result<ResultSet, QueryError> {
        self.inner.calls.lock().push(query.to_string());

        // Guards are dropped before awaiting.
        let delay = self.inner.delays.lock().get(query).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let canned = self.inner.results.lock().get(query).cloned();
        match canned {
            Some(Ok(result)) => Ok(result),
            Some(Err(error)) => Err(QueryError::Execution(error)),
            None => Err(QueryError::Execution(format!(
                "no canned result for query '{query}'"
            ))),
        }
    }
}
