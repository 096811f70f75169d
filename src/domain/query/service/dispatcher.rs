use futures::future::join_all;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::client::search_client::{SearchClient, SearchClientError};
use crate::core::settings::ConnectionSettings;
use crate::domain::query::error::{DispatchError, QueryError};
use crate::domain::query::model::{
    Query, QueryDataResponse, QueryEntry, QueryRequest, QueryResult, QueryStatus,
};
use crate::domain::query::service::interval_calculator::IntervalCalculator;
use crate::domain::query::service::query_builder::build_backend_request;

pub const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 8;
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchLimits {
    /// Backend calls in flight at once, across all batches of this dispatcher.
    pub max_concurrent_queries: usize,
    /// Deadline for a whole batch; `None` waits for the caller to cancel.
    pub query_timeout: Option<Duration>,
}

impl Default for DispatchLimits {
    fn default() -> Self {
        Self {
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,
            query_timeout: Some(DEFAULT_QUERY_TIMEOUT),
        }
    }
}

/// Runs every query of a batch and collects one result per `ref_id`.
pub struct Dispatcher {
    client: Arc<dyn SearchClient>,
    calculator: IntervalCalculator,
    settings: Arc<ConnectionSettings>,
    limiter: Arc<Semaphore>,
    query_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelReason {
    Requested,
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Requested => write!(f, "request cancelled"),
            CancelReason::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Cancellation shared by all queries of one dispatch call.
struct CancelScope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CancelScope {
    fn new(token: CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            token,
            // a deadline too far out to represent behaves like no deadline
            deadline: timeout.and_then(|t| Instant::now().checked_add(t)),
        }
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline_passed()
    }

    fn reason(&self) -> CancelReason {
        if self.deadline_passed() {
            CancelReason::DeadlineExceeded
        } else {
            CancelReason::Requested
        }
    }

    /// Resolves once the token fires or the deadline passes. Reaching the
    /// deadline cancels the token so adapters observe it too.
    async fn cancelled(&self) -> CancelReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => self.reason(),
                    _ = tokio::time::sleep_until(deadline) => {
                        self.token.cancel();
                        CancelReason::DeadlineExceeded
                    }
                }
            }
            None => {
                self.token.cancelled().await;
                CancelReason::Requested
            }
        }
    }

    fn cancelled_result(&self) -> QueryResult {
        QueryError::Cancelled(self.reason().to_string()).into()
    }
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn SearchClient>,
        calculator: IntervalCalculator,
        settings: Arc<ConnectionSettings>,
        limits: DispatchLimits,
    ) -> Self {
        Self {
            client,
            calculator,
            settings,
            limiter: Arc::new(Semaphore::new(limits.max_concurrent_queries.max(1))),
            query_timeout: limits.query_timeout,
        }
    }

    pub async fn dispatch(&self, request: &QueryRequest) -> Result<QueryDataResponse, DispatchError> {
        self.dispatch_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Like [`dispatch`](Self::dispatch), stopping early when `cancel` fires.
    ///
    /// Queries still running or waiting at that point resolve to `Cancelled`;
    /// finished results are kept.
    pub async fn dispatch_with_cancel(
        &self,
        request: &QueryRequest,
        cancel: CancellationToken,
    ) -> Result<QueryDataResponse, DispatchError> {
        validate_batch(request)?;

        let request_id = Uuid::new_v4();
        let started = std::time::Instant::now();
        let scope = CancelScope::new(cancel.child_token(), self.query_timeout);

        info!(
            %request_id,
            queries = request.queries.len(),
            "Dispatching query batch"
        );

        let outcomes = join_all(
            request
                .queries
                .iter()
                .map(|entry| self.run_entry(request_id, entry, &scope)),
        )
        .await;

        let response: QueryDataResponse = request
            .queries
            .iter()
            .map(|entry| entry.ref_id().to_string())
            .zip(outcomes)
            .collect();

        let (mut succeeded, mut failed, mut cancelled) = (0, 0, 0);
        for result in response.results.values() {
            match result.status() {
                QueryStatus::Succeeded => succeeded += 1,
                QueryStatus::Failed => failed += 1,
                QueryStatus::Cancelled => cancelled += 1,
            }
        }
        info!(
            %request_id,
            succeeded,
            failed,
            cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query batch finished"
        );

        Ok(response)
    }

    async fn run_entry(&self, request_id: Uuid, entry: &QueryEntry, scope: &CancelScope) -> QueryResult {
        match entry {
            QueryEntry::Valid(query) => self.run_query(request_id, query, scope).await,
            QueryEntry::Malformed { ref_id, reason } => {
                warn!(%request_id, ref_id = ref_id.as_str(), "Rejected malformed query: {}", reason);
                QueryError::validation(format!("malformed query: {}", reason)).into()
            }
        }
    }

    async fn run_query(&self, request_id: Uuid, query: &Query, scope: &CancelScope) -> QueryResult {
        let ref_id = query.ref_id.as_str();

        if scope.is_cancelled() {
            return scope.cancelled_result();
        }

        // Pending -> Built
        let target_points = query
            .max_data_points
            .filter(|p| *p > 0)
            .unwrap_or(self.calculator.target_points());
        // first hint the minimum allows; an explicit histogram interval below it
        // falls back to intervalMs
        let hint = query
            .interval_hints()
            .find(|h| *h >= self.calculator.min_interval());
        let interval = self
            .calculator
            .compute(&query.time_range, hint, target_points);

        let backend_request = match build_backend_request(query, interval, &self.settings) {
            Ok(req) => req,
            Err(err) => {
                warn!(%request_id, ref_id, "Rejected query: {}", err);
                return err.into();
            }
        };
        debug!(%request_id, ref_id, ?interval, kind = ?backend_request.kind, "Built search request");

        let _permit = tokio::select! {
            biased;
            permit = self.limiter.acquire() => match permit {
                Ok(p) => p,
                Err(_) => return QueryError::Backend("dispatcher is shut down".into()).into(),
            },
            reason = scope.cancelled() => return QueryError::Cancelled(reason.to_string()).into(),
        };

        if scope.is_cancelled() {
            return scope.cancelled_result();
        }

        // Built -> Executing
        let started = std::time::Instant::now();
        let outcome = tokio::select! {
            biased;
            res = self.client.execute(&backend_request, &scope.token) => res,
            reason = scope.cancelled() => {
                debug!(%request_id, ref_id, "Query cancelled in flight: {}", reason);
                return QueryError::Cancelled(reason.to_string()).into();
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(frames) => {
                debug!(%request_id, ref_id, frames = frames.len(), elapsed_ms, "Query succeeded");
                QueryResult::success(frames)
            }
            Err(SearchClientError::Cancelled) => scope.cancelled_result(),
            Err(err) => {
                warn!(%request_id, ref_id, elapsed_ms, "❌ Query failed: {}", err);
                QueryError::from(err).into()
            }
        }
    }
}

/// Empty batches and repeated `ref_id`s reject the whole request.
fn validate_batch(request: &QueryRequest) -> Result<(), DispatchError> {
    if request.queries.is_empty() {
        return Err(DispatchError::EmptyBatch);
    }

    let mut seen = HashSet::with_capacity(request.queries.len());
    for entry in &request.queries {
        if !seen.insert(entry.ref_id()) {
            return Err(DispatchError::DuplicateRefId(entry.ref_id().to_string()));
        }
    }
    Ok(())
}
