//! Configuration of the optimizer.

use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

use crate::error::OptimizerError;

/// Algorithms used to order joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOrderStrategy {
    /// Join orders are explored by join commutativity and associativity rules.
    Transformations,
    /// Dynamic programming over connected subgraphs of a join graph.
    DPccp,
    /// Dynamic programming over all pairs of disjoint subsets of relations.
    DPBushy,
    /// Greedy operator ordering.
    Greedy,
}

impl Display for JoinOrderStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinOrderStrategy::Transformations => write!(f, "transformations"),
            JoinOrderStrategy::DPccp => write!(f, "dpccp"),
            JoinOrderStrategy::DPBushy => write!(f, "dpbushy"),
            JoinOrderStrategy::Greedy => write!(f, "greedy"),
        }
    }
}

/// Options of the optimizer.
#[derive(Debug, Clone)]
pub struct OptimizerOptions {
    /// Whether to search for the best plan using a memo. When disabled a plan is built bottom-up from
    /// the query as written.
    pub use_memo: bool,
    pub join_order: JoinOrderStrategy,
    /// The maximum number of relations handled by a dynamic programming enumerator.
    /// Larger join blocks are ordered greedily.
    pub dp_threshold: usize,
    pub enable_cross_joins: bool,
    pub enable_subquery_unnesting: bool,
    /// Whether to plan common table expressions once and share their plans. When disabled
    /// common table expressions are inlined.
    pub enable_cte_plan: bool,
    pub enable_broadcast: bool,
    pub enable_hash_join: bool,
    pub enable_merge_join: bool,
    /// Nested loop joins remain available for joins without equality keys.
    pub enable_nested_loop_join: bool,
    pub enable_streaming_aggregate: bool,
    pub enable_index_scan: bool,
    /// The number of workers. Plans are distributed when there is more than one worker.
    pub workers: usize,
    pub timeout: Option<Duration>,
    /// Whether to return a snapshot of the memo along with the plan.
    pub retain_memo: bool,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        OptimizerOptions {
            use_memo: true,
            join_order: JoinOrderStrategy::DPccp,
            dp_threshold: 10,
            enable_cross_joins: false,
            enable_subquery_unnesting: true,
            enable_cte_plan: false,
            enable_broadcast: true,
            enable_hash_join: true,
            enable_merge_join: true,
            enable_nested_loop_join: true,
            enable_streaming_aggregate: true,
            enable_index_scan: true,
            workers: 1,
            timeout: None,
            retain_memo: false,
        }
    }
}

impl OptimizerOptions {
    pub fn with_memo(mut self, value: bool) -> Self {
        self.use_memo = value;
        self
    }

    pub fn with_join_order(mut self, value: JoinOrderStrategy) -> Self {
        self.join_order = value;
        self
    }

    pub fn with_dp_threshold(mut self, value: usize) -> Self {
        self.dp_threshold = value;
        self
    }

    pub fn with_cross_joins(mut self, value: bool) -> Self {
        self.enable_cross_joins = value;
        self
    }

    pub fn with_subquery_unnesting(mut self, value: bool) -> Self {
        self.enable_subquery_unnesting = value;
        self
    }

    pub fn with_cte_plan(mut self, value: bool) -> Self {
        self.enable_cte_plan = value;
        self
    }

    pub fn with_broadcast(mut self, value: bool) -> Self {
        self.enable_broadcast = value;
        self
    }

    pub fn with_hash_join(mut self, value: bool) -> Self {
        self.enable_hash_join = value;
        self
    }

    pub fn with_merge_join(mut self, value: bool) -> Self {
        self.enable_merge_join = value;
        self
    }

    pub fn with_nested_loop_join(mut self, value: bool) -> Self {
        self.enable_nested_loop_join = value;
        self
    }

    pub fn with_streaming_aggregate(mut self, value: bool) -> Self {
        self.enable_streaming_aggregate = value;
        self
    }

    pub fn with_index_scan(mut self, value: bool) -> Self {
        self.enable_index_scan = value;
        self
    }

    /// Sets the number of workers. Zero is treated as one.
    pub fn with_workers(mut self, value: usize) -> Self {
        self.workers = value.max(1);
        self
    }

    pub fn with_timeout(mut self, value: Duration) -> Self {
        self.timeout = Some(value);
        self
    }

    pub fn with_retain_memo(mut self, value: bool) -> Self {
        self.retain_memo = value;
        self
    }

    /// Returns `true` if plans must take placement of rows across workers into account.
    pub fn is_distributed(&self) -> bool {
        self.workers > 1
    }
}

/// The point in time by which an optimization must complete.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    timeout: Duration,
    expires_at: Instant,
}

impl Deadline {
    /// Creates a deadline that expires after the given timeout elapses.
    pub fn after(timeout: Duration) -> Self {
        Deadline {
            timeout,
            expires_at: Instant::now() + timeout,
        }
    }

    /// Creates a deadline from the timeout of the given options.
    pub fn from_options(options: &OptimizerOptions) -> Option<Self> {
        options.timeout.map(Deadline::after)
    }

    /// Returns [OptimizerError::Timeout] if this deadline has expired.
    pub fn check(&self) -> Result<(), OptimizerError> {
        if Instant::now() >= self.expires_at {
            Err(OptimizerError::Timeout(self.timeout))
        } else {
            Ok(())
        }
    }
}

/// Shorthand for checking an optional deadline.
pub fn check_deadline(deadline: &Option<Deadline>) -> Result<(), OptimizerError> {
    match deadline {
        Some(deadline) => deadline.check(),
        None => Ok(()),
    }
}
