//! Reconciliation loop primitives.
//!
//! This library provides helpers for implementing reconciliation loops
//! that converge actual state to desired state. Key concepts:
//!
//! - **Desired state**: What the device should look like (from the resource).
//! - **Actual state**: What the device actually looks like (read fresh).
//! - **Drift**: Any mismatch between the two; a reconcile corrects it.
//!
//! # Invariants
//!
//! - A reconcile attempt yields exactly one [`ReconcileOutcome`]
//! - At most one attempt per key is in flight ([`WorkQueue`])
//! - Retry timing belongs to the scheduler ([`RetryTracker`]), never to the attempt

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::time::Duration;

/// Result of one reconcile attempt.
#[derive(Debug)]
pub enum ReconcileOutcome<E> {
    /// Actual state already matched desired state (or the resource is gone).
    NoActionNeeded,

    /// Drift was detected and a correction was applied.
    Corrected,

    /// The attempt failed; the scheduler should requeue with backoff.
    Failed(E),
}

impl<E> ReconcileOutcome<E> {
    /// Returns true if the attempt failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns true if the attempt completed the cycle (no requeue needed).
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::NoActionNeeded | Self::Corrected)
    }

    /// Short label for structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoActionNeeded => "no_action",
            Self::Corrected => "corrected",
            Self::Failed(_) => "failed",
        }
    }

    /// Map the failure reason, leaving success variants untouched.
    pub fn map_err<F, O>(self, op: O) -> ReconcileOutcome<F>
    where
        O: FnOnce(E) -> F,
    {
        match self {
            Self::NoActionNeeded => ReconcileOutcome::NoActionNeeded,
            Self::Corrected => ReconcileOutcome::Corrected,
            Self::Failed(e) => ReconcileOutcome::Failed(op(e)),
        }
    }

    /// Returns the failure reason, if any.
    pub fn err(&self) -> Option<&E> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Exponential backoff: `base * 2^(attempt - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay after the first failure.
    pub base: Duration,

    /// Upper bound for any delay.
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl Backoff {
    /// Create a backoff policy.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before retrying after `attempt` consecutive failures.
    ///
    /// Attempt 0 means no failure yet and yields no delay.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let shift = (attempt - 1).min(31);
        self.base.saturating_mul(1u32 << shift).min(self.max)
    }
}

/// Retry tracker for failed reconciles.
///
/// Counts consecutive failures per key and turns them into backoff delays.
#[derive(Debug, Clone)]
pub struct RetryTracker<K> {
    backoff: Backoff,

    /// Tracked failures: key -> consecutive failure count.
    failures: HashMap<K, u32>,
}

impl<K: Eq + Hash> RetryTracker<K> {
    /// Create a new retry tracker.
    pub fn new(backoff: Backoff) -> Self {
        Self {
            backoff,
            failures: HashMap::new(),
        }
    }

    /// Record a failure for a key.
    ///
    /// Returns how long to wait before the next attempt.
    pub fn record_failure(&mut self, key: K) -> Duration {
        let count = self.failures.entry(key).or_insert(0);
        *count = count.saturating_add(1);
        self.backoff.delay(*count)
    }

    /// Consecutive failures recorded for a key.
    pub fn attempts(&self, key: &K) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }

    /// Clear failure tracking for a key (on success).
    pub fn clear(&mut self, key: &K) {
        self.failures.remove(key);
    }

    /// Number of keys with outstanding failures.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Returns true if no key has outstanding failures.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Deduplicating work queue with single-flight-per-key semantics.
///
/// - A key is queued at most once.
/// - A key handed out by [`WorkQueue::pop`] is not handed out again until
///   [`WorkQueue::done`] is called for it.
/// - Adding a key while it is being processed marks it dirty; `done` queues
///   it again so the latest trigger is never lost.
#[derive(Debug)]
pub struct WorkQueue<K> {
    queue: VecDeque<K>,

    /// Keys waiting to be processed (queued or re-added while processing).
    dirty: HashSet<K>,

    /// Keys currently handed out to a worker.
    processing: HashSet<K>,
}

impl<K> Default for WorkQueue<K> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            dirty: HashSet::new(),
            processing: HashSet::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> WorkQueue<K> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that `key` needs processing.
    pub fn add(&mut self, key: K) {
        if self.dirty.contains(&key) {
            return;
        }

        self.dirty.insert(key.clone());
        if self.processing.contains(&key) {
            return;
        }

        self.queue.push_back(key);
    }

    /// Hand out the oldest queued key and mark it as processing.
    pub fn pop(&mut self) -> Option<K> {
        let key = self.queue.pop_front()?;
        self.dirty.remove(&key);
        self.processing.insert(key.clone());
        Some(key)
    }

    /// Mark `key` as finished. Re-queues it if it was added meanwhile.
    pub fn done(&mut self, key: &K) {
        self.processing.remove(key);
        if self.dirty.contains(key) {
            self.queue.push_back(key.clone());
        }
    }

    /// Returns true if `key` is currently handed out.
    pub fn is_processing(&self, key: &K) -> bool {
        self.processing.contains(key)
    }

    /// Number of queued keys (not counting keys being processed).
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Default interval between full resyncs.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Default delay after the first failure.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Default upper bound for retry delays.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(5 * 60); // 5 minutes
