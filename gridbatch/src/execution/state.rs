//! Execution states and the state tracker used by batch job handles.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Lifecycle stage of a remote batch job or of one execution attempt.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum ExecutionState {
    /// Not yet submitted (input staging may be in progress).
    #[default]
    Ready,

    /// Accepted by the remote job service, waiting in its queue.
    Submitted,

    /// Executing on the remote site.
    Running,

    /// Finished remotely; results can be retrieved.
    Done,

    /// Failed remotely.
    Failed,

    /// Terminated, either by an explicit kill or after successful finalization.
    Killed,
}

impl ExecutionState {
    /// Returns true if the remote side will not change this state any more.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Killed)
    }

    /// Progress rank used to check monotonic state sequences.
    ///
    /// `Failed` and `Killed` sit outside the normal progression and have no rank.
    pub fn progress_rank(&self) -> Option<u8> {
        match self {
            Self::Ready => Some(0),
            Self::Submitted => Some(1),
            Self::Running => Some(2),
            Self::Done => Some(3),
            Self::Failed | Self::Killed => None,
        }
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "READY"),
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Done => write!(f, "DONE"),
            Self::Failed => write!(f, "FAILED"),
            Self::Killed => write!(f, "KILLED"),
        }
    }
}

// =============================================================================
// State Tracker
// =============================================================================

#[derive(Debug)]
struct TrackedState {
    state: ExecutionState,
    since: Instant,
    last_status_duration: Duration,
}

/// Thread-safe record of a batch job's state and its timing.
///
/// Job service implementations embed this to answer the cached
/// [`BatchJob::state`](super::BatchJob::state) and
/// [`BatchJob::last_status_duration`](super::BatchJob::last_status_duration)
/// queries. Each change of state stores how long the previous state lasted.
#[derive(Debug)]
pub struct StateTracker {
    inner: Mutex<TrackedState>,
}

impl StateTracker {
    /// Creates a tracker starting in the given state.
    pub fn new(initial: ExecutionState) -> Self {
        Self {
            inner: Mutex::new(TrackedState {
                state: initial,
                since: Instant::now(),
                last_status_duration: Duration::ZERO,
            }),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ExecutionState {
        self.inner.lock().state
    }

    /// Records a new state. Returns true if the state changed.
    pub fn set(&self, state: ExecutionState) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == state {
            return false;
        }
        let now = Instant::now();
        inner.last_status_duration = now.duration_since(inner.since);
        inner.since = now;
        inner.state = state;
        true
    }

    /// Returns how long the previous state lasted before the latest change.
    pub fn last_status_duration(&self) -> Duration {
        self.inner.lock().last_status_duration
    }

    /// Returns how long the job has been in its current state.
    pub fn time_in_state(&self) -> Duration {
        self.inner.lock().since.elapsed()
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new(ExecutionState::Submitted)
    }
}
