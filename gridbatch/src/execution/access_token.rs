//! Access tokens bounding concurrent submissions to job services.
//!
//! Every job service has a [`UsageControl`]: a semaphore-backed pool of
//! [`AccessToken`]s. A submission must hold a token for the duration of the
//! remote `submit` call, so a service never sees more concurrent submissions
//! than the pool capacity.
//!
//! Tokens go back to the pool through [`UsageControl::release_token`], which
//! consumes the token. A token dropped without an explicit release (for
//! example on an early return) is released by its `Drop` implementation, so a
//! token can neither be released twice nor leak.
//!
//! # Example
//!
//! ```ignore
//! use gridbatch::execution::{ResourceControl, ServiceDescription};
//!
//! let control = ResourceControl::new(8);
//! let usage = control.controller(&ServiceDescription::new("ce01.grid.example"));
//!
//! let token = usage.acquire_token().await;
//! // submit...
//! usage.release_token(token);
//! ```

use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

/// Default number of concurrent submissions per job service.
pub const DEFAULT_MAX_CONCURRENT_SUBMISSIONS: usize = 8;

/// Source of unique usage control identifiers.
static USAGE_CONTROL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifies a job service (endpoint, queue, protocol).
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct ServiceDescription(String);

impl ServiceDescription {
    pub fn new(description: impl Into<String>) -> Self {
        Self(description.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Counters
// =============================================================================

/// In-flight bookkeeping shared between a usage control and its tokens.
#[derive(Debug, Default)]
struct TokenCounters {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    released: AtomicUsize,
}

impl TokenCounters {
    fn acquired(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        let mut peak = self.peak_in_flight.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_in_flight.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }
    }

    fn released(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.released.fetch_add(1, Ordering::Relaxed);
    }
}

// =============================================================================
// Access Token
// =============================================================================

/// Capability to submit one job to a job service.
///
/// While held, the token counts against its usage control's capacity.
pub struct AccessToken {
    permit: Option<OwnedSemaphorePermit>,
    counters: Arc<TokenCounters>,
    control_id: u64,
}

impl AccessToken {
    /// Returns the identifier of the usage control that issued this token.
    pub fn control_id(&self) -> u64 {
        self.control_id
    }

    fn release(&mut self) {
        if let Some(permit) = self.permit.take() {
            drop(permit);
            self.counters.released();
        }
    }
}

impl Drop for AccessToken {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("control_id", &self.control_id)
            .field("held", &self.permit.is_some())
            .finish()
    }
}

// =============================================================================
// Usage Control
// =============================================================================

/// Token pool for a single job service.
#[derive(Debug)]
pub struct UsageControl {
    id: u64,
    semaphore: Arc<Semaphore>,
    capacity: usize,
    counters: Arc<TokenCounters>,
}

impl UsageControl {
    /// Creates a usage control with the given capacity.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            id: USAGE_CONTROL_COUNTER.fetch_add(1, Ordering::Relaxed),
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            counters: Arc::new(TokenCounters::default()),
        }
    }

    /// Acquires a token, waiting while the pool is exhausted.
    pub async fn acquire_token(&self) -> AccessToken {
        // The semaphore is owned by this control and never closed.
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => unreachable!("usage control semaphore closed"),
        };
        self.issue(permit)
    }

    /// Acquires a token without waiting.
    ///
    /// Returns `None` if the pool is exhausted.
    pub fn try_acquire_token(&self) -> Option<AccessToken> {
        let permit = self.semaphore.clone().try_acquire_owned().ok()?;
        Some(self.issue(permit))
    }

    fn issue(&self, permit: OwnedSemaphorePermit) -> AccessToken {
        self.counters.acquired();
        AccessToken {
            permit: Some(permit),
            counters: Arc::clone(&self.counters),
            control_id: self.id,
        }
    }

    /// Returns a token to the pool.
    pub fn release_token(&self, mut token: AccessToken) {
        if token.control_id != self.id {
            warn!(
                token_control = token.control_id,
                usage_control = self.id,
                "Token released to a foreign usage control, returning it to its issuer"
            );
        }
        token.release();
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of tokens that can be acquired right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Returns the number of tokens currently held.
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::Relaxed)
    }

    /// Returns the highest number of tokens held at once.
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak_in_flight.load(Ordering::Relaxed)
    }

    /// Returns the total number of tokens released so far.
    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Resource Control
// =============================================================================

/// Usage controls of an environment, keyed by job service description.
///
/// Controls are created on first use with the configured capacity.
pub struct ResourceControl {
    capacity: usize,
    controllers: DashMap<ServiceDescription, Arc<UsageControl>>,
}

impl ResourceControl {
    /// Creates a resource control whose usage controls hold `capacity` tokens.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            capacity,
            controllers: DashMap::new(),
        }
    }

    /// Returns the usage control of a job service.
    pub fn controller(&self, description: &ServiceDescription) -> Arc<UsageControl> {
        self.controllers
            .entry(description.clone())
            .or_insert_with(|| Arc::new(UsageControl::new(self.capacity)))
            .clone()
    }

    /// Returns the capacity of each usage control.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of job services seen so far.
    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

impl Default for ResourceControl {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT_SUBMISSIONS)
    }
}

impl fmt::Debug for ResourceControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ResourceControl");
        for entry in self.controllers.iter() {
            debug.field(
                entry.key().as_str(),
                &format_args!("{}/{}", entry.value().in_flight(), entry.value().capacity()),
            );
        }
        debug.finish()
    }
}
