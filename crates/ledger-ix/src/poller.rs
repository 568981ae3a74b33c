//! Bounded re-reads until observed state converges.
//!
//! Reads after a confirmed write can be served by nodes that have not caught
//! up yet. A [`ConvergencePredicate`] re-reads a few times with a fixed delay
//! and either returns the first state that satisfies it, or gives up with
//! [`IxError::ConvergenceTimeout`].

use std::fmt::Debug;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::IxError;

/// Retry budget for a [`ConvergencePredicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl PollPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(20, Duration::from_millis(500))
    }
}

type ReadFn<'a, T> = Box<dyn FnMut() -> Result<Option<T>, IxError> + 'a>;
type TestFn<'a, T> = Box<dyn Fn(&T) -> bool + 'a>;

/// A labelled read plus the condition it must eventually satisfy.
///
/// The read returns `Ok(None)` when the thing being watched does not exist
/// yet; that counts as "not reached". Read errors end polling immediately.
pub struct ConvergencePredicate<'a, T> {
    label: String,
    read: ReadFn<'a, T>,
    reached: TestFn<'a, T>,
    policy: PollPolicy,
}

impl<'a, T: Debug> ConvergencePredicate<'a, T> {
    pub fn new<R, P>(label: impl Into<String>, read: R, reached: P) -> Self
    where
        R: FnMut() -> Result<Option<T>, IxError> + 'a,
        P: Fn(&T) -> bool + 'a,
    {
        Self {
            label: label.into(),
            read: Box::new(read),
            reached: Box::new(reached),
            policy: PollPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Evaluate the success test against one observation.
    pub fn is_reached(&self, state: &T) -> bool {
        (self.reached)(state)
    }

    /// Read once without retrying.
    pub fn read_once(&mut self) -> Result<Option<T>, IxError> {
        (self.read)()
    }

    /// Re-read until the test passes or the budget runs out.
    ///
    /// Sleeps between attempts, never after the last one.
    pub fn poll(mut self) -> Result<T, IxError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last: Option<T> = None;

        for attempt in 1..=attempts {
            match (self.read)()? {
                Some(state) if (self.reached)(&state) => {
                    debug!(label = %self.label, attempt, "converged");
                    return Ok(state);
                }
                observed => {
                    debug!(label = %self.label, attempt, ?observed, "not converged yet");
                    last = observed;
                }
            }

            if attempt < attempts && !self.policy.delay.is_zero() {
                thread::sleep(self.policy.delay);
            }
        }

        let last_observed = last.map(|s| format!("{s:?}"));
        warn!(
            label = %self.label,
            attempts,
            last_observed = last_observed.as_deref().unwrap_or("<absent>"),
            "gave up waiting for convergence"
        );
        Err(IxError::ConvergenceTimeout {
            label: self.label,
            attempts,
            last_observed,
        })
    }
}
