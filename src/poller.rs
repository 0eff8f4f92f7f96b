//! Transition Poller
//!
//! After an action request (start, stop) the server moves a service through
//! transitional statuses before it settles. The poller queries the status
//! until the requested target is observed, and fails as soon as the server
//! reports something outside the expected sets.
//!
//! # Phase Flow
//!
//! ```text
//! Requested ──(start set: stay)──┐
//!     │  ↑_______________________┘
//!     │ (transition set)
//!     ↓
//! InFlight ──(transition set: stay)
//!     │
//!     ├──(target)──────→ Succeeded
//!     └──(anything else)→ Failed
//!
//! (Requested can also reach Succeeded or Failed directly)
//! ```
//!
//! While `Requested`, the service may still report its old settled status
//! (the start set). Once a transitional status has been seen, a settled
//! status other than the target is an invalid transition.
//!
//! `max_wait` bounds both the time slept between polls and the wall-clock
//! time since the request started, so slow queries or a zero interval cannot
//! keep the poller alive. A [`CancelToken`] is checked before every poll.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::transport::{Sleeper, TransportError};
use crate::types::Status;

/// Source of the remote status being polled
pub trait StatusSource {
    /// Returns the reported status, or `None` when the server reports none
    fn fetch_status(&self) -> Result<Option<String>, TransportError>;
}

/// Phase of one transition request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollPhase {
    /// Action issued, server may still report the old status
    Requested,
    /// A transitional status has been observed
    InFlight,
    /// Target status observed (terminal)
    Succeeded,
    /// Unexpected status, timeout, cancellation or transport failure (terminal)
    Failed,
}

impl PollPhase {
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns true if moving to `next` is a legal step
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Requested, Self::Requested)
                | (Self::Requested, Self::InFlight)
                | (Self::InFlight, Self::InFlight)
                | (Self::Requested | Self::InFlight, Self::Succeeded | Self::Failed)
        )
    }
}

impl fmt::Display for PollPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Requested => "requested",
            Self::InFlight => "in flight",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Errors that end a transition request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid status: {observed}, want: {expected}")]
    InvalidTransition { observed: String, expected: Status },

    #[error("Timed out after {waited:?} waiting for status {expected}")]
    TimedOut { expected: Status, waited: Duration },

    #[error("Cancelled while waiting for status {expected}")]
    Cancelled { expected: Status },

    /// Every status query of one poll failed
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Timing and acceptance rules for polling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between polls
    pub interval: Duration,
    /// Status queries per poll before the last transport error is returned
    pub attempts_per_poll: u32,
    /// Upper bound on sleep time and on elapsed time, `None` waits forever
    pub max_wait: Option<Duration>,
    /// Statuses tolerated while still `Requested`
    pub start_set: BTreeSet<Status>,
    /// Statuses that mean the request is being processed
    pub transition_set: BTreeSet<Status>,
    /// Treat a missing status as transitional
    pub allow_unreported: bool,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            attempts_per_poll: 5,
            max_wait: Some(Duration::from_secs(300)),
            start_set: [Status::Started, Status::Stopped].into_iter().collect(),
            transition_set: [
                Status::Starting,
                Status::Stopping,
                Status::Configuring,
                Status::Configured,
            ]
            .into_iter()
            .collect(),
            allow_unreported: true,
        }
    }
}

/// Shared flag to abandon a poll from elsewhere
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary of a successful transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Number of polls made, including the final one
    pub polls: u32,
    /// Total time slept between polls
    pub waited: Duration,
    /// Whether a transitional status was observed before the target
    pub saw_transition: bool,
}

/// Drives one transition request to completion
pub struct TransitionPoller<'a, S: StatusSource + ?Sized> {
    source: &'a S,
    sleeper: &'a dyn Sleeper,
    policy: PollPolicy,
    cancel: CancelToken,
    phase: PollPhase,
}

impl<'a, S: StatusSource + ?Sized> TransitionPoller<'a, S> {
    pub fn new(source: &'a S, sleeper: &'a dyn Sleeper, policy: PollPolicy) -> Self {
        Self {
            source,
            sleeper,
            policy,
            cancel: CancelToken::default(),
            phase: PollPhase::Requested,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Poll until `target` is reported
    pub fn complete(mut self, target: Status) -> Result<PollOutcome, TransitionError> {
        let started = Instant::now();
        let mut polls = 0;
        let mut waited = Duration::ZERO;
        let mut saw_transition = false;

        loop {
            if self.cancel.is_cancelled() {
                self.advance(PollPhase::Failed);
                return Err(TransitionError::Cancelled { expected: target });
            }

            polls += 1;
            let observed = match self.query() {
                Ok(observed) => observed,
                Err(e) => {
                    self.advance(PollPhase::Failed);
                    return Err(e.into());
                }
            };
            let status = observed.as_deref().and_then(|s| s.parse::<Status>().ok());

            if status == Some(target) {
                self.advance(PollPhase::Succeeded);
                return Ok(PollOutcome {
                    polls,
                    waited,
                    saw_transition,
                });
            }

            let next = match (self.phase, status) {
                (PollPhase::Requested, Some(s)) if self.policy.start_set.contains(&s) => {
                    PollPhase::Requested
                }
                (_, Some(s)) if self.policy.transition_set.contains(&s) => PollPhase::InFlight,
                (_, None) if observed.is_none() && self.policy.allow_unreported => {
                    PollPhase::InFlight
                }
                _ => {
                    self.advance(PollPhase::Failed);
                    return Err(TransitionError::InvalidTransition {
                        observed: observed.unwrap_or_else(|| "<none>".to_string()),
                        expected: target,
                    });
                }
            };
            saw_transition |= next == PollPhase::InFlight;
            self.advance(next);

            let interval = self.policy.interval;
            let elapsed = started.elapsed();
            if self
                .policy
                .max_wait
                .is_some_and(|max| waited + interval > max || elapsed >= max)
            {
                self.advance(PollPhase::Failed);
                return Err(TransitionError::TimedOut {
                    expected: target,
                    waited: waited.max(elapsed),
                });
            }
            self.sleeper.sleep(self.policy.interval);
            waited += self.policy.interval;
        }
    }

    fn query(&self) -> Result<Option<String>, TransportError> {
        let attempts = self.policy.attempts_per_poll.max(1);
        let mut last = None;
        for attempt in 1..=attempts {
            match self.source.fetch_status() {
                Ok(status) => return Ok(status),
                Err(e) => {
                    warn!("Status query failed (attempt {}/{}): {}", attempt, attempts, e);
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| TransportError::Client("no status query made".into())))
    }

    fn advance(&mut self, next: PollPhase) {
        debug_assert!(self.phase.can_advance_to(next), "{} -> {}", self.phase, next);
        if self.phase != next {
            debug!("Transition {} -> {}", self.phase, next);
        }
        self.phase = next;
    }
}
