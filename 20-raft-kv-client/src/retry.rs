//! Optional pacing and early exit for the dispatch loop.
//!
//! The default [`RetryPolicy`] rotates to the next server immediately and never
//! gives up. A configured policy can sleep between sweeps of the roster, cap the
//! number of attempts, and the client can be handed a [`CancelToken`] that stops
//! a call that is still retrying.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use rand::Rng;

/// How the dispatch loop paces its retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Sleep after the first fully failed sweep of the roster. Zero disables backoff.
    pub initial_backoff: Duration,
    /// Ceiling for the doubled backoff.
    pub max_backoff: Duration,
    /// Attempts after which the call fails with `RetriesExhausted`. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Rotate immediately and retry until a terminal outcome.
    pub fn unbounded() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            max_attempts: None,
        }
    }

    /// Exponential backoff between sweeps, starting at `initial` and capped at `max`.
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            initial_backoff: initial,
            max_backoff: max.max(initial),
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn attempts_exhausted(&self, attempts: u64) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= u64::from(max))
    }

    /// Delay before the next attempt, given how many attempts failed so far.
    ///
    /// Rotating within a sweep is immediate; only once every server in the
    /// roster has failed does the loop sleep, doubling per completed sweep.
    pub fn delay_after(&self, attempts: u64, roster_len: usize) -> Duration {
        let ceiling = self.ceiling_after(attempts, roster_len);
        if ceiling.is_zero() {
            return ceiling;
        }
        let floor = ceiling / 2;
        rand::thread_rng().gen_range(floor..=ceiling)
    }

    /// The un-jittered delay, i.e. the upper bound of [`delay_after`](Self::delay_after).
    pub fn ceiling_after(&self, attempts: u64, roster_len: usize) -> Duration {
        if self.initial_backoff.is_zero() || attempts == 0 || roster_len == 0 {
            return Duration::ZERO;
        }
        let roster_len = roster_len as u64;
        if attempts % roster_len != 0 {
            return Duration::ZERO;
        }
        let sweeps = attempts / roster_len;
        let shift = (sweeps - 1).min(31) as u32;
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Creates a linked cancellation pair.
///
/// Calling [`Canceller::cancel`], or simply dropping the `Canceller`, fires every
/// clone of the token.
pub fn cancellation() -> (Canceller, CancelToken) {
    let (tx, rx) = crossbeam_channel::bounded(0);
    (Canceller { tx }, CancelToken { rx })
}

/// The firing side of a cancellation pair.
#[derive(Debug)]
pub struct Canceller {
    tx: Sender<()>,
}

impl Canceller {
    pub fn cancel(self) {
        drop(self.tx);
    }
}

/// The observing side of a cancellation pair.
///
/// Backed by a channel that is never written to: cancellation is the sender
/// disconnecting, which wakes any thread blocked in [`sleep`](Self::sleep).
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: Receiver<()>,
}

impl CancelToken {
    /// A token that never fires.
    pub fn never() -> Self {
        Self {
            rx: crossbeam_channel::never(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleeps for `delay` unless cancelled first. Returns `true` if cancelled.
    pub fn sleep(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return self.is_cancelled();
        }
        matches!(
            self.rx.recv_timeout(delay),
            Err(RecvTimeoutError::Disconnected)
        )
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_unbounded_policy_never_sleeps_or_gives_up() {
        let policy = RetryPolicy::default();
        for attempts in 0..20 {
            assert_eq!(policy.delay_after(attempts, 3), Duration::ZERO);
            assert!(!policy.attempts_exhausted(attempts));
        }
    }

    #[test]
    fn test_backoff_only_after_full_sweeps_and_doubles() {
        let policy =
            RetryPolicy::exponential(Duration::from_millis(10), Duration::from_millis(35));
        let ceilings: Vec<u64> = (1..=12)
            .map(|attempts| policy.ceiling_after(attempts, 3).as_millis() as u64)
            .collect();
        assert_eq!(ceilings, vec![0, 0, 10, 0, 0, 20, 0, 0, 35, 0, 0, 35]);
    }

    #[test]
    fn test_jittered_delay_stays_within_half_to_full_ceiling() {
        let policy =
            RetryPolicy::exponential(Duration::from_millis(40), Duration::from_secs(1));
        for _ in 0..100 {
            let delay = policy.delay_after(6, 3);
            assert!(delay >= Duration::from_millis(40) && delay <= Duration::from_millis(80));
        }
    }

    #[test]
    fn test_ceiling_for_counts_past_u32_range() {
        let policy =
            RetryPolicy::exponential(Duration::from_millis(10), Duration::from_millis(500));
        assert_eq!(policy.ceiling_after(u64::from(u32::MAX), 3), Duration::from_millis(500));
        assert_eq!(policy.ceiling_after(u64::from(u32::MAX) + 1, 3), Duration::ZERO);
        assert_eq!(policy.ceiling_after(u64::MAX, 3), Duration::from_millis(500));
        assert!(policy.delay_after(u64::MAX, 3) <= Duration::from_millis(500));
    }

    #[test]
    fn test_max_attempts() {
        let policy = RetryPolicy::unbounded().with_max_attempts(4);
        assert!(!policy.attempts_exhausted(3));
        assert!(policy.attempts_exhausted(4));
        assert!(!RetryPolicy::unbounded().attempts_exhausted(u64::MAX));
    }

    #[test]
    fn test_never_token_does_not_fire() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
        assert!(!token.sleep(Duration::from_millis(5)));
    }

    #[test]
    fn test_cancel_fires_all_clones() {
        let (canceller, token) = cancellation();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        canceller.cancel();
        assert!(token.is_cancelled());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_cancel_wakes_a_sleeping_thread() {
        let (canceller, token) = cancellation();
        let start = Instant::now();
        let sleeper = thread::spawn(move || token.sleep(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(20));
        drop(canceller);
        assert!(sleeper.join().expect("sleeper panicked"));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
