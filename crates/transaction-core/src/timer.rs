//! Transaction timers.
//!
//! RFC 3261 appendix A timer values, plus a restartable single-shot timer
//! the state machines select over alongside their inbound channel. Each
//! machine owns its timers; nothing fires once the owning task is gone.

use std::future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep, Sleep};

/// Timer durations used by the four state machines.
///
/// The defaults are the RFC 3261 values. Tests and embedders can shrink
/// them; each transaction captures its own copy at construction.
#[derive(Debug, Clone)]
pub struct TimerSettings {
    /// RTT estimate; initial retransmit interval (timers A, E, G).
    pub t1: Duration,
    /// Retransmit interval cap for non-INVITE requests and INVITE responses.
    pub t2: Duration,
    /// Maximum lifetime of a datagram in the network (timers I and K).
    pub t4: Duration,
    /// 64*T1: overall timeout (timers B, F and H) and timer J.
    pub transaction_timeout: Duration,
    /// Wait for response retransmissions in a completed INVITE client (timer D).
    pub wait_time_d: Duration,
    /// How long an INVITE server waits for the TU before emitting 100 Trying.
    pub provisional_delay: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        let t1 = Duration::from_millis(500);
        TimerSettings {
            t1,
            t2: Duration::from_millis(4000),
            t4: Duration::from_millis(5000),
            transaction_timeout: 64 * t1,
            wait_time_d: Duration::from_millis(32_000),
            provisional_delay: Duration::from_millis(200),
        }
    }
}

/// A restartable single-shot timer.
///
/// Inert until `start`; `start` on an armed timer replaces the previous
/// arming, including a fire that has not been observed yet. The last
/// duration passed to `start` is recorded for the exponential-backoff
/// timers (A and G double their previous interval).
#[derive(Debug)]
pub struct TransactionTimer {
    name: &'static str,
    sleep: Option<Pin<Box<Sleep>>>,
    last_duration: Duration,
}

impl TransactionTimer {
    pub fn new(name: &'static str) -> Self {
        TransactionTimer {
            name,
            sleep: None,
            last_duration: Duration::ZERO,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Arms the timer, discarding any previous arming.
    pub fn start(&mut self, duration: Duration) {
        self.last_duration = duration;
        self.sleep = Some(Box::pin(sleep(duration)));
    }

    /// Disarms; a no-op on a timer that was never started.
    pub fn stop(&mut self) {
        self.sleep = None;
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    pub fn last_duration(&self) -> Duration {
        self.last_duration
    }

    /// Resolves when the armed interval elapses; pends forever while
    /// disarmed. Cancel-safe: dropping the future leaves the arming intact,
    /// so this can sit in a `select!` arm.
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.sleep = None;
            }
            None => future::pending().await,
        }
    }
}
