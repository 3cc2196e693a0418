//! Throttle gate: one token bucket shared by every range fetcher.
//!
//! Fetchers run on blocking threads, so the gate is a `Mutex` + `Condvar`
//! rather than an async primitive. Waiters are served strictly in arrival
//! order (ticket queue), so a large chunk at the head cannot be overtaken
//! forever by smaller ones behind it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Longest a waiter sleeps before re-checking its cancel flag.
const POLL_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug)]
struct Bucket {
    /// Bytes per second; `None` = unlimited.
    rate: Option<u64>,
    /// May go negative when a chunk larger than the bucket is granted.
    tokens: f64,
    last_refill: Instant,
    next_ticket: u64,
    queue: VecDeque<u64>,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        if let Some(rate) = self.rate {
            let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
            self.tokens = (self.tokens + elapsed * rate as f64).min(rate as f64);
        }
        self.last_refill = now;
    }

    fn leave(&mut self, ticket: u64) {
        self.queue.retain(|t| *t != ticket);
    }
}

/// Aggregate bandwidth limiter. Capacity equals one second of the rate.
#[derive(Debug)]
pub struct ThrottleGate {
    bucket: Mutex<Bucket>,
    turn: Condvar,
}

impl ThrottleGate {
    /// `None` or `Some(0)` means unlimited.
    pub fn new(limit: Option<u64>) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                rate: limit.filter(|r| *r > 0),
                tokens: 0.0,
                last_refill: Instant::now(),
                next_ticket: 0,
                queue: VecDeque::new(),
            }),
            turn: Condvar::new(),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn limit(&self) -> Option<u64> {
        self.lock().rate
    }

    /// Changes the ceiling; waiting fetchers pick it up on their next wakeup.
    pub fn set_limit(&self, limit: Option<u64>) {
        let mut b = self.lock();
        let now = Instant::now();
        b.refill(now);
        b.rate = limit.filter(|r| *r > 0);
        if let Some(rate) = b.rate {
            b.tokens = b.tokens.min(rate as f64);
        }
        drop(b);
        self.turn.notify_all();
        tracing::debug!(?limit, "throttle limit changed");
    }

    /// Blocks until `n` bytes may be sent, then debits them.
    ///
    /// Returns `false` without debiting if `cancel` is raised while waiting.
    pub fn acquire(&self, n: u64, cancel: &AtomicBool) -> bool {
        let mut b = self.lock();
        if b.rate.is_none() || n == 0 {
            return true;
        }
        let ticket = b.next_ticket;
        b.next_ticket += 1;
        b.queue.push_back(ticket);

        loop {
            if cancel.load(Ordering::Relaxed) {
                b.leave(ticket);
                drop(b);
                self.turn.notify_all();
                return false;
            }
            let now = Instant::now();
            b.refill(now);
            let rate = match b.rate {
                Some(rate) => rate,
                None => {
                    b.leave(ticket);
                    drop(b);
                    self.turn.notify_all();
                    return true;
                }
            };

            let wait = if b.queue.front() == Some(&ticket) {
                let needed = n.min(rate) as f64;
                if b.tokens >= needed {
                    b.tokens -= n as f64;
                    b.queue.pop_front();
                    drop(b);
                    self.turn.notify_all();
                    return true;
                }
                Duration::from_secs_f64((needed - b.tokens) / rate as f64).min(POLL_SLICE)
            } else {
                POLL_SLICE
            };

            b = match self.turn.wait_timeout(b, wait.max(Duration::from_millis(1))) {
                Ok((guard, _)) => guard,
                Err(p) => p.into_inner().0,
            };
        }
    }
}

impl Default for ThrottleGate {
    fn default() -> Self {
        Self::unlimited()
    }
}
