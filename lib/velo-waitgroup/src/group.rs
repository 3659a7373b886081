// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Scalar wait group.

use parking_lot::Mutex as ParkingMutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::diagnostics::{StackCapture, default_capture};
use crate::error::WaitResult;
use crate::join::{Join, wait_or_cancel, wait_or_expire};
use crate::signal::{CompletionSignal, SignalAwaiter};

const GROUP: &str = "wait group";

/// Counts outstanding work and signals once all of it is done, with
/// cancellable and composable waits on top.
///
/// A `WaitGroup` is single use: once it has signalled completion it must not
/// be given new work. Cloning yields another handle to the same group.
///
/// # Panics
///
/// [`add`](Self::add) and [`done`](Self::done) panic if the counter would go
/// negative (more `done` than `add`), overflow, or if work is added after the
/// group completed. These are caller bugs and are never clamped.
#[derive(Clone)]
pub struct WaitGroup {
    inner: Arc<WaitGroupInner>,
}

struct WaitGroupInner {
    count: AtomicI64,
    // Serializes updates to `count` with the decision to close `signal`.
    lock: ParkingMutex<()>,
    signal: CompletionSignal,
    capture: Arc<dyn StackCapture>,
}

impl WaitGroup {
    /// Create an empty group using the default diagnostic capture.
    pub fn new() -> Self {
        Self::with_stack_capture(default_capture())
    }

    /// Create an empty group whose bounded-wait errors are annotated by
    /// `capture`.
    pub fn with_stack_capture(capture: Arc<dyn StackCapture>) -> Self {
        Self {
            inner: Arc::new(WaitGroupInner {
                count: AtomicI64::new(0),
                lock: ParkingMutex::new(()),
                signal: CompletionSignal::new(),
                capture,
            }),
        }
    }

    /// Add `delta` to the counter. A negative `delta` reports that much work
    /// done at once; `add(0)` does nothing.
    pub fn add(&self, delta: i64) {
        if delta == 0 {
            return;
        }

        let _guard = self.inner.lock.lock();
        let current = self.inner.count.load(Ordering::Acquire);
        let Some(next) = current.checked_add(delta) else {
            panic!("wait group counter overflowed ({current} {delta:+})");
        };
        if next < 0 {
            panic!("wait group counter has gone negative ({current} {delta:+})");
        }
        if delta > 0 && self.inner.signal.is_closed() {
            panic!("wait group reused after completion");
        }

        self.inner.count.store(next, Ordering::Release);
        if next == 0 && self.inner.signal.close() {
            trace!(group = GROUP, "all work done");
        }
    }

    /// Report one unit of work done.
    pub fn done(&self) {
        self.add(-1);
    }

    /// Current number of outstanding units.
    pub fn count(&self) -> i64 {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Whether no work is outstanding.
    pub fn is_done(&self) -> bool {
        self.count() == 0
    }

    /// Block the current thread until the counter reaches zero.
    ///
    /// Returns immediately if nothing is outstanding. Never times out; see
    /// [`wait_context`](Self::wait_context) for a bounded wait.
    pub fn wait(&self) {
        if self.is_done() {
            return;
        }
        self.inner.signal.wait();
    }

    /// Future resolving once the counter reaches zero.
    pub fn wait_async(&self) -> SignalAwaiter {
        if self.is_done() {
            return SignalAwaiter::immediate();
        }
        self.inner.signal.awaiter()
    }

    /// Wait until the counter reaches zero or `token` is cancelled, whichever
    /// comes first.
    ///
    /// Cancellation only abandons this wait; the counter and other waiters
    /// are untouched. The returned [`WaitError`](crate::WaitError) carries a
    /// diagnostic dump of what was still running.
    pub async fn wait_context(&self, token: &CancellationToken) -> WaitResult {
        if self.is_done() {
            return Ok(());
        }
        let signal = self.inner.signal.clone();
        let result = wait_or_cancel(GROUP, signal, token, &*self.inner.capture).await;
        if let Err(err) = &result {
            debug!(group = GROUP, count = self.count(), "{err}");
        }
        result
    }

    /// Wait until the counter reaches zero or `timeout` elapses.
    pub async fn wait_timeout(&self, timeout: Duration) -> WaitResult {
        if self.is_done() {
            return Ok(());
        }
        let signal = self.inner.signal.clone();
        let result = wait_or_expire(GROUP, signal, timeout, &*self.inner.capture).await;
        if let Err(err) = &result {
            debug!(group = GROUP, count = self.count(), "{err}");
        }
        result
    }

    /// The raw completion signal.
    ///
    /// If nothing is outstanding the signal is closed before it is returned,
    /// so calling this before any [`add`](Self::add) yields a fired signal and
    /// ends the group's life: a later positive `add` panics. The other wait
    /// methods return early on an idle group and leave it open.
    pub fn wait_signal(&self) -> CompletionSignal {
        let signal = &self.inner.signal;
        if !signal.is_closed() && self.is_done() {
            let _guard = self.inner.lock.lock();
            if self.is_done() {
                signal.close();
            }
        }
        signal.clone()
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WaitGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitGroup")
            .field("count", &self.count())
            .field("signal", &self.inner.signal)
            .finish_non_exhaustive()
    }
}

impl Join for WaitGroup {
    fn is_done(&self) -> bool {
        WaitGroup::is_done(self)
    }

    fn wait(&self) {
        WaitGroup::wait(self)
    }

    async fn wait_context(&self, token: &CancellationToken) -> WaitResult {
        WaitGroup::wait_context(self, token).await
    }

    fn wait_signal(&self) -> CompletionSignal {
        WaitGroup::wait_signal(self)
    }
}
