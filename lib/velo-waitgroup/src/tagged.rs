// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Wait group with per-label counters.

use parking_lot::Mutex as ParkingMutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::diagnostics::{StackCapture, default_capture};
use crate::error::WaitResult;
use crate::join::{Join, wait_or_cancel, wait_or_expire};
use crate::signal::{CompletionSignal, SignalAwaiter};

const GROUP: &str = "tagged wait group";

/// A wait group whose outstanding work is counted per label, so a stuck wait
/// can be explained by looking at [`counters`](Self::counters).
///
/// Completion is reported through the [`DoneFn`] returned by
/// [`add`](Self::add) rather than a group-level `done`. Any string is a valid
/// label, including the empty string. Like [`WaitGroup`](crate::WaitGroup)
/// the group is single use and cloning yields another handle to it.
///
/// # Panics
///
/// Adding or completing work panics if a label's counter would go negative or
/// overflow, or if work is added after the group completed.
#[derive(Clone)]
pub struct TaggedWaitGroup {
    inner: Arc<TaggedInner>,
}

struct TaggedInner {
    // A label is present iff its count is positive; empty iff `signal` may close.
    counters: ParkingMutex<HashMap<String, i64>>,
    signal: CompletionSignal,
    capture: Arc<dyn StackCapture>,
}

impl TaggedInner {
    fn add(&self, label: &str, delta: i64) {
        let mut counters = self.counters.lock();
        if delta == 0 {
            if counters.is_empty() && self.signal.close() {
                trace!(group = GROUP, "nothing outstanding");
            }
            return;
        }

        let current = counters.get(label).copied().unwrap_or(0);
        let Some(next) = current.checked_add(delta) else {
            panic!("wait group counter overflowed for tag {label:?} ({current} {delta:+})");
        };
        if next < 0 {
            panic!("wait group counter has gone negative for tag {label:?} ({current} {delta:+})");
        }
        if delta > 0 && self.signal.is_closed() {
            panic!("wait group reused after completion (tag {label:?})");
        }

        if next > 0 {
            match counters.get_mut(label) {
                Some(count) => *count = next,
                None => {
                    counters.insert(label.to_owned(), next);
                }
            }
            return;
        }

        counters.remove(label);
        if counters.is_empty() && self.signal.close() {
            trace!(group = GROUP, last = label, "all work done");
        }
    }
}

impl TaggedWaitGroup {
    /// Create an empty group using the default diagnostic capture.
    pub fn new() -> Self {
        Self::with_stack_capture(default_capture())
    }

    /// Create an empty group whose bounded-wait errors are annotated by
    /// `capture`.
    pub fn with_stack_capture(capture: Arc<dyn StackCapture>) -> Self {
        Self {
            inner: Arc::new(TaggedInner {
                counters: ParkingMutex::new(HashMap::new()),
                signal: CompletionSignal::new(),
                capture,
            }),
        }
    }

    /// Add `delta` to the counter for `label` and return a [`DoneFn`] that
    /// reports one unit of that label done each time it is called.
    ///
    /// A zero `delta` changes no counter but, like the first zero-reaching
    /// update, closes the signal if nothing is outstanding.
    pub fn add(&self, label: &str, delta: i64) -> DoneFn {
        self.inner.add(label, delta);
        DoneFn {
            group: Arc::clone(&self.inner),
            label: Arc::from(label),
        }
    }

    /// Snapshot of the outstanding counters by label.
    ///
    /// Labels whose work is all done are absent. The map is an independent
    /// copy.
    pub fn counters(&self) -> HashMap<String, i64> {
        self.inner.counters.lock().clone()
    }

    /// Whether no work is outstanding under any label.
    pub fn is_done(&self) -> bool {
        self.inner.counters.lock().is_empty()
    }

    /// Block the current thread until every label's counter is zero.
    pub fn wait(&self) {
        if self.is_done() {
            return;
        }
        self.inner.signal.wait();
    }

    /// Future resolving once every label's counter is zero.
    pub fn wait_async(&self) -> SignalAwaiter {
        if self.is_done() {
            return SignalAwaiter::immediate();
        }
        self.inner.signal.awaiter()
    }

    /// Wait until every label's counter is zero or `token` is cancelled,
    /// whichever comes first.
    pub async fn wait_context(&self, token: &CancellationToken) -> WaitResult {
        if self.is_done() {
            return Ok(());
        }
        let signal = self.inner.signal.clone();
        let result = wait_or_cancel(GROUP, signal, token, &*self.inner.capture).await;
        if let Err(err) = &result {
            debug!(pending = ?self.counters(), "{err}");
        }
        result
    }

    /// Wait until every label's counter is zero or `timeout` elapses.
    pub async fn wait_timeout(&self, timeout: Duration) -> WaitResult {
        if self.is_done() {
            return Ok(());
        }
        let signal = self.inner.signal.clone();
        let result = wait_or_expire(GROUP, signal, timeout, &*self.inner.capture).await;
        if let Err(err) = &result {
            debug!(pending = ?self.counters(), "{err}");
        }
        result
    }

    /// The raw completion signal, closed first if nothing is outstanding.
    ///
    /// Closing ends the group's life, so on an idle group a later positive
    /// [`add`](Self::add) panics. The other wait methods leave it open.
    pub fn wait_signal(&self) -> CompletionSignal {
        let signal = &self.inner.signal;
        if !signal.is_closed() {
            let counters = self.inner.counters.lock();
            if counters.is_empty() {
                signal.close();
            }
        }
        signal.clone()
    }
}

impl Default for TaggedWaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaggedWaitGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedWaitGroup")
            .field("counters", &self.counters())
            .field("signal", &self.inner.signal)
            .finish_non_exhaustive()
    }
}

impl Join for TaggedWaitGroup {
    fn is_done(&self) -> bool {
        TaggedWaitGroup::is_done(self)
    }

    fn wait(&self) {
        TaggedWaitGroup::wait(self)
    }

    async fn wait_context(&self, token: &CancellationToken) -> WaitResult {
        TaggedWaitGroup::wait_context(self, token).await
    }

    fn wait_signal(&self) -> CompletionSignal {
        TaggedWaitGroup::wait_signal(self)
    }
}

/// Reports one unit of work done for the label it was created with.
///
/// Returned by [`TaggedWaitGroup::add`]. Calling [`done`](Self::done) more
/// times than the label was added panics.
#[derive(Clone)]
pub struct DoneFn {
    group: Arc<TaggedInner>,
    label: Arc<str>,
}

impl DoneFn {
    /// Decrease the label's counter by one.
    pub fn done(&self) {
        self.group.add(&self.label, -1);
    }

    /// The label this handle completes.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for DoneFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoneFn").field("label", &self.label).finish()
    }
}
