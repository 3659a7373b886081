// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! One-shot broadcast signal shared by every wait group flavor.
//!
//! Closure state, async wakers and the blocking condvar all live under a
//! single `parking_lot::Mutex`, so a waiter can never observe "open", register,
//! and then miss the close.

use parking_lot::{Condvar, Mutex as ParkingMutex};
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

/// Handle to a one-shot completion signal.
///
/// Any number of observers may wait on it concurrently, before or after it
/// fires; all of them are released exactly once. Cloning yields another handle
/// to the same signal.
///
/// The signal can be awaited directly, polled through [`awaiter`](Self::awaiter)
/// inside `tokio::select!`, or waited on from a plain thread with
/// [`wait`](Self::wait).
#[derive(Clone)]
pub struct CompletionSignal {
    state: Arc<SignalState>,
}

struct SignalState {
    inner: ParkingMutex<SignalInner>,
    closed: AtomicBool,
    condvar: Condvar,
}

struct SignalInner {
    closed: bool,
    next_waker_id: u64,
    wakers: Vec<(u64, Waker)>,
}

impl CompletionSignal {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(SignalState {
                inner: ParkingMutex::new(SignalInner {
                    closed: false,
                    next_waker_id: 0,
                    wakers: Vec::with_capacity(2),
                }),
                closed: AtomicBool::new(false),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Returns `true` once the signal has fired.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// Fires the signal. Returns `false` if it had already fired.
    pub(crate) fn close(&self) -> bool {
        let wakers = {
            let mut inner = self.state.inner.lock();
            if inner.closed {
                return false;
            }
            inner.closed = true;
            self.state.closed.store(true, Ordering::Release);
            self.state.condvar.notify_all();
            std::mem::take(&mut inner.wakers)
        };

        for (_, waker) in wakers {
            waker.wake();
        }
        true
    }

    /// Blocks the current thread until the signal fires.
    ///
    /// Do not call this from inside an async runtime worker; use
    /// [`awaiter`](Self::awaiter) there instead.
    pub fn wait(&self) {
        if self.is_closed() {
            return;
        }
        let mut inner = self.state.inner.lock();
        while !inner.closed {
            self.state.condvar.wait(&mut inner);
        }
    }

    /// Blocks the current thread until the signal fires or `timeout` elapses.
    ///
    /// Returns whether the signal fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_closed() {
            return true;
        }
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };
        let mut inner = self.state.inner.lock();
        while !inner.closed {
            if self
                .state
                .condvar
                .wait_until(&mut inner, deadline)
                .timed_out()
            {
                return inner.closed;
            }
        }
        true
    }

    /// Creates a future that resolves once the signal fires.
    pub fn awaiter(&self) -> SignalAwaiter {
        SignalAwaiter {
            state: Arc::clone(&self.state),
            registration: None,
        }
    }
}

impl SignalAwaiter {
    /// Awaiter that is ready on first poll, detached from any group signal.
    pub(crate) fn immediate() -> Self {
        let signal = CompletionSignal::new();
        signal.close();
        signal.awaiter()
    }
}

impl fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl IntoFuture for CompletionSignal {
    type Output = ();
    type IntoFuture = SignalAwaiter;

    fn into_future(self) -> Self::IntoFuture {
        self.awaiter()
    }
}

/// Future that waits for a [`CompletionSignal`] to fire.
///
/// Safe to poll repeatedly from a `select!` loop: each awaiter keeps a single
/// waker registration, refreshed in place, and removes it when dropped.
pub struct SignalAwaiter {
    state: Arc<SignalState>,
    registration: Option<u64>,
}

impl Future for SignalAwaiter {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();

        if this.state.closed.load(Ordering::Acquire) {
            return Poll::Ready(());
        }

        let mut inner = this.state.inner.lock();
        if inner.closed {
            return Poll::Ready(());
        }

        let waker = cx.waker();
        let position = this
            .registration
            .and_then(|id| inner.wakers.iter().position(|(slot, _)| *slot == id));
        match position {
            Some(index) => {
                let registered = &mut inner.wakers[index].1;
                if !registered.will_wake(waker) {
                    registered.clone_from(waker);
                }
            }
            None => {
                let id = inner.next_waker_id;
                inner.next_waker_id += 1;
                inner.wakers.push((id, waker.clone()));
                this.registration = Some(id);
            }
        }

        Poll::Pending
    }
}

impl Drop for SignalAwaiter {
    fn drop(&mut self) {
        if let Some(id) = self.registration.take() {
            let mut inner = self.state.inner.lock();
            inner.wakers.retain(|(slot, _)| *slot != id);
        }
    }
}

impl fmt::Debug for SignalAwaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalAwaiter")
            .field("closed", &self.state.closed.load(Ordering::Acquire))
            .field("registered", &self.registration.is_some())
            .finish()
    }
}
