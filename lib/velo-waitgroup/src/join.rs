// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The [`Join`] trait shared by every wait group flavor.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::diagnostics::StackCapture;
use crate::error::{WaitCause, WaitError, WaitResult};
use crate::signal::CompletionSignal;

/// Observation side of a single-use completion counter.
///
/// Registering and reporting work is flavor specific (a plain count for
/// [`WaitGroup`](crate::WaitGroup), labelled counts for
/// [`TaggedWaitGroup`](crate::TaggedWaitGroup)); waiting is not, so
/// coordinators can be generic over `impl Join`.
pub trait Join: Send + Sync {
    /// Whether all registered work has been reported done.
    fn is_done(&self) -> bool;

    /// Block the current thread until all registered work is done.
    fn wait(&self);

    /// Wait until all registered work is done or `token` is cancelled,
    /// whichever comes first.
    fn wait_context(&self, token: &CancellationToken) -> impl Future<Output = WaitResult> + Send;

    /// The raw completion signal, for composing into a caller-managed
    /// `select!`. Already closed if no work is outstanding.
    fn wait_signal(&self) -> CompletionSignal;
}

/// Races `signal` against `token`. Cancellation wins ties.
pub(crate) async fn wait_or_cancel(
    group: &'static str,
    signal: CompletionSignal,
    token: &CancellationToken,
    capture: &dyn StackCapture,
) -> WaitResult {
    if signal.is_closed() {
        return Ok(());
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(WaitError::capture(group, WaitCause::Cancelled, capture)),
        _ = signal.awaiter() => {
            trace!(group, "waiter released");
            Ok(())
        }
    }
}

/// Waits on `signal` for at most `timeout`.
pub(crate) async fn wait_or_expire(
    group: &'static str,
    signal: CompletionSignal,
    timeout: Duration,
    capture: &dyn StackCapture,
) -> WaitResult {
    if signal.is_closed() {
        return Ok(());
    }
    match tokio::time::timeout(timeout, signal.awaiter()).await {
        Ok(()) => Ok(()),
        Err(_) => Err(WaitError::capture(
            group,
            WaitCause::DeadlineExceeded,
            capture,
        )),
    }
}
