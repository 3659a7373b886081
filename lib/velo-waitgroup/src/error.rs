// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Errors returned by bounded waits.

use std::sync::Arc;

use crate::diagnostics::StackCapture;

/// An error that also carries a text dump of what was running when it was
/// raised.
pub trait StackError: std::error::Error + Send + Sync + 'static {
    /// Diagnostic dump captured at the moment the error was created.
    fn stack_trace(&self) -> &str;
}

/// Why a bounded wait gave up before the group completed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WaitCause {
    /// The caller's cancellation token fired.
    #[error("wait cancelled")]
    Cancelled,
    /// The caller's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Returned by `wait_context` / `wait_timeout` when the wait is abandoned
/// before all outstanding work is reported done.
///
/// Cancelling the wait does not touch the group: counters are left as they
/// were and other waiters are unaffected.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{group} not done: {cause}")]
pub struct WaitError {
    group: &'static str,
    #[source]
    cause: WaitCause,
    stack: Arc<str>,
}

impl WaitError {
    /// Builds the error, running `capture` to snapshot live execution state.
    pub(crate) fn capture(
        group: &'static str,
        cause: WaitCause,
        capture: &dyn StackCapture,
    ) -> Self {
        Self {
            group,
            cause,
            stack: Arc::from(capture.capture()),
        }
    }

    /// The reason the wait was abandoned.
    pub fn cause(&self) -> WaitCause {
        self.cause
    }

    /// Whether the cancellation token fired.
    pub fn is_cancelled(&self) -> bool {
        self.cause == WaitCause::Cancelled
    }

    /// Whether the deadline passed.
    pub fn is_deadline_exceeded(&self) -> bool {
        self.cause == WaitCause::DeadlineExceeded
    }
}

impl StackError for WaitError {
    fn stack_trace(&self) -> &str {
        &self.stack
    }
}

/// Result of a bounded wait.
pub type WaitResult = Result<(), WaitError>;
