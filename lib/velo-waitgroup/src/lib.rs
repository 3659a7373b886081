// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

// Public trait API
mod join;

// Wait groups
mod group;
mod tagged;

// Public types
pub mod config;
pub mod diagnostics;
mod error;

// Internal synchronization
mod signal;

// ── Re-exports ───────────────────────────────────────────────────────

pub use config::{CaptureConfig, ConfigError};
pub use diagnostics::{StackCapture, ThreadDump};
pub use error::{StackError, WaitCause, WaitError, WaitResult};
pub use group::WaitGroup;
pub use join::Join;
pub use signal::{CompletionSignal, SignalAwaiter};
pub use tagged::{DoneFn, TaggedWaitGroup};

pub use tokio_util::sync::CancellationToken;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::task::yield_now;

    fn stub_capture() -> Arc<dyn StackCapture> {
        Arc::new(|| "stub dump".to_string())
    }

    // ── Trait-based tests ─────────────────────────────────────────────

    async fn exercise_join(group: &impl Join) -> Result<()> {
        let token = CancellationToken::new();
        assert!(group.is_done());
        assert!(group.wait_signal().is_closed());
        group.wait();
        group.wait_context(&token).await?;
        Ok(())
    }

    #[tokio::test]
    async fn trait_fresh_groups_complete_immediately() -> Result<()> {
        exercise_join(&WaitGroup::with_stack_capture(stub_capture())).await?;
        exercise_join(&TaggedWaitGroup::with_stack_capture(stub_capture())).await?;
        Ok(())
    }

    async fn expect_cancelled(group: &impl Join) {
        let token = CancellationToken::new();
        token.cancel();
        let err = group.wait_context(&token).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!err.stack_trace().is_empty());
        assert!(!group.is_done());
        assert!(!group.wait_signal().is_closed());
    }

    #[tokio::test]
    async fn trait_cancelled_wait_leaves_group_pending() {
        let wg = WaitGroup::with_stack_capture(stub_capture());
        wg.add(1);
        expect_cancelled(&wg).await;

        let tagged = TaggedWaitGroup::with_stack_capture(stub_capture());
        let _done = tagged.add("job", 1);
        expect_cancelled(&tagged).await;
    }

    // ── Bounded waits ─────────────────────────────────────────────────

    #[tokio::test]
    async fn wait_context_returns_when_work_completes() -> Result<()> {
        let wg = WaitGroup::new();
        let token = CancellationToken::new();
        wg.add(3);
        for i in 0..3u64 {
            let wg = wg.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5 * i)).await;
                wg.done();
            });
        }
        wg.wait_context(&token).await?;
        assert_eq!(wg.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn cancel_fires_while_waiting() {
        let wg = TaggedWaitGroup::with_stack_capture(stub_capture());
        let _done = wg.add("slow-job", 1);
        let token = CancellationToken::new();

        let waiter = {
            let wg = wg.clone();
            let token = token.clone();
            tokio::spawn(async move { wg.wait_context(&token).await })
        };

        yield_now().await;
        token.cancel();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.stack_trace(), "stub dump");
    }

    #[tokio::test]
    async fn cancellation_is_per_call() -> Result<()> {
        let wg = WaitGroup::with_stack_capture(stub_capture());
        wg.add(1);

        let patient = {
            let wg = wg.clone();
            tokio::spawn(async move { wg.wait_context(&CancellationToken::new()).await })
        };

        let impatient = CancellationToken::new();
        impatient.cancel();
        assert!(wg.wait_context(&impatient).await.is_err());

        yield_now().await;
        assert!(!patient.is_finished());
        wg.done();
        patient.await??;
        Ok(())
    }

    #[tokio::test]
    async fn default_capture_produces_a_dump() {
        let wg = WaitGroup::new();
        wg.add(1);
        let err = wg
            .wait_timeout(Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(err.is_deadline_exceeded());
        assert!(err.stack_trace().contains("=== caller thread"));
    }

    // ── Raw signal ────────────────────────────────────────────────────

    #[tokio::test]
    async fn wait_signal_is_shared_between_calls() {
        let wg = WaitGroup::new();
        wg.add(1);
        let first = wg.wait_signal();
        let second = wg.wait_signal();
        assert!(!first.is_closed());

        wg.done();
        assert!(first.is_closed());
        assert!(second.is_closed());
        first.await;
        second.await;
    }

    #[tokio::test]
    async fn select_over_several_groups() {
        let fast = WaitGroup::new();
        let slow = TaggedWaitGroup::new();
        fast.add(1);
        let _slow_done = slow.add("slow", 1);

        tokio::spawn({
            let fast = fast.clone();
            async move { fast.done() }
        });

        let winner = tokio::select! {
            _ = fast.wait_signal().awaiter() => "fast",
            _ = slow.wait_signal().awaiter() => "slow",
        };
        assert_eq!(winner, "fast");
    }
}
