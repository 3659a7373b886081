// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Best-effort snapshots of live execution state, attached to [`WaitError`]s.
//!
//! Capture only runs on the failure path of a bounded wait. Everything read
//! here races with the rest of the process, so the dump is a hint for an
//! operator, not a consistent view.
//!
//! [`WaitError`]: crate::WaitError

use std::backtrace::Backtrace;
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

use tokio::runtime::Handle;
use tracing::warn;

use crate::config::CaptureConfig;

const TRUNCATED_MARKER: &str = "\n... [truncated]\n";

/// Produces a text snapshot of what the process is currently running.
pub trait StackCapture: Send + Sync {
    /// Capture the snapshot.
    fn capture(&self) -> String;
}

impl<F> StackCapture for F
where
    F: Fn() -> String + Send + Sync,
{
    fn capture(&self) -> String {
        self()
    }
}

/// Capture used by groups built without an explicit collaborator.
static DEFAULT_CAPTURE: LazyLock<Arc<dyn StackCapture>> =
    LazyLock::new(|| Arc::new(ThreadDump::from_env()));

pub(crate) fn default_capture() -> Arc<dyn StackCapture> {
    Arc::clone(&DEFAULT_CAPTURE)
}

/// Default [`StackCapture`]: caller backtrace, tokio runtime summary and the
/// process' OS threads.
#[derive(Debug, Clone, Default)]
pub struct ThreadDump {
    config: CaptureConfig,
}

impl ThreadDump {
    /// Create a dump with an explicit configuration.
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Create a dump configured from `VELO_WAITGROUP_CAPTURE_*`, falling back
    /// to defaults if the environment is invalid.
    pub fn from_env() -> Self {
        let config = CaptureConfig::from_env().unwrap_or_else(|e| {
            warn!("invalid wait group capture config, using defaults: {e}");
            CaptureConfig::default()
        });
        Self::new(config)
    }

    /// The active configuration.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

impl StackCapture for ThreadDump {
    fn capture(&self) -> String {
        let mut out = String::new();

        let current = std::thread::current();
        let _ = writeln!(
            out,
            "=== caller thread {:?} ({:?}) ===",
            current.name().unwrap_or("<unnamed>"),
            current.id()
        );
        if self.config.backtrace {
            let _ = writeln!(out, "{}", Backtrace::force_capture());
        }

        if self.config.runtime {
            out.push_str("=== tokio runtime ===\n");
            match Handle::try_current() {
                Ok(handle) => write_runtime(&mut out, &handle),
                Err(_) => out.push_str("not inside a tokio runtime\n"),
            }
        }

        if self.config.threads {
            let _ = writeln!(out, "=== threads (pid {}) ===", std::process::id());
            write_threads(&mut out);
        }

        truncate(&mut out, self.config.max_bytes);
        out
    }
}

fn write_runtime(out: &mut String, handle: &Handle) {
    let metrics = handle.metrics();
    let _ = writeln!(
        out,
        "flavor={:?} workers={} alive_tasks={}",
        handle.runtime_flavor(),
        metrics.num_workers(),
        metrics.num_alive_tasks(),
    );
}

#[cfg(target_os = "linux")]
fn write_threads(out: &mut String) {
    let tasks = match std::fs::read_dir("/proc/self/task") {
        Ok(tasks) => tasks,
        Err(e) => {
            let _ = writeln!(out, "unavailable: {e}");
            return;
        }
    };

    let mut threads: Vec<(u64, String, String)> = tasks
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let tid: u64 = entry.file_name().to_str()?.parse().ok()?;
            let path = entry.path();
            let name = std::fs::read_to_string(path.join("comm"))
                .map(|s| s.trim_end().to_string())
                .unwrap_or_default();
            let state = std::fs::read_to_string(path.join("stat"))
                .ok()
                .and_then(|stat| thread_state(&stat))
                .unwrap_or_else(|| "?".to_string());
            Some((tid, name, state))
        })
        .collect();
    threads.sort_by_key(|(tid, _, _)| *tid);

    for (tid, name, state) in threads {
        let _ = writeln!(out, "tid={tid} name={name:?} state={state}");
    }
}

#[cfg(not(target_os = "linux"))]
fn write_threads(out: &mut String) {
    out.push_str("thread enumeration not supported on this platform\n");
}

/// State field of `/proc/<pid>/task/<tid>/stat`; the name before it may contain
/// spaces and parentheses, so parse from the last `)`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn thread_state(stat: &str) -> Option<String> {
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.split_whitespace().next().map(str::to_string)
}

fn truncate(out: &mut String, max_bytes: usize) {
    if out.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes.saturating_sub(TRUNCATED_MARKER.len());
    while !out.is_char_boundary(cut) {
        cut -= 1;
    }
    out.truncate(cut);
    out.push_str(TRUNCATED_MARKER);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> CaptureConfig {
        CaptureConfig {
            backtrace: false,
            runtime: false,
            threads: false,
            ..CaptureConfig::default()
        }
    }

    #[test]
    fn closure_is_a_capture() {
        let capture = || "custom dump".to_string();
        let dyn_capture: &dyn StackCapture = &capture;
        assert_eq!(dyn_capture.capture(), "custom dump");
    }

    #[test]
    fn names_caller_thread() {
        let dump = std::thread::Builder::new()
            .name("stuck-waiter".into())
            .spawn(|| ThreadDump::new(minimal()).capture())
            .unwrap()
            .join()
            .unwrap();
        assert!(dump.contains("stuck-waiter"));
        assert!(!dump.contains("=== tokio runtime ==="));
    }

    #[test]
    fn runtime_section_outside_runtime() {
        let config = CaptureConfig {
            runtime: true,
            ..minimal()
        };
        let dump = ThreadDump::new(config).capture();
        assert!(dump.contains("not inside a tokio runtime"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runtime_section_inside_runtime() {
        let config = CaptureConfig {
            runtime: true,
            ..minimal()
        };
        let dump = ThreadDump::new(config).capture();
        assert!(dump.contains("flavor=MultiThread"));
        assert!(dump.contains("workers=2"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn lists_threads() {
        let config = CaptureConfig {
            threads: true,
            ..minimal()
        };
        let dump = ThreadDump::new(config).capture();
        assert!(dump.contains("=== threads (pid"));
        assert!(dump.contains("tid="));
    }

    #[test]
    fn parses_thread_state() {
        assert_eq!(
            thread_state("4242 (tokio-rt (worker)) S 1 2 3").as_deref(),
            Some("S")
        );
        assert_eq!(thread_state("garbage"), None);
    }

    #[test]
    fn truncates_on_char_boundary() {
        let mut out = "é".repeat(400);
        truncate(&mut out, 256);
        assert!(out.len() <= 256);
        assert!(out.ends_with(TRUNCATED_MARKER));

        let mut short = "short".to_string();
        truncate(&mut short, 256);
        assert_eq!(short, "short");
    }
}
