// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Configuration for the diagnostic dump attached to bounded-wait errors.
//!
//! Sources in priority order (lowest to highest):
//! 1. Code defaults
//! 2. Environment variables (`VELO_WAITGROUP_CAPTURE_*` prefixed)

use figment::{
    Figment, Provider,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationErrors};

/// Environment prefix for [`CaptureConfig`] overrides.
pub const ENV_PREFIX: &str = "VELO_WAITGROUP_CAPTURE_";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A provider could not be read or deserialized.
    #[error("Failed to extract configuration: {0}")]
    Extraction(#[from] Box<figment::Error>),

    /// A value is out of range.
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

/// What goes into a diagnostic dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CaptureConfig {
    /// Include the backtrace of the caller whose wait gave up.
    pub backtrace: bool,

    /// Include a summary of the current tokio runtime, if any.
    pub runtime: bool,

    /// Enumerate live OS threads of the process (Linux only).
    pub threads: bool,

    /// Upper bound on the dump size, in bytes.
    #[validate(range(min = 256))]
    pub max_bytes: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backtrace: true,
            runtime: true,
            threads: true,
            max_bytes: 64 * 1024,
        }
    }
}

impl CaptureConfig {
    /// Figment with code defaults and environment overrides merged.
    ///
    /// e.g. `VELO_WAITGROUP_CAPTURE_MAX_BYTES=4096`, `VELO_WAITGROUP_CAPTURE_THREADS=false`
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(CaptureConfig::default()))
            .merge(Env::prefixed(ENV_PREFIX).map(|k| k.as_str().to_lowercase().into()))
    }

    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::extract_from(Self::figment())
    }

    /// Extract and validate configuration from any provider.
    ///
    /// ```rust,ignore
    /// let config = CaptureConfig::extract_from(
    ///     CaptureConfig::figment().merge(("max_bytes", 4096usize)),
    /// )?;
    /// ```
    pub fn extract_from<T: Provider>(provider: T) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(provider)
            .extract()
            .map_err(|e| ConfigError::Extraction(Box::new(e)))?;
        config.validate()?;
        Ok(config)
    }
}
