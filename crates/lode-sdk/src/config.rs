// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Engine configuration, loaded from RON.
//!
//! ```ron
//! (
//!     executors: (source: 4, disk_cache: 1, animation: 2),
//!     memory: Calculated(process_share: 0.125, low_memory: false, screen: (1920, 1080)),
//!     size_multiplier: 1.0,
//!     sweep_interval_ms: Some(5000),
//!     disk_cache_size: Some(262144000),
//!     default_strategy: Automatic,
//! )
//! ```

use anyhow::Context;
use lode_core::cache::DiskCacheStrategy;
use lode_data::{MemoryBudgets, MemorySizeCalculator};
use lode_lanes::ExecutorSizes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Why a configuration could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read engine config {}", path.display())]
    Io {
        /// The file that was read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The text is not a valid configuration.
    #[error("invalid engine config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// A value is out of range.
    #[error("invalid engine config value for `{field}`: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// How the memory cache and pool budgets are chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemoryConfig {
    /// Derived from system memory by [`MemorySizeCalculator`].
    Calculated {
        /// Fraction of total memory granted to the process.
        #[serde(default = "default_process_share")]
        process_share: f64,
        /// Whether the host is memory constrained.
        #[serde(default)]
        low_memory: bool,
        /// Screen size the budgets are expressed in.
        #[serde(default = "default_screen")]
        screen: (u32, u32),
    },
    /// Fixed budgets.
    Explicit(MemoryBudgets),
}

fn default_process_share() -> f64 {
    0.125
}

fn default_screen() -> (u32, u32) {
    (1920, 1080)
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig::Calculated {
            process_share: default_process_share(),
            low_memory: false,
            screen: default_screen(),
        }
    }
}

impl MemoryConfig {
    /// Resolves the budgets, querying the system if needed.
    pub fn budgets(&self) -> MemoryBudgets {
        match self {
            MemoryConfig::Explicit(budgets) => *budgets,
            MemoryConfig::Calculated {
                process_share,
                low_memory,
                screen,
            } => MemorySizeCalculator::new()
                .with_process_share(*process_share)
                .with_low_memory(*low_memory)
                .with_screen(screen.0, screen.1)
                .calculate(),
        }
    }
}

/// Everything needed to build an [`crate::EngineContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker counts of the threaded executors.
    pub executors: ExecutorSizes,
    /// Cache and pool budgets.
    pub memory: MemoryConfig,
    /// Initial multiplier applied to every budget.
    pub size_multiplier: f32,
    /// How often abandoned leases are swept; `None` disables the sweeper.
    pub sweep_interval_ms: Option<u64>,
    /// Budget of the in-memory disk cache; `None` disables disk caching
    /// unless a disk cache is supplied to the builder.
    pub disk_cache_size: Option<usize>,
    /// Strategy used by requests that do not pick one.
    pub default_strategy: DiskCacheStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executors: ExecutorSizes::default(),
            memory: MemoryConfig::default(),
            size_multiplier: 1.0,
            sweep_interval_ms: Some(5_000),
            disk_cache_size: Some(250 * 1024 * 1024),
            default_strategy: DiskCacheStrategy::default(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a RON document.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = ron::de::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a RON file.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ron_str(&text)
            .with_context(|| format!("while loading {}", path.display()))?;
        log::info!("EngineConfig: loaded {}", path.display());
        Ok(config)
    }

    /// Serializes to pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default().indentor("  ".to_string()))
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.size_multiplier.is_finite() && self.size_multiplier >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "size_multiplier",
                reason: format!("{} is not a non-negative number", self.size_multiplier),
            });
        }
        if self.executors.source == 0 || self.executors.disk_cache == 0 || self.executors.animation == 0 {
            return Err(ConfigError::Invalid {
                field: "executors",
                reason: "every executor needs at least one thread".into(),
            });
        }
        if let MemoryConfig::Calculated { process_share, .. } = self.memory {
            if !(0.0..=1.0).contains(&process_share) {
                return Err(ConfigError::Invalid {
                    field: "memory.process_share",
                    reason: format!("{process_share} is outside 0..=1"),
                });
            }
        }
        if self.sweep_interval_ms == Some(0) {
            return Err(ConfigError::Invalid {
                field: "sweep_interval_ms",
                reason: "use None to disable the sweeper".into(),
            });
        }
        Ok(())
    }

    /// The sweep interval as a duration.
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_ms.map(Duration::from_millis)
    }
}
