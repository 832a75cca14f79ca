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

//! Derives cache and pool budgets from the memory available to the process.

use serde::{Deserialize, Serialize};

const MIB: usize = 1024 * 1024;
const BYTES_PER_SCREEN_PIXEL: usize = 4;

/// Byte budgets for the memory cache and the two pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBudgets {
    /// Memory cache budget.
    pub memory_cache_size: usize,
    /// Pixel buffer pool budget.
    pub pixel_pool_size: usize,
    /// Byte array pool budget.
    pub array_pool_size: usize,
}

/// Computes [`MemoryBudgets`].
///
/// The process is granted `process_share` of total memory. At most 40% of that
/// (33% on low-memory hosts) goes to caching. The array pool takes a fixed
/// slice first, then the rest is split between the memory cache and the pixel
/// pool in proportion to how many screens of pixels each should hold.
#[derive(Debug, Clone)]
pub struct MemorySizeCalculator {
    total_memory: Option<u64>,
    process_share: f64,
    low_memory: bool,
    screen: (u32, u32),
    memory_cache_screens: f64,
    pixel_pool_screens: f64,
    array_pool_size: usize,
}

impl Default for MemorySizeCalculator {
    fn default() -> Self {
        Self {
            total_memory: None,
            process_share: 0.125,
            low_memory: false,
            screen: (1920, 1080),
            memory_cache_screens: 2.0,
            pixel_pool_screens: 4.0,
            array_pool_size: 4 * MIB,
        }
    }
}

impl MemorySizeCalculator {
    /// A calculator with default settings that queries system memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `bytes` as total memory instead of querying the system.
    pub fn with_total_memory(mut self, bytes: u64) -> Self {
        self.total_memory = Some(bytes);
        self
    }

    /// Fraction of total memory granted to this process.
    pub fn with_process_share(mut self, share: f64) -> Self {
        self.process_share = share.clamp(0.0, 1.0);
        self
    }

    /// Marks the host as memory constrained.
    pub fn with_low_memory(mut self, low_memory: bool) -> Self {
        self.low_memory = low_memory;
        self
    }

    /// Screen size used to express budgets in screens of pixels.
    pub fn with_screen(mut self, width: u32, height: u32) -> Self {
        self.screen = (width, height);
        self
    }

    /// How many full screens the memory cache should hold.
    pub fn with_memory_cache_screens(mut self, screens: f64) -> Self {
        self.memory_cache_screens = screens.max(0.0);
        self
    }

    /// How many full screens the pixel pool should hold.
    pub fn with_pixel_pool_screens(mut self, screens: f64) -> Self {
        self.pixel_pool_screens = screens.max(0.0);
        self
    }

    /// Budget of the array pool before the low-memory reduction.
    pub fn with_array_pool_size(mut self, bytes: usize) -> Self {
        self.array_pool_size = bytes;
        self
    }

    /// Total memory reported by the operating system, in bytes.
    pub fn system_total_memory() -> u64 {
        let mut system = sysinfo::System::new();
        system.refresh_memory();
        system.total_memory()
    }

    /// Computes the budgets.
    pub fn calculate(&self) -> MemoryBudgets {
        let total = self
            .total_memory
            .unwrap_or_else(Self::system_total_memory);
        let process_budget = total as f64 * self.process_share;
        let max_size =
            (process_budget * if self.low_memory { 0.33 } else { 0.4 }).round() as usize;

        let array_pool_size = if self.low_memory {
            self.array_pool_size / 2
        } else {
            self.array_pool_size
        };
        let available = max_size.saturating_sub(array_pool_size);

        let screen_bytes =
            (self.screen.0 as usize * self.screen.1 as usize * BYTES_PER_SCREEN_PIXEL) as f64;
        let target_cache = screen_bytes * self.memory_cache_screens;
        let target_pool = screen_bytes * self.pixel_pool_screens;

        let (memory_cache_size, pixel_pool_size) = if target_cache + target_pool <= available as f64
        {
            (target_cache as usize, target_pool as usize)
        } else {
            let screens = self.memory_cache_screens + self.pixel_pool_screens;
            if screens <= 0.0 {
                (0, 0)
            } else {
                let part = available as f64 / screens;
                (
                    (part * self.memory_cache_screens) as usize,
                    (part * self.pixel_pool_screens) as usize,
                )
            }
        };

        let budgets = MemoryBudgets {
            memory_cache_size,
            pixel_pool_size,
            array_pool_size,
        };
        log::debug!(
            "MemorySizeCalculator: total={total} max={max_size} low_memory={} -> {budgets:?}",
            self.low_memory
        );
        budgets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn roomy_hosts_get_target_screens() {
        let budgets = MemorySizeCalculator::new()
            .with_total_memory(16 * GIB)
            .with_screen(100, 100)
            .calculate();
        assert_eq!(budgets.memory_cache_size, 2 * 100 * 100 * 4);
        assert_eq!(budgets.pixel_pool_size, 4 * 100 * 100 * 4);
        assert_eq!(budgets.array_pool_size, 4 * MIB);
    }

    #[test]
    fn tight_hosts_split_proportionally() {
        // 100 MiB total, 12.5% share, 40% of that = 5 MiB; minus 4 MiB arrays.
        let budgets = MemorySizeCalculator::new()
            .with_total_memory(100 * MIB as u64)
            .calculate();
        let available = 5 * MIB - 4 * MIB;
        assert!(budgets.memory_cache_size + budgets.pixel_pool_size <= available);
        assert_eq!(budgets.pixel_pool_size / budgets.memory_cache_size, 2);
    }

    #[test]
    fn low_memory_halves_the_array_pool() {
        let budgets = MemorySizeCalculator::new()
            .with_total_memory(16 * GIB)
            .with_low_memory(true)
            .calculate();
        assert_eq!(budgets.array_pool_size, 2 * MIB);
    }
}
