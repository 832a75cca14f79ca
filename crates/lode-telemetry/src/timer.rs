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

//! Scope timers that record their duration into a histogram.

use crate::metrics::HistogramHandle;
use std::time::Instant;

/// Records the time between its creation and its drop, in milliseconds.
pub struct ScopedMetricTimer<'a> {
    started: Instant,
    histogram: Option<&'a HistogramHandle>,
}

impl<'a> ScopedMetricTimer<'a> {
    /// Starts timing into `histogram`.
    pub fn new(histogram: &'a HistogramHandle) -> Self {
        Self {
            started: Instant::now(),
            histogram: Some(histogram),
        }
    }

    /// Starts timing into `histogram` if there is one; otherwise records
    /// nothing.
    pub fn maybe(histogram: Option<&'a HistogramHandle>) -> Self {
        Self {
            started: Instant::now(),
            histogram,
        }
    }

    /// Drops the measurement without recording it.
    pub fn discard(mut self) {
        self.histogram = None;
    }
}

impl Drop for ScopedMetricTimer<'_> {
    fn drop(&mut self) {
        if let Some(histogram) = self.histogram {
            let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
            if let Err(e) = histogram.observe(elapsed_ms) {
                log::warn!("ScopedMetricTimer: failed to record {}: {e}", histogram.id());
            }
        }
    }
}
