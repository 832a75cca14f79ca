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

//! Metric vocabulary shared by the engine and the telemetry backend.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Identifies a metric as `namespace.name`, e.g. `engine.loads`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MetricId {
    /// The subsystem reporting the metric (`engine`, `memory_cache`...).
    pub namespace: String,
    /// The metric name within its namespace.
    pub name: String,
}

impl MetricId {
    /// Creates a metric id.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// The kind of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricType {
    /// Monotonic count of events.
    Counter,
    /// Point-in-time level.
    Gauge,
    /// Distribution of observed values.
    Histogram,
}

/// The current value of a metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MetricValue {
    /// Total number of events.
    Counter(u64),
    /// Last set level.
    Gauge(f64),
    /// Summary of every observation.
    Histogram {
        /// Number of observations.
        count: u64,
        /// Sum of every observation.
        sum: f64,
        /// Upper bounds of the buckets, ascending.
        bucket_bounds: Vec<f64>,
        /// Observations per bucket; the last slot counts values above every bound.
        bucket_counts: Vec<u64>,
    },
}

impl MetricValue {
    /// An empty histogram over `bucket_bounds`.
    pub fn empty_histogram(bucket_bounds: Vec<f64>) -> Self {
        let bucket_counts = vec![0; bucket_bounds.len() + 1];
        MetricValue::Histogram {
            count: 0,
            sum: 0.0,
            bucket_bounds,
            bucket_counts,
        }
    }

    /// The kind of this value.
    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricValue::Counter(_) => MetricType::Counter,
            MetricValue::Gauge(_) => MetricType::Gauge,
            MetricValue::Histogram { .. } => MetricType::Histogram,
        }
    }

    /// The counter total, if this is a counter.
    pub fn as_counter(&self) -> Option<u64> {
        match self {
            MetricValue::Counter(v) => Some(*v),
            _ => None,
        }
    }

    /// The gauge level, if this is a gauge.
    pub fn as_gauge(&self) -> Option<f64> {
        match self {
            MetricValue::Gauge(v) => Some(*v),
            _ => None,
        }
    }

    /// Mean of a histogram's observations.
    pub fn mean(&self) -> Option<f64> {
        match self {
            MetricValue::Histogram { count, sum, .. } if *count > 0 => Some(sum / *count as f64),
            _ => None,
        }
    }
}

/// A registered metric with its description.
#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    /// The metric id.
    pub id: MetricId,
    /// What the metric measures.
    pub description: String,
    /// Unit of the values (`count`, `bytes`, `ms`).
    pub unit: String,
    /// Current value.
    pub value: MetricValue,
}

/// Errors reported by the metrics registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    /// No metric with this id was registered.
    #[error("metric not found: {0}")]
    NotFound(MetricId),
    /// The operation does not apply to the metric's kind.
    #[error("metric {id} is a {found:?}, expected a {expected:?}")]
    TypeMismatch {
        /// The metric id.
        id: MetricId,
        /// The kind the operation needs.
        expected: MetricType,
        /// The registered kind.
        found: MetricType,
    },
    /// Histogram bounds must be non-empty and strictly ascending.
    #[error("invalid histogram bounds for {0}")]
    InvalidBounds(MetricId),
    /// The backend failed.
    #[error("metrics backend error: {0}")]
    Backend(String),
}

/// Result alias for metric operations.
pub type MetricsResult<T> = Result<T, MetricsError>;
