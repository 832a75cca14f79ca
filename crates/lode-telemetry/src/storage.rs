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

//! Metric storage backends.

use lode_core::telemetry::{Metric, MetricId, MetricType, MetricValue, MetricsError, MetricsResult};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{PoisonError, RwLock};

/// Where metric values live.
///
/// Every update is atomic with respect to other updates of the same backend.
pub trait MetricsBackend: Send + Sync + Debug + 'static {
    /// Stores `metric` unless a metric with the same id exists. Returns the
    /// kind of the metric now stored under that id.
    fn register(&self, metric: Metric) -> MetricsResult<MetricType>;

    /// A copy of the metric.
    fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric>;

    /// Whether the id is registered.
    fn contains_metric(&self, id: &MetricId) -> bool;

    /// Copies of every metric, sorted by id.
    fn list_all_metrics(&self) -> Vec<Metric>;

    /// Number of registered metrics.
    fn metric_count(&self) -> usize;

    /// Adds `delta` to a counter, returning the new total.
    fn increment_counter(&self, id: &MetricId, delta: u64) -> MetricsResult<u64>;

    /// Sets a gauge.
    fn set_gauge(&self, id: &MetricId, value: f64) -> MetricsResult<()>;

    /// Adds `delta` to a gauge, returning the new level.
    fn add_to_gauge(&self, id: &MetricId, delta: f64) -> MetricsResult<f64>;

    /// Records one histogram observation.
    fn observe(&self, id: &MetricId, value: f64) -> MetricsResult<()>;
}

/// A backend keeping every metric in a `RwLock<HashMap>`.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    storage: RwLock<HashMap<MetricId, Metric>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn update<R>(
        &self,
        id: &MetricId,
        expected: MetricType,
        apply: impl FnOnce(&mut MetricValue) -> R,
    ) -> MetricsResult<R> {
        let mut storage = self.storage.write().unwrap_or_else(PoisonError::into_inner);
        let metric = storage
            .get_mut(id)
            .ok_or_else(|| MetricsError::NotFound(id.clone()))?;
        let found = metric.value.metric_type();
        if found != expected {
            return Err(MetricsError::TypeMismatch {
                id: id.clone(),
                expected,
                found,
            });
        }
        Ok(apply(&mut metric.value))
    }
}

impl MetricsBackend for InMemoryBackend {
    fn register(&self, metric: Metric) -> MetricsResult<MetricType> {
        let mut storage = self.storage.write().unwrap_or_else(PoisonError::into_inner);
        let kind = storage
            .entry(metric.id.clone())
            .or_insert(metric)
            .value
            .metric_type();
        Ok(kind)
    }

    fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric> {
        let storage = self.storage.read().unwrap_or_else(PoisonError::into_inner);
        storage
            .get(id)
            .cloned()
            .ok_or_else(|| MetricsError::NotFound(id.clone()))
    }

    fn contains_metric(&self, id: &MetricId) -> bool {
        let storage = self.storage.read().unwrap_or_else(PoisonError::into_inner);
        storage.contains_key(id)
    }

    fn list_all_metrics(&self) -> Vec<Metric> {
        let storage = self.storage.read().unwrap_or_else(PoisonError::into_inner);
        let mut metrics: Vec<Metric> = storage.values().cloned().collect();
        metrics.sort_by(|a, b| a.id.cmp(&b.id));
        metrics
    }

    fn metric_count(&self) -> usize {
        let storage = self.storage.read().unwrap_or_else(PoisonError::into_inner);
        storage.len()
    }

    fn increment_counter(&self, id: &MetricId, delta: u64) -> MetricsResult<u64> {
        self.update(id, MetricType::Counter, |value| match value {
            MetricValue::Counter(total) => {
                *total = total.saturating_add(delta);
                *total
            }
            _ => 0,
        })
    }

    fn set_gauge(&self, id: &MetricId, level: f64) -> MetricsResult<()> {
        self.update(id, MetricType::Gauge, |value| {
            if let MetricValue::Gauge(current) = value {
                *current = level;
            }
        })
    }

    fn add_to_gauge(&self, id: &MetricId, delta: f64) -> MetricsResult<f64> {
        self.update(id, MetricType::Gauge, |value| match value {
            MetricValue::Gauge(current) => {
                *current += delta;
                *current
            }
            _ => 0.0,
        })
    }

    fn observe(&self, id: &MetricId, sample: f64) -> MetricsResult<()> {
        self.update(id, MetricType::Histogram, |value| {
            if let MetricValue::Histogram {
                count,
                sum,
                bucket_bounds,
                bucket_counts,
            } = value
            {
                *count += 1;
                *sum += sample;
                let slot = bucket_bounds
                    .iter()
                    .position(|bound| sample <= *bound)
                    .unwrap_or(bucket_bounds.len());
                if let Some(bucket) = bucket_counts.get_mut(slot) {
                    *bucket += 1;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(name: &str) -> Metric {
        Metric {
            id: MetricId::new("test", name),
            description: String::new(),
            unit: "count".into(),
            value: MetricValue::Counter(0),
        }
    }

    #[test]
    fn registering_twice_keeps_the_first_metric() {
        let backend = InMemoryBackend::new();
        backend.register(counter("a")).expect("register");
        backend
            .increment_counter(&MetricId::new("test", "a"), 3)
            .expect("increment");
        backend.register(counter("a")).expect("register again");

        let metric = backend.get_metric(&MetricId::new("test", "a")).expect("get");
        assert_eq!(metric.value.as_counter(), Some(3));
        assert_eq!(backend.metric_count(), 1);
    }

    #[test]
    fn updates_check_the_metric_kind() {
        let backend = InMemoryBackend::new();
        backend.register(counter("a")).expect("register");
        let error = backend
            .set_gauge(&MetricId::new("test", "a"), 1.0)
            .unwrap_err();
        assert!(matches!(error, MetricsError::TypeMismatch { .. }));
        assert!(matches!(
            backend.increment_counter(&MetricId::new("test", "missing"), 1),
            Err(MetricsError::NotFound(_))
        ));
    }

    #[test]
    fn histogram_samples_land_in_buckets() {
        let backend = InMemoryBackend::new();
        let id = MetricId::new("test", "h");
        backend
            .register(Metric {
                id: id.clone(),
                description: String::new(),
                unit: "ms".into(),
                value: MetricValue::empty_histogram(vec![1.0, 10.0]),
            })
            .expect("register");
        for sample in [0.5, 5.0, 50.0, 60.0] {
            backend.observe(&id, sample).expect("observe");
        }
        match backend.get_metric(&id).expect("get").value {
            MetricValue::Histogram {
                count,
                bucket_counts,
                ..
            } => {
                assert_eq!(count, 4);
                assert_eq!(bucket_counts, vec![1, 1, 2]);
            }
            other => panic!("unexpected value {other:?}"),
        }
    }
}
