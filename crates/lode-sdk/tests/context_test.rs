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

use anyhow::Result;
use lode_core::cache::{DiskCacheStrategy, TrimLevel};
use lode_core::telemetry::MetricId;
use lode_data::{MemoryBudgets, PixelBuffer, PixelFormat};
use lode_lanes::ExecutorSet;
use lode_sdk::{EngineConfig, EngineContext, MemoryCategory, MemoryConfig};
use lode_telemetry::MetricsRegistry;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn small_config() -> EngineConfig {
    EngineConfig {
        memory: MemoryConfig::Explicit(MemoryBudgets {
            memory_cache_size: 4096,
            pixel_pool_size: 8192,
            array_pool_size: 1024,
        }),
        sweep_interval_ms: None,
        disk_cache_size: Some(1 << 16),
        ..EngineConfig::default()
    }
}

#[test]
fn config_is_read_from_a_ron_file() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        "(executors: (source: 2, disk_cache: 1, animation: 1), size_multiplier: 0.75, default_strategy: Data)"
    )?;

    let config = EngineConfig::from_path(file.path())?;
    assert_eq!(config.executors.source, 2);
    assert_eq!(config.size_multiplier, 0.75);
    assert_eq!(config.default_strategy, DiskCacheStrategy::Data);
    Ok(())
}

#[test]
fn config_errors_name_the_file() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "(size_multiplier: oops)")?;

    let error = EngineConfig::from_path(file.path()).unwrap_err();
    let rendered = format!("{error:#}");
    assert!(rendered.contains(&file.path().display().to_string()));

    let missing = EngineConfig::from_path("/definitely/not/here.ron").unwrap_err();
    assert!(format!("{missing:#}").contains("here.ron"));
    Ok(())
}

#[test]
fn context_builds_with_metrics_and_shuts_down() -> Result<()> {
    let metrics = Arc::new(MetricsRegistry::new());
    let context = EngineContext::builder(small_config())
        .with_executors(ExecutorSet::direct())
        .with_metrics(metrics.clone())
        .build()?;

    assert!(metrics.contains_metric(&MetricId::new("engine", "loads")));
    assert!(metrics.contains_metric(&MetricId::new("pipeline", "decode_time")));
    assert_eq!(context.engine().job_count(), 0);
    assert_eq!(context.pixel_pool().max_size(), 8192);

    context.trim_memory(TrimLevel::Complete);
    context.clear_memory();
    context.shutdown();
    Ok(())
}

#[test]
fn memory_category_scales_the_budgets() -> Result<()> {
    let context = EngineContext::builder(small_config())
        .with_executors(ExecutorSet::direct())
        .build()?;

    assert_eq!(context.set_memory_category(MemoryCategory::Low), MemoryCategory::Normal);
    assert_eq!(context.memory_category(), MemoryCategory::Low);
    assert_eq!(context.pixel_pool().max_size(), 4096);

    assert_eq!(context.set_memory_category(MemoryCategory::High), MemoryCategory::Low);
    assert_eq!(context.pixel_pool().max_size(), 12288);
    Ok(())
}

#[test]
fn memory_pressure_shrinks_the_pools() -> Result<()> {
    let context = EngineContext::builder(small_config())
        .with_executors(ExecutorSet::direct())
        .build()?;
    let pixels = context.pixel_pool();
    let arrays = context.array_pool();

    // 16x16 RGBA is 1024 bytes, eight of them fill the pixel budget.
    for _ in 0..8 {
        assert!(pixels.put(PixelBuffer::new(16, 16, PixelFormat::Rgba8888)).is_ok());
    }
    for _ in 0..4 {
        assert!(arrays.put(vec![1; 256]).is_ok());
    }
    assert_eq!(pixels.current_size(), 8192);
    assert_eq!(arrays.current_size(), 1024);

    context.set_memory_category(MemoryCategory::Low);
    assert_eq!(pixels.current_size(), 4096);
    assert_eq!(arrays.current_size(), 512);

    context.trim_memory(TrimLevel::UiHidden);
    assert_eq!(pixels.current_size(), 2048);
    assert_eq!(arrays.current_size(), 256);

    context.trim_memory(TrimLevel::Complete);
    assert_eq!(pixels.current_size(), 0);
    assert_eq!(arrays.current_size(), 0);

    // A fresh buffer is handed out once the pool is empty.
    assert_eq!(arrays.get(256), vec![0; 256]);
    Ok(())
}

#[test]
fn invalid_configs_are_refused_at_build() {
    let config = EngineConfig {
        size_multiplier: f32::NAN,
        ..small_config()
    };
    let error = EngineContext::builder(config)
        .with_executors(ExecutorSet::direct())
        .build()
        .unwrap_err();
    assert!(format!("{error:#}").contains("size_multiplier"));
}
