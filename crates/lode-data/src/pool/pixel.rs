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

//! Pixel buffers and the pool that recycles them.

use super::{BucketStrategy, LruPool, PoolStats};
use crate::lock;
use lode_core::cache::TrimLevel;
use lode_core::resource::Resource;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// How many times larger than requested a pooled buffer may be and still be
/// reused by [`SizeFormatStrategy`].
const MAX_SIZE_MULTIPLE: usize = 8;

/// Memory layout of one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit alpha only.
    Alpha8,
    /// 16-bit RGB 5-6-5.
    Rgb565,
    /// 32-bit RGBA, 8 bits per channel.
    Rgba8888,
    /// 64-bit RGBA, half floats.
    RgbaF16,
}

impl PixelFormat {
    /// Bytes used by one pixel.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Alpha8 => 1,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Rgba8888 => 4,
            PixelFormat::RgbaF16 => 8,
        }
    }

    /// Bytes needed for a `width` x `height` image.
    pub const fn byte_size(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }
}

/// A decoded pixel surface.
///
/// The backing allocation may be larger than `width * height * bpp` when the
/// buffer was reused from a bigger one; [`PixelBuffer::pixels`] only exposes
/// the configured part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
    mutable: bool,
}

impl PixelBuffer {
    /// Allocates a zeroed, mutable buffer.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            data: vec![0; format.byte_size(width, height)],
            mutable: true,
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel format.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Bytes of the configured image.
    pub fn byte_size(&self) -> usize {
        self.format.byte_size(self.width, self.height)
    }

    /// Bytes of the backing allocation.
    pub fn allocation_size(&self) -> usize {
        self.data.len()
    }

    /// The configured pixels.
    pub fn pixels(&self) -> &[u8] {
        &self.data[..self.byte_size()]
    }

    /// The configured pixels, mutably.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        let len = self.byte_size();
        &mut self.data[..len]
    }

    /// Whether the buffer may still be written to and pooled.
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Marks the buffer read-only. Immutable buffers are never pooled.
    pub fn set_immutable(&mut self) {
        self.mutable = false;
    }

    /// Reinterprets the allocation with new dimensions and format.
    ///
    /// Returns `false`, leaving the buffer untouched, when the allocation is
    /// too small.
    pub fn reconfigure(&mut self, width: u32, height: u32, format: PixelFormat) -> bool {
        if format.byte_size(width, height) > self.data.len() {
            return false;
        }
        self.width = width;
        self.height = height;
        self.format = format;
        true
    }

    /// Zeroes the configured pixels.
    pub fn erase(&mut self) {
        self.pixels_mut().fill(0);
    }
}

/// What a caller wants from a [`PixelBufferPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelRequest {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: PixelFormat,
}

/// Buckets buffers by format and allocation size.
///
/// A request may reuse any buffer of the same format whose allocation is at
/// least the required size and at most eight times larger; the buffer is then
/// reconfigured to the requested dimensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeFormatStrategy;

impl BucketStrategy for SizeFormatStrategy {
    type Item = PixelBuffer;
    type Request = PixelRequest;
    type Bucket = (PixelFormat, usize);

    fn bucket_of(&self, item: &PixelBuffer) -> Self::Bucket {
        (item.format, item.allocation_size())
    }

    fn bucket_for(&self, request: &PixelRequest) -> Self::Bucket {
        (
            request.format,
            request.format.byte_size(request.width, request.height),
        )
    }

    fn largest_compatible(&self, request: &PixelRequest) -> Self::Bucket {
        let (format, size) = self.bucket_for(request);
        (format, size.saturating_mul(MAX_SIZE_MULTIPLE))
    }

    fn size_of(&self, item: &PixelBuffer) -> usize {
        item.allocation_size()
    }

    fn is_reusable(&self, item: &PixelBuffer) -> bool {
        item.is_mutable()
    }

    fn prepare(&self, item: &mut PixelBuffer, request: &PixelRequest) {
        // The bucket range guarantees the allocation is large enough.
        item.reconfigure(request.width, request.height, request.format);
    }
}

/// Buckets buffers by exact width, height and format.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeStrategy;

impl BucketStrategy for AttributeStrategy {
    type Item = PixelBuffer;
    type Request = PixelRequest;
    type Bucket = (u32, u32, PixelFormat);

    fn bucket_of(&self, item: &PixelBuffer) -> Self::Bucket {
        (item.width, item.height, item.format)
    }

    fn bucket_for(&self, request: &PixelRequest) -> Self::Bucket {
        (request.width, request.height, request.format)
    }

    fn size_of(&self, item: &PixelBuffer) -> usize {
        item.allocation_size()
    }

    fn is_reusable(&self, item: &PixelBuffer) -> bool {
        item.is_mutable()
    }
}

/// A thread-safe pool of [`PixelBuffer`]s.
///
/// `get` never fails: when nothing suitable is pooled a new buffer is
/// allocated.
#[derive(Debug)]
pub struct PixelBufferPool<S = SizeFormatStrategy>
where
    S: BucketStrategy<Item = PixelBuffer, Request = PixelRequest>,
{
    inner: Mutex<LruPool<S>>,
}

impl PixelBufferPool<SizeFormatStrategy> {
    /// Creates a pool using [`SizeFormatStrategy`].
    pub fn new(max_size: usize) -> Self {
        Self::with_strategy(SizeFormatStrategy, max_size)
    }
}

impl<S> PixelBufferPool<S>
where
    S: BucketStrategy<Item = PixelBuffer, Request = PixelRequest>,
{
    /// Creates a pool using `strategy`.
    pub fn with_strategy(strategy: S, max_size: usize) -> Self {
        log::debug!("PixelBufferPool: created with a budget of {max_size} bytes.");
        Self {
            inner: Mutex::new(LruPool::new(strategy, max_size)),
        }
    }

    /// Returns a zeroed buffer of the requested shape.
    pub fn get(&self, width: u32, height: u32, format: PixelFormat) -> PixelBuffer {
        match self.take(width, height, format) {
            Some(mut buffer) => {
                buffer.erase();
                buffer
            }
            None => PixelBuffer::new(width, height, format),
        }
    }

    /// Returns a buffer of the requested shape whose content is unspecified.
    pub fn get_dirty(&self, width: u32, height: u32, format: PixelFormat) -> PixelBuffer {
        self.take(width, height, format)
            .unwrap_or_else(|| PixelBuffer::new(width, height, format))
    }

    fn take(&self, width: u32, height: u32, format: PixelFormat) -> Option<PixelBuffer> {
        let request = PixelRequest {
            width,
            height,
            format,
        };
        lock(&self.inner).get(&request)
    }

    /// Offers `buffer` to the pool, handing it back when rejected.
    pub fn put(&self, buffer: PixelBuffer) -> Result<(), PixelBuffer> {
        let result = lock(&self.inner).put(buffer);
        if let Err(rejected) = &result {
            log::trace!(
                "PixelBufferPool: rejected a {}x{} {:?} buffer.",
                rejected.width(),
                rejected.height(),
                rejected.format()
            );
        }
        result
    }

    /// Offers a shared buffer. Buffers still referenced elsewhere are rejected.
    pub fn put_shared(&self, buffer: Arc<PixelBuffer>) -> Result<(), Arc<PixelBuffer>> {
        match Arc::try_unwrap(buffer) {
            Ok(owned) => self.put(owned).map_err(Arc::new),
            Err(shared) => {
                log::warn!("PixelBufferPool: refused a buffer that is still shared.");
                Err(shared)
            }
        }
    }

    /// Scales the budget relative to its initial value.
    pub fn set_size_multiplier(&self, multiplier: f32) {
        lock(&self.inner).set_size_multiplier(multiplier);
    }

    /// Reacts to memory pressure.
    pub fn trim_memory(&self, level: TrimLevel) {
        lock(&self.inner).trim_memory(level);
    }

    /// Drops every pooled buffer.
    pub fn clear_memory(&self) {
        lock(&self.inner).clear_memory();
    }

    /// Bytes currently pooled.
    pub fn current_size(&self) -> usize {
        lock(&self.inner).current_size()
    }

    /// The current byte budget.
    pub fn max_size(&self) -> usize {
        lock(&self.inner).max_size()
    }

    /// Usage counters.
    pub fn stats(&self) -> PoolStats {
        lock(&self.inner).stats()
    }
}

/// A [`Resource`] over a pooled pixel buffer; recycling returns the buffer to
/// its pool.
pub struct PooledPixelResource<S = SizeFormatStrategy>
where
    S: BucketStrategy<Item = PixelBuffer, Request = PixelRequest>,
{
    buffer: PixelBuffer,
    pool: Arc<PixelBufferPool<S>>,
}

impl<S> PooledPixelResource<S>
where
    S: BucketStrategy<Item = PixelBuffer, Request = PixelRequest>,
{
    /// Wraps `buffer`, which will go back to `pool` when recycled.
    pub fn new(buffer: PixelBuffer, pool: Arc<PixelBufferPool<S>>) -> Self {
        Self { buffer, pool }
    }
}

impl<S> Resource<PixelBuffer> for PooledPixelResource<S>
where
    S: BucketStrategy<Item = PixelBuffer, Request = PixelRequest> + Sync,
{
    fn get(&self) -> &PixelBuffer {
        &self.buffer
    }

    fn size(&self) -> usize {
        self.buffer.allocation_size()
    }

    fn recycle(self: Box<Self>) {
        let Self { buffer, pool } = *self;
        if pool.put(buffer).is_err() {
            log::trace!("PooledPixelResource: buffer dropped instead of pooled.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn larger_buffers_are_reconfigured() {
        let pool = PixelBufferPool::new(1 << 20);
        pool.put(PixelBuffer::new(20, 20, PixelFormat::Rgba8888))
            .expect("buffer fits");

        let buffer = pool.get(10, 10, PixelFormat::Rgba8888);
        assert_eq!((buffer.width(), buffer.height()), (10, 10));
        assert_eq!(buffer.allocation_size(), 20 * 20 * 4);
        assert_eq!(buffer.pixels().len(), 10 * 10 * 4);
        assert_eq!(pool.current_size(), 0);
    }

    #[test]
    fn buffers_more_than_eight_times_larger_are_not_reused() {
        let pool = PixelBufferPool::new(1 << 20);
        pool.put(PixelBuffer::new(100, 100, PixelFormat::Rgba8888))
            .expect("buffer fits");

        let buffer = pool.get(10, 10, PixelFormat::Rgba8888);
        assert_eq!(buffer.allocation_size(), 10 * 10 * 4);
        assert_eq!(pool.stats().misses, 1);
    }

    #[test]
    fn formats_do_not_mix() {
        let pool = PixelBufferPool::new(1 << 20);
        pool.put(PixelBuffer::new(10, 10, PixelFormat::Rgba8888))
            .expect("buffer fits");
        let buffer = pool.get_dirty(10, 20, PixelFormat::Rgb565);
        assert_eq!(buffer.format(), PixelFormat::Rgb565);
        assert_eq!(pool.stats().hits, 0);
    }

    #[test]
    fn get_zeroes_reused_pixels() {
        let pool = PixelBufferPool::new(1 << 20);
        let mut dirty = PixelBuffer::new(4, 4, PixelFormat::Alpha8);
        dirty.pixels_mut().fill(0xff);
        pool.put(dirty).expect("buffer fits");

        let clean = pool.get(4, 4, PixelFormat::Alpha8);
        assert!(clean.pixels().iter().all(|b| *b == 0));
    }

    #[test]
    fn attribute_strategy_requires_exact_match() {
        let pool = PixelBufferPool::with_strategy(AttributeStrategy, 1 << 20);
        pool.put(PixelBuffer::new(20, 20, PixelFormat::Rgba8888))
            .expect("buffer fits");
        let _ = pool.get(10, 10, PixelFormat::Rgba8888);
        assert_eq!(pool.stats().hits, 0);
        let _ = pool.get(20, 20, PixelFormat::Rgba8888);
        assert_eq!(pool.stats().hits, 1);
    }

    #[test]
    fn shared_and_immutable_buffers_are_rejected() {
        let pool = PixelBufferPool::new(1 << 20);

        let shared = Arc::new(PixelBuffer::new(4, 4, PixelFormat::Alpha8));
        let other = shared.clone();
        assert!(pool.put_shared(shared).is_err());
        drop(other);

        let mut frozen = PixelBuffer::new(4, 4, PixelFormat::Alpha8);
        frozen.set_immutable();
        assert!(pool.put(frozen).is_err());

        let sole = Arc::new(PixelBuffer::new(4, 4, PixelFormat::Alpha8));
        assert!(pool.put_shared(sole).is_ok());
    }

    #[test]
    fn recycling_a_pooled_resource_returns_the_buffer() {
        let pool = Arc::new(PixelBufferPool::new(1 << 20));
        let buffer = pool.get(8, 8, PixelFormat::Rgba8888);
        let resource: Box<dyn Resource<PixelBuffer>> =
            Box::new(PooledPixelResource::new(buffer, pool.clone()));
        assert_eq!(resource.size(), 8 * 8 * 4);

        resource.recycle();
        assert_eq!(pool.current_size(), 8 * 8 * 4);
    }
}
