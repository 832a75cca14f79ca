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

//! Type-erased adapters over the typed collaborator traits.
//!
//! The registry stores components of many `(D, R, Z)` combinations side by
//! side. Each typed component is wrapped once at registration, and the
//! wrappers recover the concrete types with `Any` downcasts when called.

use crate::types::{ErasedData, TypeInfo};
use lode_core::error::{BoxError, LoadError};
use lode_core::key::{Dimensions, Options};
use lode_core::model::{Model, ModelRef};
use lode_core::pipeline::{
    DataSource, Decoder, EncodeStrategy, Encoder, Fetcher, ModelLoader, Priority,
    ResourceEncoder, Transcoder,
};
use lode_core::resource::ErasedResource;
use std::any::Any;
use std::io::Write;
use std::marker::PhantomData;
use std::sync::Arc;

/// A fetcher whose data type is only known at runtime.
pub trait ErasedFetcher: Send + Sync {
    /// Identity of the fetched data.
    fn id(&self) -> String;
    /// Blocks until the data is available.
    fn load_data(&self, priority: Priority) -> Result<ErasedData, BoxError>;
    /// See [`Fetcher::cleanup`].
    fn cleanup(&self);
    /// See [`Fetcher::cancel`].
    fn cancel(&self);
    /// Where the data comes from.
    fn data_source(&self) -> DataSource;
    /// The type of the data `load_data` produces.
    fn data_type(&self) -> TypeInfo;
}

struct FetcherWrapper<D>(Arc<dyn Fetcher<D>>);

impl<D: Send + 'static> ErasedFetcher for FetcherWrapper<D> {
    fn id(&self) -> String {
        self.0.id().into_owned()
    }

    fn load_data(&self, priority: Priority) -> Result<ErasedData, BoxError> {
        let data = self.0.load_data(priority)?;
        Ok(Box::new(data))
    }

    fn cleanup(&self) {
        self.0.cleanup();
    }

    fn cancel(&self) {
        self.0.cancel();
    }

    fn data_source(&self) -> DataSource {
        self.0.data_source()
    }

    fn data_type(&self) -> TypeInfo {
        TypeInfo::of::<D>()
    }
}

/// What a model loader produced for one load, with the data type erased.
#[derive(Clone)]
pub struct ErasedLoadData {
    /// Primary disk-cache id.
    pub source_id: String,
    /// Extra ids under which the data may be in the disk cache.
    pub alternate_ids: Vec<String>,
    /// The fetcher.
    pub fetcher: Arc<dyn ErasedFetcher>,
}

impl ErasedLoadData {
    /// The data type the fetcher produces.
    pub fn data_type(&self) -> TypeInfo {
        self.fetcher.data_type()
    }
}

pub(crate) trait ErasedModelLoader: Send + Sync {
    fn handles(&self, model: &ModelRef) -> bool;
    fn build_load_data(
        &self,
        model: &ModelRef,
        dimensions: Dimensions,
        options: &Options,
    ) -> Option<ErasedLoadData>;
}

pub(crate) struct ModelLoaderWrapper<M, D, L>(L, PhantomData<fn() -> (M, D)>);

impl<M, D, L> ModelLoaderWrapper<M, D, L> {
    pub(crate) fn new(loader: L) -> Self {
        Self(loader, PhantomData)
    }
}

impl<M, D, L> ErasedModelLoader for ModelLoaderWrapper<M, D, L>
where
    M: Model,
    D: Send + 'static,
    L: ModelLoader<M, D>,
{
    fn handles(&self, model: &ModelRef) -> bool {
        model.downcast_ref::<M>().is_some_and(|m| self.0.handles(m))
    }

    fn build_load_data(
        &self,
        model: &ModelRef,
        dimensions: Dimensions,
        options: &Options,
    ) -> Option<ErasedLoadData> {
        let typed = model.downcast_ref::<M>()?;
        let load_data = self.0.build_load_data(typed, dimensions, options)?;
        Some(ErasedLoadData {
            source_id: load_data.source_id(),
            alternate_ids: load_data.alternate_ids,
            fetcher: Arc::new(FetcherWrapper(load_data.fetcher)),
        })
    }
}

/// A decoder whose data and resource types are only known at runtime.
pub trait ErasedDecoder: Send + Sync {
    /// `Ok(false)` when `data` is not the decoder's data type.
    fn handles(&self, data: &(dyn Any + Send), options: &Options) -> Result<bool, BoxError>;
    /// Decodes into an erased resource; `Ok(None)` means declined.
    fn decode(
        &self,
        data: &(dyn Any + Send),
        dimensions: Dimensions,
        options: &Options,
    ) -> Result<Option<ErasedResource>, BoxError>;
    /// Type name of the wrapped decoder.
    fn name(&self) -> &'static str;
}

pub(crate) struct DecoderWrapper<D, R, T>(T, PhantomData<fn() -> (D, R)>);

impl<D, R, T> DecoderWrapper<D, R, T> {
    pub(crate) fn new(decoder: T) -> Self {
        Self(decoder, PhantomData)
    }
}

impl<D, R, T> ErasedDecoder for DecoderWrapper<D, R, T>
where
    D: Send + 'static,
    R: Send + Sync + 'static,
    T: Decoder<D, R>,
{
    fn handles(&self, data: &(dyn Any + Send), options: &Options) -> Result<bool, BoxError> {
        match data.downcast_ref::<D>() {
            Some(typed) => self.0.handles(typed, options),
            None => Ok(false),
        }
    }

    fn decode(
        &self,
        data: &(dyn Any + Send),
        dimensions: Dimensions,
        options: &Options,
    ) -> Result<Option<ErasedResource>, BoxError> {
        let typed = data.downcast_ref::<D>().ok_or_else(|| {
            format!(
                "{} expects {} data",
                std::any::type_name::<T>(),
                std::any::type_name::<D>()
            )
        })?;
        Ok(self
            .0
            .decode(typed, dimensions, options)?
            .map(ErasedResource::new))
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A transcoder whose types are only known at runtime.
pub trait ErasedTranscoder: Send + Sync {
    /// Transcodes, consuming the input. A wrongly typed input is recycled and
    /// reported as non-conforming.
    fn transcode(&self, resource: ErasedResource, options: &Options)
        -> Result<ErasedResource, LoadError>;
}

pub(crate) struct TranscoderWrapper<R, Z, T>(T, PhantomData<fn() -> (R, Z)>);

impl<R, Z, T> TranscoderWrapper<R, Z, T> {
    pub(crate) fn new(transcoder: T) -> Self {
        Self(transcoder, PhantomData)
    }
}

impl<R, Z, T> ErasedTranscoder for TranscoderWrapper<R, Z, T>
where
    R: Send + Sync + 'static,
    Z: Send + Sync + 'static,
    T: Transcoder<R, Z>,
{
    fn transcode(
        &self,
        resource: ErasedResource,
        options: &Options,
    ) -> Result<ErasedResource, LoadError> {
        let typed = resource.into_typed::<R>().map_err(|other| {
            let actual = other.payload_type_name();
            other.recycle();
            LoadError::NonConforming {
                expected: std::any::type_name::<R>(),
                actual,
            }
        })?;
        self.0
            .transcode(typed, options)
            .map(ErasedResource::new)
            .map_err(|cause| LoadError::Transcode {
                target: std::any::type_name::<Z>(),
                cause,
            })
    }
}

/// Writes source data of a runtime-known type.
pub trait ErasedEncoder: Send + Sync {
    /// `false` when nothing usable was written or `data` has another type.
    fn encode(&self, data: &(dyn Any + Send), sink: &mut dyn Write, options: &Options) -> bool;
}

pub(crate) struct EncoderWrapper<D, E>(E, PhantomData<fn() -> D>);

impl<D, E> EncoderWrapper<D, E> {
    pub(crate) fn new(encoder: E) -> Self {
        Self(encoder, PhantomData)
    }
}

impl<D: Send + 'static, E: Encoder<D>> ErasedEncoder for EncoderWrapper<D, E> {
    fn encode(&self, data: &(dyn Any + Send), sink: &mut dyn Write, options: &Options) -> bool {
        data.downcast_ref::<D>()
            .is_some_and(|typed| self.0.encode(typed, sink, options))
    }
}

/// Writes a decoded resource of a runtime-known type.
pub trait ErasedResourceEncoder: Send + Sync {
    /// `false` when nothing usable was written or the payload has another type.
    fn encode(&self, resource: &ErasedResource, sink: &mut dyn Write, options: &Options) -> bool;
    /// See [`ResourceEncoder::encode_strategy`].
    fn encode_strategy(&self, options: &Options) -> EncodeStrategy;
}

pub(crate) struct ResourceEncoderWrapper<R, E>(E, PhantomData<fn() -> R>);

impl<R, E> ResourceEncoderWrapper<R, E> {
    pub(crate) fn new(encoder: E) -> Self {
        Self(encoder, PhantomData)
    }
}

impl<R: Send + Sync + 'static, E: ResourceEncoder<R>> ErasedResourceEncoder
    for ResourceEncoderWrapper<R, E>
{
    fn encode(&self, resource: &ErasedResource, sink: &mut dyn Write, options: &Options) -> bool {
        resource
            .as_resource::<R>()
            .is_some_and(|typed| self.0.encode(typed, sink, options))
    }

    fn encode_strategy(&self, options: &Options) -> EncodeStrategy {
        self.0.encode_strategy(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_core::pipeline::UnitTranscoder;
    use lode_core::resource::{BoxedResource, SimpleResource};

    struct Utf8;

    impl Decoder<Vec<u8>, String> for Utf8 {
        fn handles(&self, data: &Vec<u8>, _options: &Options) -> Result<bool, BoxError> {
            Ok(!data.is_empty())
        }

        fn decode(
            &self,
            data: &Vec<u8>,
            _dimensions: Dimensions,
            _options: &Options,
        ) -> Result<Option<BoxedResource<String>>, BoxError> {
            let text = String::from_utf8(data.clone())?;
            let size = text.len();
            Ok(Some(SimpleResource::boxed(text, size)))
        }
    }

    #[test]
    fn decoder_wrapper_ignores_other_data_types() {
        let decoder = DecoderWrapper::<Vec<u8>, String, _>::new(Utf8);
        let options = Options::new();
        assert!(!decoder.handles(&42u32, &options).unwrap());
        assert!(decoder.handles(&b"hi".to_vec(), &options).unwrap());

        let decoded = decoder
            .decode(&b"hi".to_vec(), Dimensions::ORIGINAL, &options)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.downcast_ref::<String>().map(String::as_str), Some("hi"));
        assert!(decoder
            .decode(&42u32, Dimensions::ORIGINAL, &options)
            .is_err());
    }

    #[test]
    fn transcoder_wrapper_rejects_wrong_payload() {
        let unit = TranscoderWrapper::<String, String, _>::new(UnitTranscoder::<String>::new());
        let wrong = ErasedResource::new(SimpleResource::boxed(7u32, 4));
        let error = unit.transcode(wrong, &Options::new()).unwrap_err();
        assert!(matches!(error, LoadError::NonConforming { .. }));

        let right = ErasedResource::new(SimpleResource::boxed(String::from("x"), 1));
        assert!(unit.transcode(right, &Options::new()).unwrap().is::<String>());
    }
}
