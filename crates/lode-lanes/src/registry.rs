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

//! The pipeline registry: which components can turn which data into which
//! resources.
//!
//! Registration happens on a [`RegistryBuilder`]. [`RegistryBuilder::freeze`]
//! turns it into an immutable [`Registry`] that resolves and memoizes load
//! paths; there is no way back, so resolved paths never go stale.
//!
//! Decoders live in named priority buckets. The bucket order is always
//! `[BUCKET_PREPEND_ALL] + caller list + [BUCKET_APPEND_ALL]`, and buckets the
//! caller never listed are tried after all of those, in the order they first
//! appeared.

use crate::erased::{
    DecoderWrapper, EncoderWrapper, ErasedDecoder, ErasedEncoder, ErasedLoadData,
    ErasedModelLoader, ErasedResourceEncoder, ErasedTranscoder, ModelLoaderWrapper,
    ResourceEncoderWrapper, TranscoderWrapper,
};
use crate::path::{DecodePath, LoadPath};
use crate::types::{ResourceType, TypeInfo};
use ahash::AHashMap;
use lode_core::error::LoadError;
use lode_core::key::{Dimensions, Options};
use lode_core::model::{Model, ModelRef};
use lode_core::pipeline::{
    Decoder, Encoder, ModelLoader, ResourceEncoder, Transcoder, UnitTranscoder,
};
use std::any::TypeId;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Bucket that [`RegistryBuilder::prepend_decoder`] inserts into; always first.
pub const BUCKET_PREPEND_ALL: &str = "legacy_prepend_all";
/// Bucket that [`RegistryBuilder::append_decoder`] inserts into; always last
/// of the listed buckets.
pub const BUCKET_APPEND_ALL: &str = "legacy_append_all";
/// Default bucket for animated resources.
pub const BUCKET_ANIMATION: &str = "Animation";
/// Default bucket for pixel-buffer resources.
pub const BUCKET_BITMAP: &str = "Bitmap";
/// Default bucket for drawable wrappers of pixel buffers.
pub const BUCKET_BITMAP_DRAWABLE: &str = "BitmapDrawable";

const DEFAULT_BUCKETS: [&str; 3] = [BUCKET_ANIMATION, BUCKET_BITMAP, BUCKET_BITMAP_DRAWABLE];

#[derive(Clone)]
struct DecoderEntry {
    data: TypeInfo,
    resource: TypeInfo,
    decoder: Arc<dyn ErasedDecoder>,
}

struct TranscoderEntry {
    from: TypeInfo,
    to: TypeInfo,
    transcoder: Arc<dyn ErasedTranscoder>,
}

struct ModelLoaderEntry {
    model: TypeInfo,
    data: TypeInfo,
    loader: Arc<dyn ErasedModelLoader>,
}

struct EncoderEntry {
    data: TypeInfo,
    encoder: Arc<dyn ErasedEncoder>,
}

struct ResourceEncoderEntry {
    resource: TypeInfo,
    encoder: Arc<dyn ErasedResourceEncoder>,
}

/// Collects pipeline components before the registry is frozen.
pub struct RegistryBuilder {
    bucket_priority: Vec<String>,
    decoders: AHashMap<String, Vec<DecoderEntry>>,
    unit_transcoders: AHashMap<TypeId, Arc<dyn ErasedTranscoder>>,
    transcoders: Vec<TranscoderEntry>,
    model_loaders: Vec<ModelLoaderEntry>,
    encoders: Vec<EncoderEntry>,
    resource_encoders: Vec<ResourceEncoderEntry>,
}

impl RegistryBuilder {
    /// An empty builder with the default buckets.
    pub fn new() -> Self {
        let mut builder = Self {
            bucket_priority: Vec::new(),
            decoders: AHashMap::new(),
            unit_transcoders: AHashMap::new(),
            transcoders: Vec::new(),
            model_loaders: Vec::new(),
            encoders: Vec::new(),
            resource_encoders: Vec::new(),
        };
        builder.set_bucket_priority_list(&DEFAULT_BUCKETS);
        builder
    }

    /// Applies every component module linked into the binary, in name order.
    pub fn with_linked_modules(mut self) -> Self {
        for module in crate::module::linked_modules() {
            log::debug!("RegistryBuilder: applying component module '{}'", module.name);
            (module.register)(&mut self);
        }
        self
    }

    /// Sets the bucket priority order.
    ///
    /// The list is wrapped between the prepend-all and append-all buckets.
    /// Previously known buckets missing from `buckets` keep their decoders and
    /// are moved after everything listed.
    pub fn set_bucket_priority_list(&mut self, buckets: &[&str]) -> &mut Self {
        let previous = std::mem::take(&mut self.bucket_priority);
        let wrapped = std::iter::once(BUCKET_PREPEND_ALL)
            .chain(buckets.iter().copied())
            .chain(std::iter::once(BUCKET_APPEND_ALL));
        for bucket in wrapped {
            if !self.bucket_priority.iter().any(|known| known == bucket) {
                self.bucket_priority.push(bucket.to_string());
            }
        }
        for bucket in previous {
            if !self.bucket_priority.contains(&bucket) {
                self.bucket_priority.push(bucket);
            }
        }
        self
    }

    /// The current bucket order.
    pub fn bucket_priority_list(&self) -> &[String] {
        &self.bucket_priority
    }

    fn bucket_entries(&mut self, bucket: &str) -> &mut Vec<DecoderEntry> {
        if !self.bucket_priority.iter().any(|known| known == bucket) {
            self.bucket_priority.push(bucket.to_string());
        }
        self.decoders.entry(bucket.to_string()).or_default()
    }

    fn decoder_entry<D, R, T>(&mut self, decoder: T) -> DecoderEntry
    where
        D: Send + 'static,
        R: Send + Sync + 'static,
        T: Decoder<D, R> + 'static,
    {
        self.unit_transcoders
            .entry(TypeId::of::<R>())
            .or_insert_with(|| {
                Arc::new(TranscoderWrapper::<R, R, _>::new(UnitTranscoder::<R>::new()))
            });
        DecoderEntry {
            data: TypeInfo::of::<D>(),
            resource: TypeInfo::of::<R>(),
            decoder: Arc::new(DecoderWrapper::<D, R, T>::new(decoder)),
        }
    }

    /// Adds a fallback decoder at the end of the append-all bucket.
    pub fn append_decoder<D, R, T>(&mut self, decoder: T) -> &mut Self
    where
        D: Send + 'static,
        R: Send + Sync + 'static,
        T: Decoder<D, R> + 'static,
    {
        self.append_decoder_to::<D, R, T>(BUCKET_APPEND_ALL, decoder)
    }

    /// Adds a decoder at the end of `bucket`, creating the bucket at the end of
    /// the priority list if it is unknown.
    pub fn append_decoder_to<D, R, T>(&mut self, bucket: &str, decoder: T) -> &mut Self
    where
        D: Send + 'static,
        R: Send + Sync + 'static,
        T: Decoder<D, R> + 'static,
    {
        let entry = self.decoder_entry::<D, R, T>(decoder);
        self.bucket_entries(bucket).push(entry);
        self
    }

    /// Adds an overriding decoder at the front of the prepend-all bucket.
    pub fn prepend_decoder<D, R, T>(&mut self, decoder: T) -> &mut Self
    where
        D: Send + 'static,
        R: Send + Sync + 'static,
        T: Decoder<D, R> + 'static,
    {
        self.prepend_decoder_to::<D, R, T>(BUCKET_PREPEND_ALL, decoder)
    }

    /// Adds a decoder at the front of `bucket`.
    pub fn prepend_decoder_to<D, R, T>(&mut self, bucket: &str, decoder: T) -> &mut Self
    where
        D: Send + 'static,
        R: Send + Sync + 'static,
        T: Decoder<D, R> + 'static,
    {
        let entry = self.decoder_entry::<D, R, T>(decoder);
        self.bucket_entries(bucket).insert(0, entry);
        self
    }

    /// Registers a transcoder from `R` to `Z`.
    pub fn register_transcoder<R, Z, T>(&mut self, transcoder: T) -> &mut Self
    where
        R: Send + Sync + 'static,
        Z: Send + Sync + 'static,
        T: Transcoder<R, Z> + 'static,
    {
        self.transcoders.push(TranscoderEntry {
            from: TypeInfo::of::<R>(),
            to: TypeInfo::of::<Z>(),
            transcoder: Arc::new(TranscoderWrapper::<R, Z, T>::new(transcoder)),
        });
        self
    }

    fn model_loader_entry<M, D, L>(loader: L) -> ModelLoaderEntry
    where
        M: Model,
        D: Send + 'static,
        L: ModelLoader<M, D> + 'static,
    {
        ModelLoaderEntry {
            model: TypeInfo::of::<M>(),
            data: TypeInfo::of::<D>(),
            loader: Arc::new(ModelLoaderWrapper::<M, D, L>::new(loader)),
        }
    }

    /// Adds a model loader after those already registered.
    pub fn append_model_loader<M, D, L>(&mut self, loader: L) -> &mut Self
    where
        M: Model,
        D: Send + 'static,
        L: ModelLoader<M, D> + 'static,
    {
        self.model_loaders
            .push(Self::model_loader_entry::<M, D, L>(loader));
        self
    }

    /// Adds a model loader before those already registered.
    pub fn prepend_model_loader<M, D, L>(&mut self, loader: L) -> &mut Self
    where
        M: Model,
        D: Send + 'static,
        L: ModelLoader<M, D> + 'static,
    {
        self.model_loaders
            .insert(0, Self::model_loader_entry::<M, D, L>(loader));
        self
    }

    /// Adds a source-data encoder after those already registered.
    pub fn append_encoder<D, E>(&mut self, encoder: E) -> &mut Self
    where
        D: Send + 'static,
        E: Encoder<D> + 'static,
    {
        self.encoders.push(EncoderEntry {
            data: TypeInfo::of::<D>(),
            encoder: Arc::new(EncoderWrapper::<D, E>::new(encoder)),
        });
        self
    }

    /// Adds a source-data encoder before those already registered.
    pub fn prepend_encoder<D, E>(&mut self, encoder: E) -> &mut Self
    where
        D: Send + 'static,
        E: Encoder<D> + 'static,
    {
        self.encoders.insert(
            0,
            EncoderEntry {
                data: TypeInfo::of::<D>(),
                encoder: Arc::new(EncoderWrapper::<D, E>::new(encoder)),
            },
        );
        self
    }

    /// Adds a resource encoder after those already registered.
    pub fn append_resource_encoder<R, E>(&mut self, encoder: E) -> &mut Self
    where
        R: Send + Sync + 'static,
        E: ResourceEncoder<R> + 'static,
    {
        self.resource_encoders.push(ResourceEncoderEntry {
            resource: TypeInfo::of::<R>(),
            encoder: Arc::new(ResourceEncoderWrapper::<R, E>::new(encoder)),
        });
        self
    }

    /// Adds a resource encoder before those already registered.
    pub fn prepend_resource_encoder<R, E>(&mut self, encoder: E) -> &mut Self
    where
        R: Send + Sync + 'static,
        E: ResourceEncoder<R> + 'static,
    {
        self.resource_encoders.insert(
            0,
            ResourceEncoderEntry {
                resource: TypeInfo::of::<R>(),
                encoder: Arc::new(ResourceEncoderWrapper::<R, E>::new(encoder)),
            },
        );
        self
    }

    /// Ends registration.
    pub fn freeze(self) -> Registry {
        let decoders: Vec<DecoderEntry> = self
            .bucket_priority
            .iter()
            .filter_map(|bucket| self.decoders.get(bucket))
            .flatten()
            .cloned()
            .collect();
        log::debug!(
            "Registry: frozen with {} decoder(s) in {} bucket(s), {} model loader(s)",
            decoders.len(),
            self.bucket_priority.len(),
            self.model_loaders.len()
        );
        Registry {
            bucket_priority: self.bucket_priority,
            decoders,
            unit_transcoders: self.unit_transcoders,
            transcoders: self.transcoders,
            model_loaders: self.model_loaders,
            encoders: self.encoders,
            resource_encoders: self.resource_encoders,
            memo: Mutex::new(AHashMap::new()),
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

type PathKey = (TypeId, Option<TypeId>, TypeId);

/// The frozen, shareable registry.
pub struct Registry {
    bucket_priority: Vec<String>,
    /// Every decoder, flattened in bucket order.
    decoders: Vec<DecoderEntry>,
    unit_transcoders: AHashMap<TypeId, Arc<dyn ErasedTranscoder>>,
    transcoders: Vec<TranscoderEntry>,
    model_loaders: Vec<ModelLoaderEntry>,
    encoders: Vec<EncoderEntry>,
    resource_encoders: Vec<ResourceEncoderEntry>,
    memo: Mutex<AHashMap<PathKey, Option<Arc<LoadPath>>>>,
}

impl Registry {
    /// Starts a builder.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// The bucket order the decoders were flattened in.
    pub fn bucket_priority_list(&self) -> &[String] {
        &self.bucket_priority
    }

    /// Resolves the paths decoding `data` into `resource` and transcoding to
    /// `transcode`. `None` means no pipeline exists.
    ///
    /// Results, including negative ones, are memoized per type triple.
    pub fn load_path(
        &self,
        data: TypeInfo,
        resource: ResourceType,
        transcode: TypeInfo,
    ) -> Option<Arc<LoadPath>> {
        let key = (data.id(), resource.memo_id(), transcode.id());
        if let Some(known) = crate::lock(&self.memo).get(&key) {
            return known.clone();
        }
        let resolved = self.resolve(data, resource, transcode).map(Arc::new);
        crate::lock(&self.memo)
            .entry(key)
            .or_insert(resolved)
            .clone()
    }

    /// Typed form of [`Registry::load_path`].
    pub fn load_path_for<D: 'static, R: 'static, Z: 'static>(&self) -> Option<Arc<LoadPath>> {
        self.load_path(
            TypeInfo::of::<D>(),
            ResourceType::of::<R>(),
            TypeInfo::of::<Z>(),
        )
    }

    fn resolve(
        &self,
        data: TypeInfo,
        resource: ResourceType,
        transcode: TypeInfo,
    ) -> Option<LoadPath> {
        let paths: Vec<DecodePath> = self
            .decodable_resource_types(data, resource)
            .into_iter()
            .filter_map(|resource_type| {
                let transcoder = self.transcoder(resource_type, transcode)?;
                let decoders = self
                    .decoders
                    .iter()
                    .filter(|entry| entry.data == data && entry.resource == resource_type)
                    .map(|entry| entry.decoder.clone())
                    .collect();
                Some(DecodePath::new(
                    data,
                    resource_type,
                    transcode,
                    decoders,
                    transcoder,
                ))
            })
            .collect();
        if paths.is_empty() {
            log::debug!(
                "Registry: no pipeline for {data:?} -> {} -> {transcode:?}",
                resource.name()
            );
            return None;
        }
        Some(LoadPath::new(data, resource, transcode, paths))
    }

    fn decodable_resource_types(&self, data: TypeInfo, resource: ResourceType) -> Vec<TypeInfo> {
        let mut types = Vec::new();
        for entry in &self.decoders {
            if entry.data == data && resource.accepts(entry.resource) && !types.contains(&entry.resource)
            {
                types.push(entry.resource);
            }
        }
        types
    }

    fn transcoder(&self, from: TypeInfo, to: TypeInfo) -> Option<Arc<dyn ErasedTranscoder>> {
        if from == to {
            if let Some(unit) = self.unit_transcoders.get(&from.id()) {
                return Some(unit.clone());
            }
        }
        self.transcoders
            .iter()
            .find(|entry| entry.from == from && entry.to == to)
            .map(|entry| entry.transcoder.clone())
    }

    /// Every resource type that some model loader of `model` can lead to and
    /// that can be transcoded into `transcode`.
    pub fn registered_resource_types(
        &self,
        model: TypeInfo,
        resource: ResourceType,
        transcode: TypeInfo,
    ) -> Vec<TypeInfo> {
        let mut data_types: Vec<TypeInfo> = Vec::new();
        for entry in self.model_loaders.iter().filter(|entry| entry.model == model) {
            if !data_types.contains(&entry.data) {
                data_types.push(entry.data);
            }
        }
        let mut types = Vec::new();
        for data in data_types {
            for candidate in self.decodable_resource_types(data, resource) {
                if !types.contains(&candidate) && self.transcoder(candidate, transcode).is_some() {
                    types.push(candidate);
                }
            }
        }
        types
    }

    /// Builds the load data of every model loader that handles `model`, in
    /// registration order.
    ///
    /// Fails with [`LoadError::NoModelLoader`] if no loader handles it.
    pub fn build_load_data(
        &self,
        model: &ModelRef,
        dimensions: Dimensions,
        options: &Options,
    ) -> Result<Vec<ErasedLoadData>, LoadError> {
        let handling: Vec<&ModelLoaderEntry> = self
            .model_loaders
            .iter()
            .filter(|entry| entry.model.id() == model.type_id() && entry.loader.handles(model))
            .collect();
        if handling.is_empty() {
            return Err(LoadError::NoModelLoader {
                model: model.identity().to_string(),
                model_type: model.type_name(),
            });
        }
        Ok(handling
            .into_iter()
            .filter_map(|entry| entry.loader.build_load_data(model, dimensions, options))
            .collect())
    }

    /// The first encoder for source data of type `data`.
    pub fn source_encoder(&self, data: TypeInfo) -> Option<Arc<dyn ErasedEncoder>> {
        self.encoders
            .iter()
            .find(|entry| entry.data == data)
            .map(|entry| entry.encoder.clone())
    }

    /// The first encoder for resources of type `resource`.
    pub fn resource_encoder(&self, resource: TypeInfo) -> Option<Arc<dyn ErasedResourceEncoder>> {
        self.resource_encoders
            .iter()
            .find(|entry| entry.resource == resource)
            .map(|entry| entry.encoder.clone())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("buckets", &self.bucket_priority)
            .field("decoders", &self.decoders.len())
            .field("transcoders", &self.transcoders.len())
            .field("model_loaders", &self.model_loaders.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_core::error::BoxError;
    use lode_core::resource::{BoxedResource, SimpleResource};

    type Calls = Arc<Mutex<Vec<String>>>;

    struct Scripted {
        name: &'static str,
        accepts: bool,
        calls: Calls,
    }

    impl Scripted {
        fn new(name: &'static str, accepts: bool, calls: &Calls) -> Self {
            Self {
                name,
                accepts,
                calls: calls.clone(),
            }
        }
    }

    impl Decoder<Vec<u8>, String> for Scripted {
        fn handles(&self, _data: &Vec<u8>, _options: &Options) -> Result<bool, BoxError> {
            self.calls.lock().unwrap().push(format!("{}.handles", self.name));
            Ok(self.accepts)
        }

        fn decode(
            &self,
            _data: &Vec<u8>,
            _dimensions: Dimensions,
            _options: &Options,
        ) -> Result<Option<BoxedResource<String>>, BoxError> {
            self.calls.lock().unwrap().push(format!("{}.decode", self.name));
            Ok(Some(SimpleResource::boxed(self.name.to_string(), 1)))
        }
    }

    struct Length;

    impl Decoder<Vec<u8>, u32> for Length {
        fn handles(&self, _data: &Vec<u8>, _options: &Options) -> Result<bool, BoxError> {
            Ok(true)
        }

        fn decode(
            &self,
            data: &Vec<u8>,
            _dimensions: Dimensions,
            _options: &Options,
        ) -> Result<Option<BoxedResource<u32>>, BoxError> {
            Ok(Some(SimpleResource::boxed(data.len() as u32, 4)))
        }
    }

    struct CountToText;

    impl Transcoder<u32, String> for CountToText {
        fn transcode(
            &self,
            resource: BoxedResource<u32>,
            _options: &Options,
        ) -> Result<BoxedResource<String>, BoxError> {
            let text = format!("{} bytes", resource.get());
            resource.recycle();
            Ok(SimpleResource::boxed(text, 8))
        }
    }

    fn decode_with(registry: &Registry) -> String {
        let path = registry
            .load_path_for::<Vec<u8>, String, String>()
            .expect("pipeline");
        let resource = path
            .load(
                &b"data".to_vec(),
                Dimensions::ORIGINAL,
                &Options::new(),
                &mut |resource| Ok(resource),
            )
            .expect("decoded");
        resource.downcast_ref::<String>().cloned().unwrap_or_default()
    }

    #[test]
    fn default_buckets_are_wrapped() {
        let builder = RegistryBuilder::new();
        assert_eq!(
            builder.bucket_priority_list(),
            [
                BUCKET_PREPEND_ALL,
                BUCKET_ANIMATION,
                BUCKET_BITMAP,
                BUCKET_BITMAP_DRAWABLE,
                BUCKET_APPEND_ALL
            ]
        );
    }

    #[test]
    fn unlisted_buckets_move_to_the_back() {
        let mut builder = RegistryBuilder::new();
        builder.set_bucket_priority_list(&["Custom", BUCKET_BITMAP]);
        assert_eq!(
            builder.bucket_priority_list(),
            [
                BUCKET_PREPEND_ALL,
                "Custom",
                BUCKET_BITMAP,
                BUCKET_APPEND_ALL,
                BUCKET_ANIMATION,
                BUCKET_BITMAP_DRAWABLE
            ]
        );

        let calls = Calls::default();
        builder.append_decoder_to::<Vec<u8>, String, _>("Late", Scripted::new("late", true, &calls));
        assert_eq!(builder.bucket_priority_list().last().map(String::as_str), Some("Late"));
    }

    #[test]
    fn back_bucket_decoder_is_tried_last() {
        let calls = Calls::default();
        let mut builder = RegistryBuilder::new();
        builder
            .append_decoder::<Vec<u8>, String, _>(Scripted::new("fallback", true, &calls))
            .append_decoder_to::<Vec<u8>, String, _>(
                BUCKET_BITMAP,
                Scripted::new("default", false, &calls),
            )
            .prepend_decoder::<Vec<u8>, String, _>(Scripted::new("front", false, &calls));
        let registry = builder.freeze();

        assert_eq!(decode_with(&registry), "fallback");
        assert_eq!(
            *calls.lock().unwrap(),
            [
                "front.handles",
                "default.handles",
                "fallback.handles",
                "fallback.decode"
            ]
        );
    }

    #[test]
    fn prepended_decoder_preempts_defaults() {
        let calls = Calls::default();
        let mut builder = RegistryBuilder::new();
        builder
            .append_decoder_to::<Vec<u8>, String, _>(
                BUCKET_BITMAP,
                Scripted::new("default", true, &calls),
            )
            .prepend_decoder::<Vec<u8>, String, _>(Scripted::new("custom", true, &calls));
        let registry = builder.freeze();

        assert_eq!(decode_with(&registry), "custom");
        assert!(!calls.lock().unwrap().iter().any(|c| c.starts_with("default")));
    }

    #[test]
    fn load_paths_are_memoized_including_misses() {
        let calls = Calls::default();
        let mut builder = RegistryBuilder::new();
        builder.append_decoder::<Vec<u8>, String, _>(Scripted::new("only", true, &calls));
        let registry = builder.freeze();

        let first = registry.load_path_for::<Vec<u8>, String, String>().unwrap();
        let second = registry.load_path_for::<Vec<u8>, String, String>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.load_path_for::<Vec<u8>, u64, u64>().is_none());
        assert!(registry.load_path_for::<Vec<u8>, u64, u64>().is_none());
    }

    #[test]
    fn any_resource_type_collects_every_transcodable_path() {
        let calls = Calls::default();
        let mut builder = RegistryBuilder::new();
        builder
            .append_decoder::<Vec<u8>, u32, _>(Length)
            .append_decoder::<Vec<u8>, String, _>(Scripted::new("text", false, &calls))
            .register_transcoder::<u32, String, _>(CountToText);
        let registry = builder.freeze();

        let path = registry
            .load_path(
                TypeInfo::of::<Vec<u8>>(),
                ResourceType::Any,
                TypeInfo::of::<String>(),
            )
            .unwrap();
        let order: Vec<TypeInfo> = path
            .decode_paths()
            .iter()
            .map(DecodePath::resource_type)
            .collect();
        assert_eq!(order, [TypeInfo::of::<u32>(), TypeInfo::of::<String>()]);

        let resource = path
            .load(
                &b"abc".to_vec(),
                Dimensions::ORIGINAL,
                &Options::new(),
                &mut |resource| Ok(resource),
            )
            .unwrap();
        assert_eq!(resource.downcast_ref::<String>().unwrap(), "3 bytes");
    }

    #[test]
    fn failures_of_every_path_are_aggregated() {
        let calls = Calls::default();
        let mut builder = RegistryBuilder::new();
        builder.append_decoder::<Vec<u8>, String, _>(Scripted::new("no", false, &calls));
        let registry = builder.freeze();
        let path = registry.load_path_for::<Vec<u8>, String, String>().unwrap();

        let error = path
            .load(
                &b"x".to_vec(),
                Dimensions::ORIGINAL,
                &Options::new(),
                &mut |resource| Ok(resource),
            )
            .unwrap_err();
        assert!(matches!(error, LoadError::NoDecoderAccepted { .. }));
    }

    #[test]
    fn models_without_loader_are_reported() {
        let registry = RegistryBuilder::new().freeze();
        let error = registry
            .build_load_data(
                &ModelRef::new("img1"),
                Dimensions::ORIGINAL,
                &Options::new(),
            )
            .err()
            .unwrap();
        assert!(matches!(error, LoadError::NoModelLoader { .. }));
    }
}
