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

//! Resolved decode paths.

use crate::erased::{ErasedDecoder, ErasedTranscoder};
use crate::types::{ResourceType, TypeInfo};
use lode_core::error::LoadError;
use lode_core::key::{Dimensions, Options};
use lode_core::resource::ErasedResource;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Called with every freshly decoded resource before it is transcoded.
///
/// The decode job uses it to run transformations and to capture the resource
/// for the disk cache.
pub type DecodedCallback<'a> =
    dyn FnMut(ErasedResource) -> Result<ErasedResource, LoadError> + 'a;

/// Decoders of one `(D, R)` pair plus the transcoder from `R` to `Z`.
pub struct DecodePath {
    data: TypeInfo,
    resource: TypeInfo,
    transcode: TypeInfo,
    decoders: Vec<Arc<dyn ErasedDecoder>>,
    transcoder: Arc<dyn ErasedTranscoder>,
}

impl DecodePath {
    pub(crate) fn new(
        data: TypeInfo,
        resource: TypeInfo,
        transcode: TypeInfo,
        decoders: Vec<Arc<dyn ErasedDecoder>>,
        transcoder: Arc<dyn ErasedTranscoder>,
    ) -> Self {
        Self {
            data,
            resource,
            transcode,
            decoders,
            transcoder,
        }
    }

    /// The decoded resource type.
    pub fn resource_type(&self) -> TypeInfo {
        self.resource
    }

    /// Number of candidate decoders.
    pub fn decoder_count(&self) -> usize {
        self.decoders.len()
    }

    /// Decodes with the first decoder that handles `data`, hands the result to
    /// `on_decoded`, then transcodes.
    pub fn decode(
        &self,
        data: &(dyn Any + Send),
        dimensions: Dimensions,
        options: &Options,
        on_decoded: &mut DecodedCallback<'_>,
    ) -> Result<ErasedResource, LoadError> {
        let decoded = self.decode_resource(data, dimensions, options)?;
        let transformed = on_decoded(decoded)?;
        self.transcoder.transcode(transformed, options)
    }

    fn decode_resource(
        &self,
        data: &(dyn Any + Send),
        dimensions: Dimensions,
        options: &Options,
    ) -> Result<ErasedResource, LoadError> {
        let mut causes = Vec::new();
        for decoder in &self.decoders {
            let attempt = decoder.handles(data, options).and_then(|handles| {
                if handles {
                    decoder.decode(data, dimensions, options)
                } else {
                    Ok(None)
                }
            });
            match attempt {
                Ok(Some(resource)) => return Ok(resource),
                Ok(None) => {}
                Err(cause) => {
                    log::trace!("DecodePath: {} failed: {cause}", decoder.name());
                    causes.push(LoadError::Decode {
                        decoder: decoder.name(),
                        cause,
                    });
                }
            }
        }
        if causes.is_empty() {
            Err(LoadError::NoDecoderAccepted {
                resource: self.resource.name(),
            })
        } else {
            Err(LoadError::aggregate(
                format!("failed to decode {} into {}", self.data.name(), self.resource.name()),
                causes,
            ))
        }
    }
}

impl fmt::Debug for DecodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodePath")
            .field("data", &self.data)
            .field("resource", &self.resource)
            .field("transcode", &self.transcode)
            .field("decoders", &self.decoders.len())
            .finish()
    }
}

/// Every decode path from one data type to one transcode type, in priority
/// order.
pub struct LoadPath {
    data: TypeInfo,
    resource: ResourceType,
    transcode: TypeInfo,
    paths: Vec<DecodePath>,
}

impl LoadPath {
    pub(crate) fn new(
        data: TypeInfo,
        resource: ResourceType,
        transcode: TypeInfo,
        paths: Vec<DecodePath>,
    ) -> Self {
        Self {
            data,
            resource,
            transcode,
            paths,
        }
    }

    /// The decode paths, in the order they are tried.
    pub fn decode_paths(&self) -> &[DecodePath] {
        &self.paths
    }

    /// Tries each decode path until one succeeds.
    ///
    /// Every failure is kept; if no path succeeds they are reported together.
    pub fn load(
        &self,
        data: &(dyn Any + Send),
        dimensions: Dimensions,
        options: &Options,
        on_decoded: &mut DecodedCallback<'_>,
    ) -> Result<ErasedResource, LoadError> {
        let mut causes = Vec::new();
        for path in &self.paths {
            match path.decode(data, dimensions, options, on_decoded) {
                Ok(resource) => return Ok(resource),
                Err(error) => causes.push(error),
            }
        }
        Err(LoadError::aggregate(format!("failed {self:?}"), causes))
    }
}

impl fmt::Debug for LoadPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LoadPath{{{:?} -> {} -> {:?}, {} path(s)}}",
            self.data,
            self.resource.name(),
            self.transcode,
            self.paths.len()
        )
    }
}
