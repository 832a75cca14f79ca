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

//! Ordered transformation stages applied to decoded resources.

use crate::types::TypeInfo;
use lode_core::error::{BoxError, LoadError};
use lode_core::key::Dimensions;
use lode_core::pipeline::Transformation;
use lode_core::resource::ErasedResource;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

trait ErasedTransformation: Send + Sync {
    fn id(&self) -> String;
    fn transform(
        &self,
        resource: &ErasedResource,
        dimensions: Dimensions,
    ) -> Result<Option<ErasedResource>, BoxError>;
}

struct TransformationWrapper<R, T>(T, PhantomData<fn() -> R>);

impl<R: Send + Sync + 'static, T: Transformation<R>> ErasedTransformation
    for TransformationWrapper<R, T>
{
    fn id(&self) -> String {
        self.0.id()
    }

    fn transform(
        &self,
        resource: &ErasedResource,
        dimensions: Dimensions,
    ) -> Result<Option<ErasedResource>, BoxError> {
        let Some(typed) = resource.as_resource::<R>() else {
            return Ok(None);
        };
        Ok(self.0.transform(typed, dimensions)?.map(ErasedResource::new))
    }
}

#[derive(Clone)]
struct Stage {
    resource: TypeInfo,
    transformation: Arc<dyn ErasedTransformation>,
}

/// The transformations requested for a load, in application order.
///
/// Each stage only applies to resources of the type it was registered for, so
/// one set can serve loads whose decoded type is picked at runtime. Every stage
/// id is part of the key, in order.
#[derive(Clone, Default)]
pub struct TransformationSet {
    stages: Vec<Stage>,
}

impl TransformationSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage for resources of type `R`.
    pub fn with<R, T>(mut self, transformation: T) -> Self
    where
        R: Send + Sync + 'static,
        T: Transformation<R> + 'static,
    {
        self.push::<R, T>(transformation);
        self
    }

    /// Appends a stage for resources of type `R`.
    pub fn push<R, T>(&mut self, transformation: T)
    where
        R: Send + Sync + 'static,
        T: Transformation<R> + 'static,
    {
        self.stages.push(Stage {
            resource: TypeInfo::of::<R>(),
            transformation: Arc::new(TransformationWrapper(transformation, PhantomData)),
        });
    }

    /// Stage ids in order, for the key.
    pub fn ids(&self) -> Vec<String> {
        self.stages
            .iter()
            .map(|stage| stage.transformation.id())
            .collect()
    }

    /// Whether any stage applies to `resource`.
    pub fn applies_to(&self, resource: TypeInfo) -> bool {
        self.stages.iter().any(|stage| stage.resource == resource)
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether there are no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage matching the payload type of `resource`, in order.
    ///
    /// When a stage returns a new resource the previous one is recycled. On
    /// failure the current resource is recycled before the error is returned.
    pub fn apply(
        &self,
        resource: ErasedResource,
        dimensions: Dimensions,
    ) -> Result<ErasedResource, LoadError> {
        let mut current = resource;
        for stage in &self.stages {
            if stage.resource.id() != current.payload_type_id() {
                continue;
            }
            match stage.transformation.transform(&current, dimensions) {
                Ok(Some(next)) => {
                    current.recycle();
                    current = next;
                }
                Ok(None) => {}
                Err(cause) => {
                    let stage = stage.transformation.id();
                    current.recycle();
                    return Err(LoadError::Transform { stage, cause });
                }
            }
        }
        Ok(current)
    }
}

impl fmt::Debug for TransformationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}
