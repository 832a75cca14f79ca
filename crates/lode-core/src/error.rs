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

//! Defines the error type reported for failed loads.

use thiserror::Error;

/// A boxed, thread-safe error returned by external collaborators
/// (fetchers, decoders, transformations, transcoders).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a load failed.
///
/// A single `LoadError` is produced per engine job and shared by every request
/// waiting on it. Failures of several candidate loaders or decoders are folded
/// into one [`LoadError::Aggregate`] that keeps every cause.
#[derive(Debug, Error)]
pub enum LoadError {
    /// No registered decoder/transcoder path exists for the requested types.
    /// This is a configuration error and is never retried.
    #[error("no suitable pipeline to decode {data} into {resource} and transcode to {transcode}")]
    NoPipeline {
        /// Name of the raw data type.
        data: &'static str,
        /// Name of the requested resource type (`*` for any).
        resource: &'static str,
        /// Name of the requested transcode type.
        transcode: &'static str,
    },

    /// No model loader accepted the model.
    #[error("no model loader can handle model '{model}' of type {model_type}")]
    NoModelLoader {
        /// Identity of the model.
        model: String,
        /// Type name of the model.
        model_type: &'static str,
    },

    /// A fetcher failed to produce data.
    #[error("failed to fetch '{source_id}'")]
    Fetch {
        /// Identity of the fetched source.
        source_id: String,
        /// The underlying error.
        #[source]
        cause: BoxError,
    },

    /// A decoder that claimed to handle the data failed.
    #[error("decoder {decoder} failed")]
    Decode {
        /// Type name of the decoder.
        decoder: &'static str,
        /// The underlying error.
        #[source]
        cause: BoxError,
    },

    /// Every candidate decoder declined the data or returned nothing.
    #[error("no decoder of {resource} accepted the data")]
    NoDecoderAccepted {
        /// Name of the resource type.
        resource: &'static str,
    },

    /// A transformation failed.
    #[error("transformation '{stage}' failed")]
    Transform {
        /// Identifier of the transformation stage.
        stage: String,
        /// The underlying error.
        #[source]
        cause: BoxError,
    },

    /// A transcoder failed.
    #[error("transcoding to {target} failed")]
    Transcode {
        /// Name of the transcode type.
        target: &'static str,
        /// The underlying error.
        #[source]
        cause: BoxError,
    },

    /// A delivered resource did not carry the payload type the caller expected.
    #[error("expected a {expected} resource but received {actual}")]
    NonConforming {
        /// Expected payload type name.
        expected: &'static str,
        /// Actual payload type name.
        actual: &'static str,
    },

    /// A pipeline component panicked; the job was abandoned at `stage`.
    #[error("a pipeline component panicked during the {stage} stage")]
    Panicked {
        /// The stage that was running.
        stage: String,
    },

    /// The load was restricted to caches and every cache missed.
    #[error("resource is not cached and loading from source is disabled")]
    CacheOnlyMiss,

    /// The load was cancelled or the engine shut down before it finished.
    /// Only futures report this; callbacks are simply not called.
    #[error("the load was cancelled before it finished")]
    Cancelled,

    /// Several failures folded into one.
    #[error("{message} ({} cause(s))", .causes.len())]
    Aggregate {
        /// Summary of what was attempted.
        message: String,
        /// Every individual failure, in the order they happened.
        causes: Vec<LoadError>,
    },
}

impl LoadError {
    /// Folds `causes` into a single error.
    ///
    /// A single cause is returned as is, so callers do not see needless nesting.
    pub fn aggregate(message: impl Into<String>, mut causes: Vec<LoadError>) -> Self {
        if causes.len() == 1 {
            if let Some(only) = causes.pop() {
                return only;
            }
        }
        LoadError::Aggregate {
            message: message.into(),
            causes,
        }
    }

    /// Returns the leaf failures, flattening nested aggregates.
    pub fn root_causes(&self) -> Vec<&LoadError> {
        match self {
            LoadError::Aggregate { causes, .. } => {
                causes.iter().flat_map(LoadError::root_causes).collect()
            }
            other => vec![other],
        }
    }

    /// Logs every root cause at `warn` level, prefixed by `tag`.
    pub fn log_root_causes(&self, tag: &str) {
        let causes = self.root_causes();
        for (index, cause) in causes.iter().enumerate() {
            log::warn!("{tag}: root cause {} of {}: {cause}", index + 1, causes.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetch_error(id: &str) -> LoadError {
        LoadError::Fetch {
            source_id: id.to_string(),
            cause: "connection reset".into(),
        }
    }

    #[test]
    fn aggregate_of_one_is_unwrapped() {
        let error = LoadError::aggregate("load failed", vec![fetch_error("a")]);
        assert!(matches!(error, LoadError::Fetch { .. }));
    }

    #[test]
    fn root_causes_flatten_nested_aggregates() {
        let inner = LoadError::aggregate("inner", vec![fetch_error("a"), fetch_error("b")]);
        let outer = LoadError::aggregate("outer", vec![inner, LoadError::CacheOnlyMiss]);

        let causes = outer.root_causes();
        assert_eq!(causes.len(), 3);
        assert!(matches!(causes[2], LoadError::CacheOnlyMiss));
        assert_eq!(outer.to_string(), "outer (2 cause(s))");
    }

    #[test]
    fn fetch_error_exposes_source() {
        let error = fetch_error("a");
        let source = std::error::Error::source(&error).expect("fetch errors carry a source");
        assert_eq!(source.to_string(), "connection reset");
    }
}
