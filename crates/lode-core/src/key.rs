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

//! Identity of a decoded artifact and the disk-cache addresses derived from it.
//!
//! A [`Key`] answers the question "is this exactly the artifact I asked for?".
//! It combines the model identity, the requested dimensions, the ordered list of
//! transformation stages, the decode options and an optional caller signature.
//! Two requests whose keys are equal are served by the same load.

use crate::model::ModelRef;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Requested output dimensions, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Dimensions {
    /// Requested width.
    pub width: u32,
    /// Requested height.
    pub height: u32,
}

impl Dimensions {
    /// Sentinel meaning "use the data's original size".
    pub const ORIGINAL: Self = Self {
        width: u32::MAX,
        height: u32::MAX,
    };

    /// Creates a new pair of dimensions.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if these are the [`Dimensions::ORIGINAL`] sentinel.
    pub fn is_original(&self) -> bool {
        *self == Self::ORIGINAL
    }

    /// Returns `true` for the original-size sentinel or strictly positive sizes.
    pub fn is_valid(&self) -> bool {
        self.is_original() || (self.width > 0 && self.height > 0)
    }

    /// Scales both sides by `multiplier`, never going below one pixel.
    ///
    /// The original-size sentinel is returned unchanged.
    pub fn scaled(&self, multiplier: f32) -> Self {
        if self.is_original() || (multiplier - 1.0).abs() < f32::EPSILON {
            return *self;
        }
        let scale = |side: u32| ((side as f32 * multiplier).round() as u32).max(1);
        Self::new(scale(self.width), scale(self.height))
    }

    /// Number of pixels covered, or `None` for the original-size sentinel.
    pub fn pixel_count(&self) -> Option<u64> {
        if self.is_original() {
            None
        } else {
            Some(self.width as u64 * self.height as u64)
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_original() {
            write!(f, "original")
        } else {
            write!(f, "{}x{}", self.width, self.height)
        }
    }
}

/// A single decode option value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum OptionValue {
    /// A boolean flag.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A float, stored as its IEEE-754 bit pattern so options stay hashable.
    Float(u64),
    /// Free-form text.
    Text(String),
}

impl OptionValue {
    /// Returns the value as a float if it is a `Float` or an `Int`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OptionValue::Float(bits) => Some(f64::from_bits(*bits)),
            OptionValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Float(value.to_bits())
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

/// An ordered set of named decode options.
///
/// Options are part of the [`Key`]: two loads that differ only by an option
/// produce different artifacts. Iteration is ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Options {
    values: BTreeMap<String, OptionValue>,
}

impl Options {
    /// Creates an empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts or replaces an option.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Returns the raw value of an option.
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    /// Returns a boolean option, or `default` if absent or of another type.
    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        match self.values.get(name) {
            Some(OptionValue::Bool(v)) => *v,
            _ => default,
        }
    }

    /// Returns an integer option.
    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(OptionValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Returns a float option.
    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(OptionValue::as_f64)
    }

    /// Returns a text option.
    pub fn get_text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(OptionValue::Text(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Copies every option of `other` into `self`, overriding existing names.
    pub fn merge(&mut self, other: &Options) {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), value.clone());
        }
    }

    /// Returns `true` if no option is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over the options in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// An opaque, caller-supplied value mixed into the key.
///
/// Used to invalidate cached artifacts whose model identity did not change but
/// whose content did (a file's modification time, a content version...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Signature(Cow<'static, str>);

impl Signature {
    /// The empty signature used when the caller supplies none.
    pub const EMPTY: Signature = Signature(Cow::Borrowed(""));

    /// Creates a signature from any string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(Cow::Owned(value.into()))
    }

    /// Returns the signature text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// A 32-byte content hash addressing an entry in the disk cache.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiskKey([u8; 32]);

impl DiskKey {
    /// Wraps raw digest bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hexadecimal form, suitable as a file name.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl AsRef<[u8]> for DiskKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for DiskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DiskKey({})", &self.to_hex()[..16])
    }
}

/// Anything that can be turned into a disk-cache address.
///
/// The digest is a blake3 hash over a tag and the bincode encoding of the key,
/// so structurally equal keys always map to the same [`DiskKey`].
pub trait CacheKey: Serialize {
    /// Distinguishes key families that could otherwise encode identically.
    const KIND: &'static str;

    /// Computes the content hash for this key.
    fn digest(&self) -> DiskKey {
        let mut hasher = blake3::Hasher::new();
        hasher.update(Self::KIND.as_bytes());
        if let Err(e) =
            bincode::serde::encode_into_std_write(self, &mut hasher, bincode::config::standard())
        {
            log::error!("Failed to encode {} cache key: {e}", Self::KIND);
        }
        DiskKey(*hasher.finalize().as_bytes())
    }
}

/// The in-memory identity of a decoded, transformed and transcoded artifact.
///
/// Keys are immutable once built. Equality and hashing are structural over all
/// fields, including the order of the transformation stages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Key {
    model: String,
    model_type: &'static str,
    dimensions: Dimensions,
    stages: Vec<String>,
    signature: Signature,
    resource_type: &'static str,
    transcode_type: &'static str,
    options: Options,
}

impl Key {
    /// Starts a key for `model` at the given dimensions.
    ///
    /// Resource and transcode types default to `"*"` until set with
    /// [`Key::with_types`].
    pub fn new(model: &ModelRef, dimensions: Dimensions) -> Self {
        Self {
            model: model.identity().to_string(),
            model_type: model.type_name(),
            dimensions,
            stages: Vec::new(),
            signature: Signature::EMPTY,
            resource_type: "*",
            transcode_type: "*",
            options: Options::new(),
        }
    }

    /// Sets the ordered transformation stage identifiers.
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the caller signature.
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    /// Sets the decoded resource type and the final transcode type names.
    pub fn with_types(mut self, resource_type: &'static str, transcode_type: &'static str) -> Self {
        self.resource_type = resource_type;
        self.transcode_type = transcode_type;
        self
    }

    /// Sets the decode options.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// The model identity.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The requested dimensions.
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// The ordered transformation stage identifiers.
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    /// The caller signature.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The decode options.
    pub fn options(&self) -> &Options {
        &self.options
    }
}

impl CacheKey for Key {
    const KIND: &'static str = "engine";
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Key{{model={}, size={}, stages=[{}], -> {}}}",
            self.model,
            self.dimensions,
            self.stages.join(","),
            self.transcode_type
        )
    }
}

/// Disk address of the unmodified source data of a model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DataCacheKey {
    /// Identity of the fetched data (usually the fetcher id).
    pub source_id: String,
    /// Caller signature.
    pub signature: Signature,
}

impl CacheKey for DataCacheKey {
    const KIND: &'static str = "data";
}

/// Disk address of a decoded and transformed resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceCacheKey {
    /// Identity of the fetched data.
    pub source_id: String,
    /// Caller signature.
    pub signature: Signature,
    /// Requested dimensions.
    pub dimensions: Dimensions,
    /// Transformation stages applied before encoding.
    pub stages: Vec<String>,
    /// Name of the decoded resource type.
    pub resource_type: &'static str,
    /// Decode options.
    pub options: Options,
}

impl CacheKey for ResourceCacheKey {
    const KIND: &'static str = "resource";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(model: &str, stages: &[&str]) -> Key {
        Key::new(&ModelRef::new(model.to_string()), Dimensions::new(100, 100))
            .with_stages(stages.iter().map(|s| s.to_string()).collect())
            .with_types("Pixels", "Pixels")
    }

    #[test]
    fn keys_are_structural() {
        assert_eq!(key("img1", &["CenterCrop"]), key("img1", &["CenterCrop"]));
        assert_ne!(key("img1", &["CenterCrop"]), key("img2", &["CenterCrop"]));
        assert_eq!(
            key("img1", &["CenterCrop"]).digest(),
            key("img1", &["CenterCrop"]).digest()
        );
    }

    #[test]
    fn stage_order_is_significant() {
        let a = key("img1", &["CenterCrop", "Rounded(4)"]);
        let b = key("img1", &["Rounded(4)", "CenterCrop"]);
        assert_ne!(a, b);
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn options_and_signature_change_the_key() {
        let base = key("img1", &[]);
        let with_option = base
            .clone()
            .with_options(Options::new().with("downsample", "fit_center"));
        let with_signature = base.clone().with_signature(Signature::new("v2"));
        assert_ne!(base, with_option);
        assert_ne!(base, with_signature);
    }

    #[test]
    fn data_and_resource_keys_never_collide() {
        let data = DataCacheKey {
            source_id: "img1".into(),
            signature: Signature::EMPTY,
        };
        let resource = ResourceCacheKey {
            source_id: "img1".into(),
            signature: Signature::EMPTY,
            dimensions: Dimensions::ORIGINAL,
            stages: Vec::new(),
            resource_type: "Pixels",
            options: Options::new(),
        };
        assert_ne!(data.digest(), resource.digest());
        assert_eq!(data.digest().to_hex().len(), 64);
    }

    #[test]
    fn dimensions_scale_and_validate() {
        assert!(Dimensions::ORIGINAL.is_valid());
        assert!(!Dimensions::new(0, 10).is_valid());
        assert_eq!(Dimensions::new(100, 50).scaled(0.5), Dimensions::new(50, 25));
        assert_eq!(Dimensions::new(1, 1).scaled(0.1), Dimensions::new(1, 1));
        assert_eq!(Dimensions::ORIGINAL.scaled(0.5), Dimensions::ORIGINAL);
    }

    #[test]
    fn float_options_round_trip() {
        let options = Options::new().with("quality", 0.75f64).with("crop", true);
        assert_eq!(options.get_float("quality"), Some(0.75));
        assert!(options.get_bool("crop", false));
        assert_eq!(options.get_text("crop"), None);
    }
}
