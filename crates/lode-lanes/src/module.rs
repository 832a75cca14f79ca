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

//! Link-time registration of pipeline components.
//!
//! A crate that ships decoders, model loaders or encoders can make them
//! available to every registry built with
//! [`RegistryBuilder::with_linked_modules`] by submitting a module:
//!
//! ```ignore
//! fn register(builder: &mut RegistryBuilder) {
//!     builder.append_decoder::<Vec<u8>, Pixels, _>(PngDecoder);
//! }
//!
//! inventory::submit! {
//!     ComponentModule { name: "png", register }
//! }
//! ```

use crate::registry::RegistryBuilder;

/// A named bundle of registrations.
pub struct ComponentModule {
    /// Unique name; modules are applied in name order.
    pub name: &'static str,
    /// Adds the module's components.
    pub register: fn(&mut RegistryBuilder),
}

inventory::collect!(ComponentModule);

/// Every linked module, sorted by name.
pub fn linked_modules() -> Vec<&'static ComponentModule> {
    let mut modules: Vec<&'static ComponentModule> =
        inventory::iter::<ComponentModule>.into_iter().collect();
    modules.sort_by_key(|module| module.name);
    modules
}
