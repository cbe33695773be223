/*
 * SPDX-License-Identifier: MIT
 *
 * Permission is hereby granted, free of charge, to any person obtaining a
 * copy of this software and associated documentation files (the "Software"),
 * to deal in the Software without restriction, including without limitation
 * the rights to use, copy, modify, merge, publish, distribute, sublicense,
 * and/or sell copies of the Software, and to permit persons to whom the
 * Software is furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in
 * all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL
 * THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
 * FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
 * DEALINGS IN THE SOFTWARE.
 */
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ODataLinks;
use crate::plan::Stage;

/// https://redfish.dmtf.org/schemas/v1/Bios.v1_2_0.json
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct Bios {
    #[serde(flatten)]
    pub odata: ODataLinks,
    pub id: Option<String>,
    pub attribute_registry: Option<String>,
    pub attributes: BiosAttributes,
}

/// Live snapshot of the BIOS `Attributes` object. Values keep their JSON type because
/// vendors mix strings, integers and booleans in the same registry.
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(transparent)]
pub struct BiosAttributes(HashMap<String, serde_json::Value>);

impl BiosAttributes {
    pub fn new(attrs: HashMap<String, serde_json::Value>) -> Self {
        BiosAttributes(attrs)
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    /// The attribute rendered the way stage targets are written.
    pub fn value_string(&self, name: &str) -> Option<String> {
        self.0.get(name).map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// True if the attribute is present and already equal to `target`.
    pub fn is_set_to(&self, name: &str, target: &str) -> bool {
        self.value_string(name).as_deref() == Some(target)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(name.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<serde_json::Value>> FromIterator<(K, V)> for BiosAttributes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        BiosAttributes(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// PATCH body for the pending settings resource, /Systems/{id}/Bios/Settings
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct SetBiosAttributes<'a> {
    pub attributes: &'a Stage,
}
