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
//! Stage planning: turning a host's feature intent into ordered batches of BIOS attributes.
//!
//! Some features need several reboots worth of changes in a fixed order (SGX needs the
//! memory mode and memory encryption committed before the SGX bit can be set), so the
//! plan is a list of stages. Stage *k* of every requested feature is applied together.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::feature::{Feature, FeatureIntent, FeatureState};

pub const SGX_FACTORY_RESET: &str = "SgxFactoryReset";

/// Attribute name to target value, applied and committed as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stage(BTreeMap<String, String>);

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Merge `other` into this stage. On a conflicting attribute name the last write wins.
    pub fn merge(&mut self, other: &Stage) {
        for (k, v) in other.iter() {
            self.insert(k, v);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Stage {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Stage(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for Stage {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        write!(f, "}}")
    }
}

type Template = &'static [&'static [(&'static str, &'static str)]];

const SGX_ON: Template = &[
    &[("MemOpMode", "OptimizerMode"), ("NodeInterleave", "Disabled")],
    &[("MemoryEncryption", "SingleKey")],
    &[("IntelSgx", "On"), (SGX_FACTORY_RESET, "On")],
    &[("PrmrrSize", "64G")],
];
const SGX_OFF: Template = &[&[("IntelSgx", "Off")]];
const TPM_ON: Template = &[&[("TpmSecurity", "On")]];
const TPM_OFF: Template = &[&[("TpmSecurity", "Off")]];
const SECURE_BOOT_ON: Template = &[&[("SecureBoot", "Enabled")]];
const SECURE_BOOT_OFF: Template = &[&[("SecureBoot", "Disabled")]];

/// Attribute stages needed to move `feature` to `state`, or None if nothing is defined.
pub fn template(feature: Feature, state: FeatureState) -> Option<Vec<Stage>> {
    use Feature::*;
    use FeatureState::*;
    let t: Template = match (feature, state) {
        (Sgx, Enabled) => SGX_ON,
        (Sgx, Disabled) => SGX_OFF,
        (Tpm, Enabled) => TPM_ON,
        (Tpm, Disabled) => TPM_OFF,
        (SecureBoot, Enabled) => SECURE_BOOT_ON,
        (SecureBoot, Disabled) => SECURE_BOOT_OFF,
        (AutoMount, _) | (_, Unset) => return None,
    };
    Some(
        t.iter()
            .map(|stage| stage.iter().copied().collect())
            .collect(),
    )
}

/// The BIOS attribute that shows whether `feature` is on.
pub fn status_attribute(feature: Feature) -> Option<&'static str> {
    match feature {
        Feature::Tpm => Some("TpmSecurity"),
        Feature::SecureBoot => Some("SecureBoot"),
        Feature::Sgx => Some("IntelSgx"),
        Feature::AutoMount => None,
    }
}

/// Merge `new` into `all` index-wise, growing `all` as needed.
pub fn merge_stages(all: &mut Vec<Stage>, new: &[Stage]) {
    if all.len() < new.len() {
        all.resize_with(new.len(), Stage::default);
    }
    for (current, add) in all.iter_mut().zip(new) {
        current.merge(add);
    }
}

/// The ordered stages for every requested feature of a host. Pure function of the intent.
pub fn plan_stages(intent: &FeatureIntent) -> Vec<Stage> {
    let mut all = Vec::new();
    for (feature, state) in intent.requested() {
        if let Some(stages) = template(feature, state) {
            merge_stages(&mut all, &stages);
        }
    }
    all
}
