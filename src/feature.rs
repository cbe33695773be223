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
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::network::Endpoint;

/// A firmware capability an operator can ask to turn on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Feature {
    #[serde(rename = "tpm")]
    Tpm,
    #[serde(rename = "secure-boot", alias = "sb", alias = "secureBoot")]
    SecureBoot,
    #[serde(rename = "sgx")]
    Sgx,
    /// Reserved slot, no attribute template exists for it.
    #[serde(rename = "autoMount")]
    AutoMount,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Feature::Tpm => "tpm",
            Feature::SecureBoot => "secure-boot",
            Feature::Sgx => "sgx",
            Feature::AutoMount => "autoMount",
        };
        f.write_str(s)
    }
}

/// Desired state of a feature. `Unset` leaves whatever the host has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum FeatureState {
    #[default]
    Unset,
    Enabled,
    Disabled,
}

impl FeatureState {
    pub fn parse(s: &str) -> Option<FeatureState> {
        match s.to_lowercase().as_str() {
            "on" | "enabled" | "enable" | "true" => Some(FeatureState::Enabled),
            "off" | "disabled" | "disable" | "false" => Some(FeatureState::Disabled),
            "" | "unset" | "none" => Some(FeatureState::Unset),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for FeatureState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(FeatureState::Unset),
            Some(s) => FeatureState::parse(&s).ok_or_else(|| {
                serde::de::Error::custom(format!("invalid feature state '{s}', expected on/off"))
            }),
        }
    }
}

impl fmt::Display for FeatureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureState::Unset => f.write_str("unset"),
            FeatureState::Enabled => f.write_str("on"),
            FeatureState::Disabled => f.write_str("off"),
        }
    }
}

/// Feature name to desired state. Iteration order is the fixed `Feature` order, which is
/// also the order the planner merges templates in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct FeatureIntent(BTreeMap<Feature, FeatureState>);

impl FeatureIntent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, feature: Feature, state: FeatureState) -> Self {
        self.0.insert(feature, state);
        self
    }

    pub fn get(&self, feature: Feature) -> FeatureState {
        self.0.get(&feature).copied().unwrap_or_default()
    }

    /// Features with an actual on/off request.
    pub fn requested(&self) -> impl Iterator<Item = (Feature, FeatureState)> + '_ {
        self.0
            .iter()
            .filter(|(_, state)| **state != FeatureState::Unset)
            .map(|(f, s)| (*f, *s))
    }

    pub fn is_empty(&self) -> bool {
        self.requested().next().is_none()
    }
}

impl FromIterator<(Feature, FeatureState)> for FeatureIntent {
    fn from_iter<T: IntoIterator<Item = (Feature, FeatureState)>>(iter: T) -> Self {
        FeatureIntent(iter.into_iter().collect())
    }
}

/// One server to converge: how to reach its BMC and what it should look like.
#[derive(Clone, Deserialize)]
pub struct HostDescriptor {
    pub address: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(alias = "user")]
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub features: FeatureIntent,
}

impl HostDescriptor {
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        features: FeatureIntent,
    ) -> Self {
        HostDescriptor {
            address: address.into(),
            port: None,
            username: username.into(),
            password: password.into(),
            features,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.address.clone(),
            port: self.port,
            user: Some(self.username.clone()),
            password: Some(self.password.clone()),
        }
    }
}

// Keep the password out of logs.
impl fmt::Debug for HostDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostDescriptor")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}
