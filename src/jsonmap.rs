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

// jsonmap.rs
// Helpers for pulling typed values out of raw Redfish JSON, used where we keep the
// whole payload around (jobs) instead of deserializing into a struct.

use std::any::type_name;
use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::RedfishError;

// Both map types we get JSON objects back as.
pub trait JsonMap {
    fn get_value(&self, key: &str) -> Option<&serde_json::Value>;

    fn remove_value(&mut self, key: &str) -> Option<serde_json::Value>;
}

impl JsonMap for serde_json::Map<String, serde_json::Value> {
    fn get_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.get(key)
    }

    fn remove_value(&mut self, key: &str) -> Option<serde_json::Value> {
        self.remove(key)
    }
}

impl JsonMap for HashMap<String, serde_json::Value> {
    fn get_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.get(key)
    }

    fn remove_value(&mut self, key: &str) -> Option<serde_json::Value> {
        self.remove(key)
    }
}

fn missing_key_error(key: &str, url: &str) -> RedfishError {
    RedfishError::MissingKey {
        key: key.to_string(),
        url: url.to_string(),
    }
}

fn invalid_type_error(key: &str, expected_type: &str, url: &str) -> RedfishError {
    RedfishError::InvalidKeyType {
        key: key.to_string(),
        expected_type: expected_type.to_string(),
        url: url.to_string(),
    }
}

// Raw value of `key`, MissingKey if absent.
pub fn get_value<'a, M: JsonMap>(
    map: &'a M,
    key: &str,
    url: &str,
) -> Result<&'a serde_json::Value, RedfishError> {
    map.get_value(key)
        .ok_or_else(|| missing_key_error(key, url))
}

// `key` as a string, e.g. a job's JobState.
pub fn get_str<'a, M: JsonMap>(map: &'a M, key: &str, url: &str) -> Result<&'a str, RedfishError> {
    get_value(map, key, url)?
        .as_str()
        .ok_or_else(|| invalid_type_error(key, "string", url))
}

// Take `key` out of the map and deserialize it, e.g. the Members of a collection.
pub fn extract<T, M: JsonMap>(map: &mut M, key: &str, url: &str) -> Result<T, RedfishError>
where
    T: DeserializeOwned,
{
    let json = map
        .remove_value(key)
        .ok_or_else(|| missing_key_error(key, url))?;
    serde_json::from_value::<T>(json).map_err(|_| invalid_type_error(key, type_name::<T>(), url))
}
