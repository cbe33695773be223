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
use serde::{Deserialize, Serialize};

use crate::RedfishError;

pub mod bios;
pub mod job;
pub mod service_root;
pub mod system;

pub use bios::*;
pub use system::*;

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct ODataLinks {
    #[serde(rename = "@odata.context")]
    pub odata_context: Option<String>,
    #[serde(rename = "@odata.id")]
    pub odata_id: String,
    #[serde(rename = "@odata.type")]
    pub odata_type: Option<String>,
    #[serde(rename = "@odata.etag")]
    pub odata_etag: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ODataId {
    #[serde(rename = "@odata.id")]
    pub odata_id: String,
}

impl From<String> for ODataId {
    fn from(item: String) -> Self {
        ODataId { odata_id: item }
    }
}

impl From<&str> for ODataId {
    fn from(item: &str) -> Self {
        ODataId {
            odata_id: item.to_string(),
        }
    }
}

impl ODataId {
    // Gets last portion of the ID, not including uri path
    pub fn odata_id_get(&self) -> Result<&str, RedfishError> {
        self.odata_id
            .trim_end_matches('/')
            .split('/')
            .next_back()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RedfishError::GenericError {
                error: format!("odata_id have invalid format: {}", self.odata_id),
            })
    }
}

/// Any Redfish resource collection, e.g. /redfish/v1/Systems
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct Collection {
    #[serde(flatten)]
    pub odata: ODataLinks,
    pub name: Option<String>,
    pub members: Vec<ODataId>,
}

impl Collection {
    /// Id of the first member. BIOS convergence assumes a single system and a single manager
    /// per BMC; Dell calls them System.Embedded.1 and iDRAC.Embedded.1, Supermicro just 1.
    pub fn first_member_id(&self) -> Result<String, RedfishError> {
        let url = &self.odata.odata_id;
        let first = self.members.first().ok_or_else(|| RedfishError::MissingKey {
            key: "Members".to_string(),
            url: url.to_string(),
        })?;
        first.odata_id_get().map(str::to_string)
    }
}
