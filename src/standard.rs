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
use std::sync::Mutex;

use tracing::debug;

use crate::model::job::{Job, JobType};
use crate::model::service_root::{RedfishVendor, ServiceRoot};
use crate::model::{Bios, BiosAttributes, Collection, ComputerSystem};
use crate::network::RedfishHttpClient;
use crate::plan::Stage;
use crate::{model, CommitOutcome, PowerState, Redfish, RedfishError};

/// The calls that use the Redfish standard without any OEM extensions.
///
/// Reading the system, power control and the BIOS attribute snapshot work on any
/// compliant BMC. Changing BIOS attributes needs vendor job handling, so those calls
/// return `NotSupported` here.
pub struct RedfishStandard {
    pub client: RedfishHttpClient,
    vendor: RedfishVendor,
    manager_id: String,
    system_id: String,
    bios_cache: Mutex<Option<BiosAttributes>>,
}

#[async_trait::async_trait]
impl Redfish for RedfishStandard {
    fn vendor(&self) -> RedfishVendor {
        self.vendor
    }

    fn system_id(&self) -> &str {
        &self.system_id
    }

    async fn get_system(&self) -> Result<ComputerSystem, RedfishError> {
        let url = format!("Systems/{}/", self.system_id);
        let (_status_code, body) = self.client.get(&url).await?;
        Ok(body)
    }

    async fn get_power_state(&self) -> Result<PowerState, RedfishError> {
        let system = self.get_system().await?;
        Ok(system.power_state)
    }

    async fn power(&self, action: model::SystemPowerControl) -> Result<(), RedfishError> {
        let url = format!("Systems/{}/Actions/ComputerSystem.Reset", self.system_id);
        let mut arg = HashMap::new();
        arg.insert("ResetType", action.to_string());
        // Dell answers 204 No Content
        self.client.post(&url, arg).await.map(|_status_code| ())
    }

    async fn bios_attributes(&self) -> Result<BiosAttributes, RedfishError> {
        let attrs = self.bios().await?.attributes;
        self.set_cached_bios(attrs.clone());
        Ok(attrs)
    }

    fn cached_bios_attributes(&self) -> Option<BiosAttributes> {
        self.bios_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn stage_bios_attributes(&self, _stage: &Stage) -> Result<(), RedfishError> {
        Err(RedfishError::NotSupported(
            "stage_bios_attributes".to_string(),
        ))
    }

    async fn commit_bios_attributes(&self) -> Result<CommitOutcome, RedfishError> {
        Err(RedfishError::NotSupported(
            "commit_bios_attributes".to_string(),
        ))
    }

    async fn get_job(&self, _id: &str) -> Result<Job, RedfishError> {
        Err(RedfishError::NotSupported("get_job".to_string()))
    }

    async fn list_scheduled_jobs(&self, _job_type: JobType) -> Result<Vec<Job>, RedfishError> {
        Err(RedfishError::NotSupported("list_scheduled_jobs".to_string()))
    }

    async fn ensure_reachable(&self, endpoint: Option<&str>) -> Result<(), RedfishError> {
        self.client
            .probe(endpoint.unwrap_or_default())
            .await
            .map(|_status_code| ())
    }
}

impl RedfishStandard {
    //
    // PUBLIC
    //

    /// Create and setup a connection to BMC.
    /// Issues three HTTP calls to get intial data.
    pub async fn new(client: RedfishHttpClient) -> Result<Self, RedfishError> {
        let mut r = Self {
            client,
            vendor: RedfishVendor::Unknown,
            manager_id: "".to_string(),
            system_id: "".to_string(),
            bios_cache: Mutex::new(None),
        };
        r.set_vendor().await?;
        r.system_id = r.first_member("Systems/").await?;
        r.manager_id = r.first_member("Managers/").await?;
        Ok(r)
    }

    pub fn manager_id(&self) -> &str {
        &self.manager_id
    }

    /// The full BIOS resource, /Systems/{id}/Bios
    pub async fn bios(&self) -> Result<Bios, RedfishError> {
        let url = format!("Systems/{}/Bios", self.system_id);
        let (_status_code, body) = self.client.get(&url).await?;
        Ok(body)
    }

    pub fn set_cached_bios(&self, attrs: BiosAttributes) {
        *self
            .bios_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(attrs);
    }

    //
    // PRIVATE
    //

    /// Fetch root URL and record the vendor, if any
    async fn set_vendor(&mut self) -> Result<(), RedfishError> {
        let (_, root): (_, ServiceRoot) = self.client.get("").await?;
        self.vendor = root.vendor();
        debug!(
            "BMC Vendor: {}",
            root.vendor_string().as_deref().unwrap_or("Unknown")
        );
        Ok(())
    }

    /// Id of the first member of a collection. Needed for all `Systems/{system_id}/...`
    /// and `Managers/{manager_id}/...` calls.
    async fn first_member(&self, collection: &str) -> Result<String, RedfishError> {
        let (_, members): (_, Collection) = self.client.get(collection).await?;
        if members.members.is_empty() {
            return Ok("1".to_string()); // default to DMTF standard suggested
        }
        members.first_member_id()
    }
}
