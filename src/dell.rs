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

use tracing::{debug, info};

use crate::{
    diff, jsonmap,
    model::{job::Job, job::JobState, job::JobType, BiosAttributes, ComputerSystem, SetBiosAttributes},
    network::REDFISH_ENDPOINT,
    plan::Stage,
    standard::RedfishStandard,
    CommitOutcome, PowerState, Redfish, RedfishError, RedfishVendor, SystemPowerControl,
};

/// Dell iDRAC. BIOS changes are written to /Bios/Settings and only take effect through a
/// BIOSConfiguration job that runs on the next boot.
pub struct Bmc {
    s: RedfishStandard,
    staged: Mutex<bool>,
}

impl Bmc {
    pub fn new(s: RedfishStandard) -> Result<Bmc, RedfishError> {
        Ok(Bmc {
            s,
            staged: Mutex::new(false),
        })
    }
}

#[async_trait::async_trait]
impl Redfish for Bmc {
    fn vendor(&self) -> RedfishVendor {
        RedfishVendor::Dell
    }

    fn system_id(&self) -> &str {
        self.s.system_id()
    }

    async fn get_system(&self) -> Result<ComputerSystem, RedfishError> {
        self.s.get_system().await
    }

    async fn get_power_state(&self) -> Result<PowerState, RedfishError> {
        self.s.get_power_state().await
    }

    async fn power(&self, action: SystemPowerControl) -> Result<(), RedfishError> {
        self.s.power(action).await
    }

    async fn bios_attributes(&self) -> Result<BiosAttributes, RedfishError> {
        self.s.bios_attributes().await
    }

    fn cached_bios_attributes(&self) -> Option<BiosAttributes> {
        self.s.cached_bios_attributes()
    }

    async fn stage_bios_attributes(&self, stage: &Stage) -> Result<(), RedfishError> {
        let live = match self.s.cached_bios_attributes() {
            Some(attrs) => attrs,
            None => self.s.bios_attributes().await?,
        };
        let pending = diff::unapplied(&live, stage);
        if pending.is_empty() {
            debug!("All of {stage} already applied, nothing to stage");
            self.set_staged(false);
            return Ok(());
        }

        // There can only be a single config job
        self.delete_scheduled_jobs(JobType::BiosConfiguration).await?;

        debug!("Patching bios attributes: {pending}");
        let url = format!("Systems/{}/Bios/Settings", self.s.system_id());
        let body = SetBiosAttributes {
            attributes: &pending,
        };
        self.s.client.patch(&url, body).await?;
        self.set_staged(true);
        Ok(())
    }

    async fn commit_bios_attributes(&self) -> Result<CommitOutcome, RedfishError> {
        if !self.take_staged() {
            return Ok(CommitOutcome::nothing_committed());
        }
        info!("Creating config job.");
        let mut body = HashMap::new();
        body.insert(
            "TargetSettingsURI",
            format!(
                "/{REDFISH_ENDPOINT}/Systems/{}/Bios/Settings",
                self.s.system_id()
            ),
        );
        let (_status_code, location) = self
            .s
            .client
            .post_with_location(&self.jobs_url(), body)
            .await?;
        let job = location.as_deref().and_then(job_id_from_location);
        debug!("Config job created: {}", job.as_deref().unwrap_or("id unknown"));
        Ok(CommitOutcome {
            job,
            reboot_required: true,
        })
    }

    async fn get_job(&self, id: &str) -> Result<Job, RedfishError> {
        let url = format!("{}/{id}", self.jobs_url());
        let (_status_code, body): (_, serde_json::Map<String, serde_json::Value>) =
            self.s.client.get(&url).await?;
        Job::from_json(body, &url)
    }

    async fn list_scheduled_jobs(&self, job_type: JobType) -> Result<Vec<Job>, RedfishError> {
        let url = format!("{}?$expand=*($levels=1)", self.jobs_url());
        let (_status_code, mut body): (_, HashMap<String, serde_json::Value>) =
            self.s.client.get(&url).await?;
        let members: Vec<serde_json::Map<String, serde_json::Value>> =
            jsonmap::extract(&mut body, "Members", &url)?;
        let mut jobs = Vec::with_capacity(members.len());
        for m in members {
            let job = Job::from_json(m, &url)?;
            if job.job_state == JobState::Scheduled && job.is_of_type(job_type) {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    async fn ensure_reachable(&self, endpoint: Option<&str>) -> Result<(), RedfishError> {
        self.s.ensure_reachable(endpoint).await
    }
}

impl Bmc {
    fn jobs_url(&self) -> String {
        format!("Managers/{}/Jobs", self.s.manager_id())
    }

    async fn delete_scheduled_jobs(&self, job_type: JobType) -> Result<(), RedfishError> {
        for job in self.list_scheduled_jobs(job_type).await? {
            info!("Deleting job: {}", job.id);
            let url = format!("{}/{}", self.jobs_url(), job.id);
            self.s.client.delete(&url).await?;
        }
        Ok(())
    }

    fn set_staged(&self, staged: bool) {
        *self.staged.lock().unwrap_or_else(|p| p.into_inner()) = staged;
    }

    fn take_staged(&self) -> bool {
        std::mem::take(&mut *self.staged.lock().unwrap_or_else(|p| p.into_inner()))
    }
}

// /redfish/v1/Managers/iDRAC.Embedded.1/Jobs/JID_878659984891 -> JID_878659984891
fn job_id_from_location(location: &str) -> Option<String> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
