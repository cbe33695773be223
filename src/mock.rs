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
//! Scripted in-memory BMC for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use reqwest::StatusCode;
use serde_json::json;
use tokio::time::Instant;

use crate::model::job::{Job, JobType};
use crate::plan::{Stage, SGX_FACTORY_RESET};
use crate::{
    diff, BiosAttributes, CommitOutcome, ComputerSystem, Connector, HostDescriptor, PowerState,
    Redfish, RedfishError, RedfishVendor, SystemPowerControl,
};

#[derive(Debug)]
pub struct BmcState {
    pub power: PowerState,
    pub graceful_hangs: bool,
    pub force_off_hangs: bool,
    /// Power state reads fail with this status once a power action was sent.
    pub power_read_failure: Option<StatusCode>,
    pub power_read_failures_left: u32,
    pub actions: Vec<SystemPowerControl>,
    pub bios: BiosAttributes,
    pub cache: Option<BiosAttributes>,
    pub staged: Stage,
    pub staged_history: Vec<Stage>,
    pub staged_at: Vec<Instant>,
    /// Attributes the BIOS silently refuses to change.
    pub stuck: Vec<String>,
    /// States get_job walks through, the last one repeats.
    pub job_script: VecDeque<&'static str>,
    pub job_polls: u32,
    pub jobs_created: u32,
    pub scheduled: Option<String>,
    pub hide_scheduled: bool,
    pub report_location: bool,
    /// Failed probes of the BIOS resource before it answers again.
    pub bios_unavailable: u32,
    pub unreachable: bool,
}

#[derive(Debug, Clone)]
pub struct ScriptedBmc {
    vendor: RedfishVendor,
    state: Arc<Mutex<BmcState>>,
}

impl ScriptedBmc {
    pub fn dell(bios: BiosAttributes) -> Self {
        ScriptedBmc {
            vendor: RedfishVendor::Dell,
            state: Arc::new(Mutex::new(BmcState {
                power: PowerState::On,
                graceful_hangs: false,
                force_off_hangs: false,
                power_read_failure: None,
                power_read_failures_left: u32::MAX,
                actions: Vec::new(),
                bios,
                cache: None,
                staged: Stage::new(),
                staged_history: Vec::new(),
                staged_at: Vec::new(),
                stuck: Vec::new(),
                job_script: VecDeque::from(["Scheduled", "Running", "Completed"]),
                job_polls: 0,
                jobs_created: 0,
                scheduled: None,
                hide_scheduled: false,
                report_location: true,
                bios_unavailable: 0,
                unreachable: false,
            })),
        }
    }

    pub fn with_vendor(mut self, vendor: RedfishVendor) -> Self {
        self.vendor = vendor;
        self
    }

    pub fn script(self, f: impl FnOnce(&mut BmcState)) -> Self {
        f(&mut self.state());
        self
    }

    pub fn state(&self) -> MutexGuard<'_, BmcState> {
        self.state.lock().unwrap()
    }
}

fn http_500(url: &str) -> RedfishError {
    RedfishError::HTTPErrorCode {
        url: url.to_string(),
        status_code: StatusCode::INTERNAL_SERVER_ERROR,
        body: "iDRAC is currently unable to display any information because data sources are unavailable.".to_string(),
    }
}

#[async_trait::async_trait]
impl Redfish for ScriptedBmc {
    fn vendor(&self) -> RedfishVendor {
        self.vendor
    }

    fn system_id(&self) -> &str {
        "System.Embedded.1"
    }

    async fn get_system(&self) -> Result<ComputerSystem, RedfishError> {
        let power = self.state().power;
        let data = json!({
            "@odata.id": "/redfish/v1/Systems/System.Embedded.1",
            "Id": "System.Embedded.1",
            "PowerState": power,
        });
        serde_json::from_value(data).map_err(|e| RedfishError::GenericError {
            error: e.to_string(),
        })
    }

    async fn get_power_state(&self) -> Result<PowerState, RedfishError> {
        let mut s = self.state();
        if let Some(status_code) = s.power_read_failure {
            if !s.actions.is_empty() && s.power_read_failures_left > 0 {
                s.power_read_failures_left -= 1;
                return Err(RedfishError::HTTPErrorCode {
                    url: "Systems/System.Embedded.1".to_string(),
                    status_code,
                    body: String::new(),
                });
            }
        }
        Ok(s.power)
    }

    async fn power(&self, action: SystemPowerControl) -> Result<(), RedfishError> {
        let mut guard = self.state();
        let s = &mut *guard;
        s.actions.push(action);
        match action {
            SystemPowerControl::GracefulShutdown if !s.graceful_hangs => s.power = PowerState::Off,
            SystemPowerControl::ForceOff if !s.force_off_hangs => s.power = PowerState::Off,
            SystemPowerControl::On => s.power = PowerState::On,
            _ => {}
        }
        Ok(())
    }

    async fn bios_attributes(&self) -> Result<BiosAttributes, RedfishError> {
        let mut s = self.state();
        let attrs = s.bios.clone();
        s.cache = Some(attrs.clone());
        Ok(attrs)
    }

    fn cached_bios_attributes(&self) -> Option<BiosAttributes> {
        self.state().cache.clone()
    }

    async fn stage_bios_attributes(&self, stage: &Stage) -> Result<(), RedfishError> {
        let mut guard = self.state();
        let s = &mut *guard;
        s.staged_history.push(stage.clone());
        s.staged_at.push(Instant::now());
        s.staged = diff::unapplied(&s.bios, stage);
        Ok(())
    }

    async fn commit_bios_attributes(&self) -> Result<CommitOutcome, RedfishError> {
        let mut s = self.state();
        if s.staged.is_empty() {
            return Ok(CommitOutcome::nothing_committed());
        }
        s.jobs_created += 1;
        let id = format!("JID_{}", s.jobs_created);
        s.scheduled = Some(id.clone());
        Ok(CommitOutcome {
            job: s.report_location.then_some(id),
            reboot_required: true,
        })
    }

    async fn get_job(&self, id: &str) -> Result<Job, RedfishError> {
        let mut guard = self.state();
        let s = &mut *guard;
        s.job_polls += 1;
        let state = if s.job_script.len() > 1 {
            s.job_script.pop_front().unwrap_or("Completed")
        } else {
            s.job_script.front().copied().unwrap_or("Completed")
        };
        let percent = match state {
            "Completed" => 100,
            "Running" => 50,
            _ => 0,
        };
        if state == "Completed" {
            let staged = std::mem::take(&mut s.staged);
            for (name, value) in staged.iter() {
                if !s.stuck.iter().any(|a| a == name) {
                    s.bios.insert(name, value);
                }
            }
            if s.bios.get(SGX_FACTORY_RESET).is_some() {
                s.bios.insert(SGX_FACTORY_RESET, "Off");
            }
        }
        let url = format!("Managers/iDRAC.Embedded.1/Jobs/{id}");
        let fields = json!({
            "Id": id,
            "JobState": state,
            "JobType": "BIOSConfiguration",
            "Message": "Task successfully scheduled.",
            "PercentComplete": percent,
        });
        let fields = fields.as_object().cloned().unwrap_or_default();
        Job::from_json(fields, &url)
    }

    async fn list_scheduled_jobs(&self, job_type: JobType) -> Result<Vec<Job>, RedfishError> {
        let s = self.state();
        if s.hide_scheduled {
            return Ok(Vec::new());
        }
        let url = "Managers/iDRAC.Embedded.1/Jobs";
        s.scheduled
            .iter()
            .map(|id| {
                let fields = json!({"Id": id, "JobState": "Scheduled", "JobType": job_type.as_str()});
                Job::from_json(fields.as_object().cloned().unwrap_or_default(), url)
            })
            .collect()
    }

    async fn ensure_reachable(&self, endpoint: Option<&str>) -> Result<(), RedfishError> {
        let mut s = self.state();
        let url = endpoint.unwrap_or_default();
        if s.unreachable {
            return Err(http_500(url));
        }
        if endpoint.is_some() && s.bios_unavailable > 0 {
            s.bios_unavailable -= 1;
            return Err(http_500(url));
        }
        Ok(())
    }
}

/// Hands out the scripted BMC registered for an address.
#[derive(Default)]
pub struct ScriptedFleet {
    pub hosts: HashMap<String, ScriptedBmc>,
}

impl ScriptedFleet {
    pub fn add(&mut self, address: &str, bmc: ScriptedBmc) {
        self.hosts.insert(address.to_string(), bmc);
    }
}

#[async_trait::async_trait]
impl Connector for ScriptedFleet {
    async fn connect(&self, host: &HostDescriptor) -> Result<Box<dyn Redfish>, RedfishError> {
        match self.hosts.get(&host.address) {
            Some(bmc) => Ok(Box::new(bmc.clone())),
            None => Err(RedfishError::GenericError {
                error: format!("no route to host {}", host.address),
            }),
        }
    }
}
