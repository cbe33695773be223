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
//! Staged BIOS feature convergence for fleets of Redfish-managed servers.
//!
//! Operators declare per host whether TPM, Secure Boot and SGX should be on or off. For
//! every host this crate plans the ordered BIOS attribute stages those features need,
//! drops what the live BIOS already has, and applies each remaining stage: stage the
//! attributes, commit them as a config job, power cycle the server when the job needs
//! it, wait for the job, and verify the result. Hosts run concurrently and a failing
//! host never stops the others.
//!
//! ```no_run
//! # async fn run() -> Result<(), biosconverge::RedfishError> {
//! use biosconverge::{
//!     ConvergeSettings, ExecutionMode, Feature, FeatureIntent, FeatureState, HostDescriptor,
//!     HostDriver, RedfishClientPool,
//! };
//!
//! let hosts = vec![HostDescriptor::new(
//!     "10.22.22.139",
//!     "root",
//!     "calvin",
//!     FeatureIntent::new().with(Feature::Sgx, FeatureState::Enabled),
//! )];
//! let pool = RedfishClientPool::builder().build()?;
//! let driver = HostDriver::new(pool, ConvergeSettings::default());
//! let report = driver.converge(hosts, ExecutionMode::Concurrent).await;
//! for (address, error) in report.failures.iter() {
//!     eprintln!("{address}: {error}");
//! }
//! # Ok(())
//! # }
//! ```
use serde::{Deserialize, Serialize};

pub mod diff;
pub mod driver;
mod error;
pub mod feature;
pub mod job;
mod jsonmap;
#[cfg(test)]
mod mock;
pub mod model;
mod network;
pub mod plan;
pub mod power;
pub mod settings;
pub mod stage;
mod vendor;

mod dell;
pub mod standard;

pub use driver::{BatchReport, ExecutionMode, FailureRegistry, HostDriver, HostStatus};
pub use error::{ConvergeError, RedfishError};
pub use feature::{Feature, FeatureIntent, FeatureState, HostDescriptor};
pub use model::job::{Job, JobPhase, JobState, JobType};
pub use model::service_root::RedfishVendor;
pub use model::{BiosAttributes, ComputerSystem, PowerState, SystemPowerControl};
pub use network::{Endpoint, RedfishClientPool, RedfishClientPoolBuilder, REDFISH_ENDPOINT};
pub use plan::Stage;
pub use settings::{ConvergeSettings, PollSettings};
pub use stage::{StagePhase, StageRunner};

/// Interface to a BMC Redfish server, limited to what BIOS convergence needs. All async
/// calls will include one or more HTTP network calls.
#[async_trait::async_trait]
pub trait Redfish: Send + Sync + 'static {
    /// Vendor family, resolved once when the client was created.
    fn vendor(&self) -> RedfishVendor;

    /// Id of the (single) computer system behind this BMC, e.g. System.Embedded.1
    fn system_id(&self) -> &str;

    /// Returns info about computer system, including its power state.
    async fn get_system(&self) -> Result<ComputerSystem, RedfishError>;

    /// Is this thing even on?
    async fn get_power_state(&self) -> Result<PowerState, RedfishError>;

    /// Change power state: on, off, graceful shutdown, etc
    async fn power(&self, action: SystemPowerControl) -> Result<(), RedfishError>;

    /// Reads the current BIOS attributes and refreshes the cached copy.
    async fn bios_attributes(&self) -> Result<BiosAttributes, RedfishError>;

    /// Attributes from the last `bios_attributes` call, if there was one.
    fn cached_bios_attributes(&self) -> Option<BiosAttributes>;

    /// Push attributes to the pending settings resource. Nothing changes until
    /// `commit_bios_attributes`.
    async fn stage_bios_attributes(&self, stage: &Stage) -> Result<(), RedfishError>;

    /// Commit staged attributes. Creates a config job when there was something to apply.
    async fn commit_bios_attributes(&self) -> Result<CommitOutcome, RedfishError>;

    /// Get a job by id, with every field the BMC reports for it.
    async fn get_job(&self, id: &str) -> Result<Job, RedfishError>;

    /// Jobs of `job_type` currently in the Scheduled state.
    async fn list_scheduled_jobs(&self, job_type: JobType) -> Result<Vec<Job>, RedfishError>;

    /// GET `endpoint` (relative to /redfish/v1, the service root if None) and fail with the
    /// underlying error if that does not work.
    async fn ensure_reachable(&self, endpoint: Option<&str>) -> Result<(), RedfishError>;

    /// Same as `ensure_reachable` but only says yes or no.
    async fn check_reachable(&self, endpoint: Option<&str>) -> bool {
        self.ensure_reachable(endpoint).await.is_ok()
    }
}

/// Result of committing staged BIOS attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    /// Job created by the commit, if the BMC told us its id.
    pub job: Option<String>,
    /// The job only runs during the next boot.
    pub reboot_required: bool,
}

impl CommitOutcome {
    /// Nothing was staged, or everything staged was already in place.
    pub fn nothing_committed() -> Self {
        CommitOutcome::default()
    }
}

/// Opens a Redfish session to a host. `RedfishClientPool` is the real one.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, host: &HostDescriptor) -> Result<Box<dyn Redfish>, RedfishError>;
}
