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
//! Running the per-host pipeline over a batch of hosts.
//!
//! Each host gets its own task, and hosts never wait for each other. A host's error ends
//! that host's pipeline only; the error lands in the batch's [`FailureRegistry`] under the
//! host address. The registry is filled by the collecting task alone, workers hand their
//! result back when they finish.

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::feature::{Feature, HostDescriptor};
use crate::plan::{plan_stages, status_attribute, Stage};
use crate::settings::ConvergeSettings;
use crate::stage::StageRunner;
use crate::{diff, Connector, ConvergeError, Redfish};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// One task per host, all started at once.
    #[default]
    Concurrent,
    /// One host after the other. A failing host does not stop the rest.
    Sequential,
}

/// Host address to the error that stopped it. Write-once per address.
#[derive(Debug, Default)]
pub struct FailureRegistry(BTreeMap<String, ConvergeError>);

impl FailureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `error` for `address`. An address that already failed keeps its first error,
    /// returns false in that case.
    pub fn record(&mut self, address: impl Into<String>, error: ConvergeError) -> bool {
        match self.0.entry(address.into()) {
            btree_map::Entry::Vacant(e) => {
                e.insert(error);
                true
            }
            btree_map::Entry::Occupied(e) => {
                warn!("Host {} already failed, dropping second error: {error}", e.key());
                false
            }
        }
    }

    pub fn get(&self, address: &str) -> Option<&ConvergeError> {
        self.0.get(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.0.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConvergeError)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Outcome of a batch. A host is either in `converged` or in `failures`.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub converged: Vec<String>,
    pub failures: FailureRegistry,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn add(&mut self, address: String, result: Result<(), ConvergeError>) {
        match result {
            Ok(()) => self.converged.push(address),
            Err(e) => {
                error!("Host {address} failed: {e}");
                self.failures.record(address, e);
            }
        }
    }
}

pub struct HostDriver<C: Connector> {
    connector: Arc<C>,
    settings: Arc<ConvergeSettings>,
}

impl<C: Connector> HostDriver<C> {
    pub fn new(connector: C, settings: ConvergeSettings) -> Self {
        HostDriver {
            connector: Arc::new(connector),
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &ConvergeSettings {
        &self.settings
    }

    /// Converge every host. Returns once every host has finished, successfully or not.
    /// An address listed more than once runs only with its first descriptor.
    pub async fn converge(&self, hosts: Vec<HostDescriptor>, mode: ExecutionMode) -> BatchReport {
        let hosts = unique_hosts(hosts);
        let mut report = BatchReport::default();
        match mode {
            ExecutionMode::Sequential => {
                for host in hosts {
                    let result = converge_host(self.connector.as_ref(), &self.settings, &host)
                        .instrument(host_span(&host))
                        .await;
                    report.add(host.address, result);
                }
            }
            ExecutionMode::Concurrent => {
                let workers: Vec<(String, JoinHandle<Result<(), ConvergeError>>)> = hosts
                    .into_iter()
                    .map(|host| {
                        let connector = Arc::clone(&self.connector);
                        let settings = Arc::clone(&self.settings);
                        let address = host.address.clone();
                        let span = host_span(&host);
                        let handle = tokio::spawn(
                            async move {
                                converge_host(connector.as_ref(), &settings, &host).await
                            }
                            .instrument(span),
                        );
                        (address, handle)
                    })
                    .collect();
                for (address, handle) in workers {
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(e) => Err(ConvergeError::WorkerPanicked {
                            address: address.clone(),
                            message: e.to_string(),
                        }),
                    };
                    report.add(address, result);
                }
            }
        }
        info!(
            "{} hosts converged, {} failed",
            report.converged.len(),
            report.failures.len()
        );
        report
    }

    /// Current feature attributes of `host` and what converging it would still apply, per
    /// stage. Nothing is changed on the host.
    pub async fn status(&self, host: &HostDescriptor) -> Result<HostStatus, ConvergeError> {
        host_status(self.connector.as_ref(), host)
            .instrument(host_span(host))
            .await
    }
}

/// Read-only view of one host, see [`HostDriver::status`].
#[derive(Debug, Clone, Default)]
pub struct HostStatus {
    /// Value of each feature's BIOS attribute, None if the BIOS does not report it.
    pub current: BTreeMap<Feature, Option<String>>,
    /// Per-stage attributes still to apply. Empty stages are already in place.
    pub pending: Vec<Stage>,
}

impl HostStatus {
    pub fn is_converged(&self) -> bool {
        diff::is_converged(&self.pending)
    }
}

// Two pipelines on one BMC would fight over its job queue.
fn unique_hosts(hosts: Vec<HostDescriptor>) -> Vec<HostDescriptor> {
    let mut seen = BTreeSet::new();
    hosts
        .into_iter()
        .filter(|host| {
            let first = seen.insert(host.address.clone());
            if !first {
                warn!("Host {} listed more than once, ignoring the repeat", host.address);
            }
            first
        })
        .collect()
}

fn host_span(host: &HostDescriptor) -> tracing::Span {
    info_span!("host", address = %host.address)
}

async fn connect<C: Connector>(
    connector: &C,
    host: &HostDescriptor,
) -> Result<Box<dyn Redfish>, ConvergeError> {
    let unreachable = |source| ConvergeError::Unreachable {
        address: host.address.clone(),
        source,
    };
    let redfish = connector.connect(host).await.map_err(unreachable)?;
    redfish.ensure_reachable(None).await.map_err(unreachable)?;
    Ok(redfish)
}

// Plan and diff against the live BIOS.
async fn pending_for_host(
    redfish: &dyn Redfish,
    host: &HostDescriptor,
) -> Result<Vec<Stage>, ConvergeError> {
    let vendor = redfish.vendor();
    for (feature, state) in host.features.requested() {
        if feature == Feature::AutoMount {
            warn!("{feature} {state} requested, virtual media mounting is not handled here, ignoring");
            continue;
        }
        if !vendor.supports(feature) {
            return Err(ConvergeError::Unsupported { feature, vendor });
        }
    }

    let planned = plan_stages(&host.features);
    if planned.is_empty() {
        return Ok(planned);
    }
    let live = redfish.bios_attributes().await?;
    Ok(diff::pending_stages(
        &live,
        &planned,
        vendor.write_only_attributes(),
    ))
}

async fn host_status<C: Connector>(
    connector: &C,
    host: &HostDescriptor,
) -> Result<HostStatus, ConvergeError> {
    let redfish = connect(connector, host).await?;
    let pending = pending_for_host(redfish.as_ref(), host).await?;
    let live = match redfish.cached_bios_attributes() {
        Some(attrs) => attrs,
        None => redfish.bios_attributes().await?,
    };
    let current = [Feature::Tpm, Feature::SecureBoot, Feature::Sgx]
        .into_iter()
        .filter_map(|f| status_attribute(f).map(|attr| (f, live.value_string(attr))))
        .collect();
    Ok(HostStatus { current, pending })
}

async fn converge_host<C: Connector>(
    connector: &C,
    settings: &ConvergeSettings,
    host: &HostDescriptor,
) -> Result<(), ConvergeError> {
    info!("Starting bios configuration for host with address: {}.", host.address);
    let redfish = connect(connector, host).await?;
    let pending = pending_for_host(redfish.as_ref(), host).await?;
    if diff::is_converged(&pending) {
        info!("Nothing to apply, host already configured.");
        return Ok(());
    }

    let runner = StageRunner::new(redfish.as_ref(), settings);
    for (index, stage) in pending.iter().enumerate() {
        if stage.is_empty() {
            continue;
        }
        runner.run(index, stage).await?;
    }
    info!("Host successfully configured.");
    Ok(())
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::mock::{ScriptedBmc, ScriptedFleet};
    use crate::plan::SGX_FACTORY_RESET;
    use crate::{BiosAttributes, FeatureIntent, FeatureState, RedfishVendor};

    fn settings() -> ConvergeSettings {
        ConvergeSettings::builder()
            .power_poll(Duration::from_secs(2), 5)
            .job_poll(Duration::from_secs(12), 5)
            .endpoint_poll(Duration::from_secs(2), 3)
            .stage_cooldown(Duration::from_secs(15))
            .build()
    }

    fn tpm_off_bios() -> BiosAttributes {
        [("TpmSecurity", "Off"), ("IntelSgx", "Off")]
            .into_iter()
            .collect()
    }

    fn host(address: &str, features: FeatureIntent) -> HostDescriptor {
        HostDescriptor::new(address, "root", "calvin", features)
    }

    fn tpm_on() -> FeatureIntent {
        FeatureIntent::new().with(Feature::Tpm, FeatureState::Enabled)
    }

    #[test]
    fn test_registry_keeps_first_error() {
        let mut registry = FailureRegistry::new();
        assert!(registry.record(
            "10.0.0.1",
            ConvergeError::NoScheduledJob {
                job_type: "BIOSConfiguration".to_string()
            }
        ));
        assert!(!registry.record(
            "10.0.0.1",
            ConvergeError::WorkerPanicked {
                address: "10.0.0.1".to_string(),
                message: "boom".to_string()
            }
        ));
        assert_eq!(registry.len(), 1);
        assert!(matches!(
            registry.get("10.0.0.1"),
            Some(ConvergeError::NoScheduledJob { .. })
        ));
    }

    async fn failing_host_k(mode: ExecutionMode) {
        let mut fleet = ScriptedFleet::default();
        let mut hosts = Vec::new();
        for i in 0..5 {
            let address = format!("10.0.0.{i}");
            let mut bmc = ScriptedBmc::dell(tpm_off_bios());
            if i == 1 || i == 3 {
                bmc = bmc.script(|s| s.job_script = ["Running", "Failed"].into());
            }
            fleet.add(&address, bmc);
            hosts.push(host(&address, tpm_on()));
        }
        let fleet_view = fleet.hosts.clone();
        let driver = HostDriver::new(fleet, settings());
        let report = driver.converge(hosts, mode).await;

        assert_eq!(report.failures.len(), 2);
        for i in [1, 3] {
            let e = report.failures.get(&format!("10.0.0.{i}")).unwrap();
            assert!(matches!(e.root_cause(), ConvergeError::JobFailed { .. }));
        }
        let mut converged = report.converged.clone();
        converged.sort();
        assert_eq!(converged, vec!["10.0.0.0", "10.0.0.2", "10.0.0.4"]);
        for address in &converged {
            assert!(!report.failures.contains(address));
            assert!(fleet_view[address].state().bios.is_set_to("TpmSecurity", "On"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_hosts_concurrent() {
        failing_host_k(ExecutionMode::Concurrent).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_hosts_sequential() {
        failing_host_k(ExecutionMode::Sequential).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_address_runs_once() {
        let mut fleet = ScriptedFleet::default();
        let bmc = ScriptedBmc::dell(tpm_off_bios());
        fleet.add("10.0.0.1", bmc.clone());
        let driver = HostDriver::new(fleet, settings());
        let sgx = FeatureIntent::new().with(Feature::Sgx, FeatureState::Enabled);
        let report = driver
            .converge(
                vec![host("10.0.0.1", tpm_on()), host("10.0.0.1", sgx)],
                ExecutionMode::Concurrent,
            )
            .await;
        assert_eq!(report.converged, vec!["10.0.0.1"]);
        assert!(report.failures.is_empty());
        assert_eq!(bmc.state().jobs_created, 1);
        assert!(bmc.state().bios.is_set_to("TpmSecurity", "On"));
        assert!(bmc.state().bios.is_set_to("IntelSgx", "Off"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_host() {
        let mut fleet = ScriptedFleet::default();
        fleet.add(
            "10.0.0.1",
            ScriptedBmc::dell(tpm_off_bios()).script(|s| s.unreachable = true),
        );
        let driver = HostDriver::new(fleet, settings());
        let report = driver
            .converge(
                vec![host("10.0.0.1", tpm_on()), host("10.0.0.2", tpm_on())],
                ExecutionMode::Concurrent,
            )
            .await;
        assert!(report.converged.is_empty());
        assert!(matches!(
            report.failures.get("10.0.0.1"),
            Some(ConvergeError::Unreachable { .. })
        ));
        // not in the fleet, connect fails
        assert!(matches!(
            report.failures.get("10.0.0.2"),
            Some(ConvergeError::Unreachable { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_vendor() {
        let mut fleet = ScriptedFleet::default();
        fleet.add(
            "10.0.0.1",
            ScriptedBmc::dell(tpm_off_bios()).with_vendor(RedfishVendor::Supermicro),
        );
        let driver = HostDriver::new(fleet, settings());
        let report = driver
            .converge(vec![host("10.0.0.1", tpm_on())], ExecutionMode::Sequential)
            .await;
        assert!(matches!(
            report.failures.get("10.0.0.1"),
            Some(ConvergeError::Unsupported {
                feature: Feature::Tpm,
                vendor: RedfishVendor::Supermicro
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_converged_host_is_left_alone() {
        let mut fleet = ScriptedFleet::default();
        let bmc = ScriptedBmc::dell(tpm_off_bios());
        fleet.add("10.0.0.1", bmc.clone());
        let driver = HostDriver::new(fleet, settings());
        let off = FeatureIntent::new()
            .with(Feature::Tpm, FeatureState::Disabled)
            .with(Feature::AutoMount, FeatureState::Enabled);
        let report = driver
            .converge(vec![host("10.0.0.1", off)], ExecutionMode::Concurrent)
            .await;
        assert!(report.is_success());
        assert!(bmc.state().staged_history.is_empty());
        assert!(bmc.state().actions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_changes_nothing() {
        let mut fleet = ScriptedFleet::default();
        let bios: BiosAttributes = [
            ("MemOpMode", "OptimizerMode"),
            ("NodeInterleave", "Disabled"),
            ("MemoryEncryption", "SingleKey"),
            ("IntelSgx", "Off"),
            (SGX_FACTORY_RESET, "Off"),
            ("PrmrrSize", "64G"),
        ]
        .into_iter()
        .collect();
        let bmc = ScriptedBmc::dell(bios);
        fleet.add("10.0.0.1", bmc.clone());
        let driver = HostDriver::new(fleet, settings());
        let sgx = FeatureIntent::new().with(Feature::Sgx, FeatureState::Enabled);
        let status = driver.status(&host("10.0.0.1", sgx)).await.unwrap();
        assert!(!status.is_converged());
        assert_eq!(status.current[&Feature::Sgx].as_deref(), Some("Off"));
        assert_eq!(status.current[&Feature::Tpm], None);
        let pending = status.pending;
        assert_eq!(pending.len(), 4);
        assert!(pending[0].is_empty() && pending[1].is_empty() && pending[3].is_empty());
        assert_eq!(pending[2].get("IntelSgx"), Some("On"));
        assert!(bmc.state().staged_history.is_empty());
    }
}
