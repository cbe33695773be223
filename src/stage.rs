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
//! Apply, reboot, poll and verify for one stage on one host.

use std::fmt;

use tracing::{debug, info};

use crate::job::wait_for_job;
use crate::model::job::JobType;
use crate::plan::Stage;
use crate::settings::ConvergeSettings;
use crate::{diff, power, CommitOutcome, ConvergeError, Redfish};

/// Where a stage is in its life. Errors carry the phase they happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePhase {
    Idle,
    Applying,
    JobCreated,
    RebootCycle,
    Polling,
    Verifying,
    Done,
    Failed,
}

impl fmt::Display for StagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StagePhase::Idle => "idle",
            StagePhase::Applying => "applying attributes",
            StagePhase::JobCreated => "committing attributes",
            StagePhase::RebootCycle => "power cycling",
            StagePhase::Polling => "polling the config job",
            StagePhase::Verifying => "verifying attributes",
            StagePhase::Done => "done",
            StagePhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Runs stages against one BMC. Stages must be run in order, each one assumes the
/// previous ones are committed.
pub struct StageRunner<'a> {
    redfish: &'a dyn Redfish,
    settings: &'a ConvergeSettings,
    write_only: &'static [&'static str],
}

impl<'a> StageRunner<'a> {
    pub fn new(redfish: &'a dyn Redfish, settings: &'a ConvergeSettings) -> Self {
        StageRunner {
            redfish,
            settings,
            write_only: redfish.vendor().write_only_attributes(),
        }
    }

    /// Run stage `index`. Any error is wrapped in `ConvergeError::Stage` with the phase it
    /// happened in; the host is left as it is.
    pub async fn run(&self, index: usize, stage: &Stage) -> Result<(), ConvergeError> {
        let mut phase = StagePhase::Idle;
        let result = self.run_phases(index, stage, &mut phase).await;
        result.map_err(|source| {
            debug!("Stage {index}: {phase} -> {}", StagePhase::Failed);
            ConvergeError::Stage {
                index,
                phase,
                source: Box::new(source),
            }
        })
    }

    async fn run_phases(
        &self,
        index: usize,
        stage: &Stage,
        phase: &mut StagePhase,
    ) -> Result<(), ConvergeError> {
        transition(index, phase, StagePhase::Applying);
        info!("Applying stage values: {stage}.");
        self.redfish.stage_bios_attributes(stage).await?;

        transition(index, phase, StagePhase::JobCreated);
        let outcome = self.redfish.commit_bios_attributes().await?;

        if outcome.reboot_required {
            transition(index, phase, StagePhase::RebootCycle);
            info!("Rebooting server.");
            power::power_cycle(self.redfish, &self.settings.power).await?;

            transition(index, phase, StagePhase::Polling);
            let job_id = self.scheduled_job(&outcome).await?;
            wait_for_job(self.redfish, &job_id, &self.settings.job).await?;
        } else if let Some(job_id) = &outcome.job {
            transition(index, phase, StagePhase::Polling);
            wait_for_job(self.redfish, job_id, &self.settings.job).await?;
        }

        transition(index, phase, StagePhase::Verifying);
        info!("Checking if stage correctly applied.");
        self.wait_for_bios_endpoint().await?;
        let live = self.redfish.bios_attributes().await?;
        let pending = diff::verify_stage(&live, stage, self.write_only);
        if !pending.is_empty() {
            return Err(ConvergeError::VerificationMismatch { pending });
        }
        info!("Stage successfully applied.");

        // The iDRAC answers the next PATCH of Bios/Settings with 503 "import or export
        // operation is currently in progress" if stages follow each other too quickly.
        tokio::time::sleep(self.settings.stage_cooldown).await;
        transition(index, phase, StagePhase::Done);
        Ok(())
    }

    // The first scheduled BIOS job, or the one the commit told us about.
    async fn scheduled_job(&self, outcome: &CommitOutcome) -> Result<String, ConvergeError> {
        let jobs = self
            .redfish
            .list_scheduled_jobs(JobType::BiosConfiguration)
            .await?;
        match (jobs.into_iter().next(), &outcome.job) {
            (Some(job), _) => Ok(job.id),
            (None, Some(id)) => {
                debug!("No scheduled job listed, using {id} from commit");
                Ok(id.clone())
            }
            (None, None) => Err(ConvergeError::NoScheduledJob {
                job_type: JobType::BiosConfiguration.to_string(),
            }),
        }
    }

    // Right after a config job the BIOS resource answers 500 for a while.
    async fn wait_for_bios_endpoint(&self) -> Result<(), ConvergeError> {
        let endpoint = format!("Systems/{}/Bios", self.redfish.system_id());
        info!("Waiting for endpoint to be available: {endpoint} ...");
        let poll = &self.settings.endpoint;
        for _ in 0..poll.attempts {
            if self.redfish.check_reachable(Some(&endpoint)).await {
                return Ok(());
            }
            tokio::time::sleep(poll.interval).await;
        }
        self.redfish
            .ensure_reachable(Some(&endpoint))
            .await
            .map_err(|source| ConvergeError::EndpointTimeout { endpoint, source })
    }
}

fn transition(index: usize, phase: &mut StagePhase, next: StagePhase) {
    debug!("Stage {index}: {phase} -> {next}");
    *phase = next;
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::mock::ScriptedBmc;
    use crate::plan::SGX_FACTORY_RESET;
    use crate::{BiosAttributes, SystemPowerControl};

    fn settings() -> ConvergeSettings {
        ConvergeSettings::builder()
            .power_poll(Duration::from_secs(2), 5)
            .job_poll(Duration::from_secs(12), 5)
            .endpoint_poll(Duration::from_secs(2), 3)
            .stage_cooldown(Duration::from_secs(15))
            .build()
    }

    fn bios() -> BiosAttributes {
        [
            ("IntelSgx", "Off"),
            (SGX_FACTORY_RESET, "Off"),
            ("TpmSecurity", "Off"),
        ]
        .into_iter()
        .collect()
    }

    fn stage(pairs: &[(&str, &str)]) -> Stage {
        pairs.iter().copied().collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_applies_and_verifies() {
        let bmc = ScriptedBmc::dell(bios()).script(|s| s.bios_unavailable = 2);
        let settings = settings();
        let runner = StageRunner::new(&bmc, &settings);
        let sgx = stage(&[("IntelSgx", "On"), (SGX_FACTORY_RESET, "On")]);
        runner.run(2, &sgx).await.unwrap();

        let s = bmc.state();
        assert!(s.bios.is_set_to("IntelSgx", "On"));
        assert!(s.bios.is_set_to(SGX_FACTORY_RESET, "Off"));
        assert_eq!(s.jobs_created, 1);
        assert_eq!(s.bios_unavailable, 0);
        assert_eq!(
            s.actions,
            vec![SystemPowerControl::GracefulShutdown, SystemPowerControl::On]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_stage_waits_for_cooldown() {
        let bmc = ScriptedBmc::dell(bios());
        let settings = settings();
        let runner = StageRunner::new(&bmc, &settings);
        runner.run(0, &stage(&[("TpmSecurity", "Off")])).await.unwrap();
        runner.run(1, &stage(&[("TpmSecurity", "On")])).await.unwrap();

        let s = bmc.state();
        assert_eq!(s.staged_at.len(), 2);
        assert!(s.staged_at[1] - s.staged_at[0] >= settings.stage_cooldown);
        assert!(s.bios.is_set_to("TpmSecurity", "On"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_to_commit_skips_reboot() {
        let bmc = ScriptedBmc::dell(bios());
        let settings = settings();
        let runner = StageRunner::new(&bmc, &settings);
        runner.run(0, &stage(&[("TpmSecurity", "Off")])).await.unwrap();
        assert!(bmc.state().actions.is_empty());
        assert_eq!(bmc.state().jobs_created, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attribute_that_does_not_stick_fails_verification() {
        let bmc = ScriptedBmc::dell(bios()).script(|s| s.stuck = vec!["TpmSecurity".to_string()]);
        let settings = settings();
        let runner = StageRunner::new(&bmc, &settings);
        let err = runner
            .run(0, &stage(&[("TpmSecurity", "On")]))
            .await
            .unwrap_err();
        match &err {
            ConvergeError::Stage {
                index,
                phase,
                source,
            } => {
                assert_eq!(*index, 0);
                assert_eq!(*phase, StagePhase::Verifying);
                match source.as_ref() {
                    ConvergeError::VerificationMismatch { pending } => {
                        assert_eq!(pending.get("TpmSecurity"), Some("On"))
                    }
                    e => panic!("unexpected error {e}"),
                }
            }
            e => panic!("unexpected error {e}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_stops_in_polling() {
        let bmc = ScriptedBmc::dell(bios()).script(|s| s.job_script = ["Running", "Failed"].into());
        let settings = settings();
        let runner = StageRunner::new(&bmc, &settings);
        let err = runner
            .run(1, &stage(&[("TpmSecurity", "On")]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConvergeError::Stage {
                index: 1,
                phase: StagePhase::Polling,
                ..
            }
        ));
        assert!(matches!(err.root_cause(), ConvergeError::JobFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_id_from_commit_when_none_listed() {
        let bmc = ScriptedBmc::dell(bios()).script(|s| s.hide_scheduled = true);
        let settings = settings();
        let runner = StageRunner::new(&bmc, &settings);
        runner.run(0, &stage(&[("TpmSecurity", "On")])).await.unwrap();
        assert!(bmc.state().job_polls > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_job_anywhere() {
        let bmc = ScriptedBmc::dell(bios()).script(|s| {
            s.hide_scheduled = true;
            s.report_location = false;
        });
        let settings = settings();
        let runner = StageRunner::new(&bmc, &settings);
        let err = runner
            .run(0, &stage(&[("TpmSecurity", "On")]))
            .await
            .unwrap_err();
        assert!(matches!(
            err.root_cause(),
            ConvergeError::NoScheduledJob { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bios_endpoint_never_returns() {
        let bmc = ScriptedBmc::dell(bios()).script(|s| s.bios_unavailable = 100);
        let settings = settings();
        let runner = StageRunner::new(&bmc, &settings);
        let err = runner
            .run(0, &stage(&[("TpmSecurity", "On")]))
            .await
            .unwrap_err();
        match err.root_cause() {
            ConvergeError::EndpointTimeout { endpoint, .. } => {
                assert_eq!(endpoint, "Systems/System.Embedded.1/Bios")
            }
            e => panic!("unexpected error {e}"),
        }
    }
}
