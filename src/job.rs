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
//! Waiting for a BIOS configuration job to reach a terminal state.

use tracing::{info, warn};

use crate::model::job::{Job, JobPhase, JobState};
use crate::settings::PollSettings;
use crate::{ConvergeError, Redfish};

/// Poll job `id` until it completes.
///
/// Returns the completed job. A failed job ends the wait at once with `JobFailed`; a job
/// still in progress after `poll.attempts` reads gives `JobTimeout` with the last read.
/// States we do not recognise are treated as in progress.
pub async fn wait_for_job(
    redfish: &dyn Redfish,
    id: &str,
    poll: &PollSettings,
) -> Result<Job, ConvergeError> {
    info!("Waiting for job {id} to finish ...");

    let attempts = poll.attempts.max(1);
    let mut prev_percentage = None;
    let mut attempt = 1;
    loop {
        let job = redfish.get_job(id).await?;

        if job.percent_complete.is_some() && job.percent_complete != prev_percentage {
            prev_percentage = job.percent_complete;
            info!(
                "Job {id} completion is {} percent.",
                job.percent_complete.unwrap_or_default()
            );
        }

        match job.job_state.phase() {
            JobPhase::Succeeded => {
                info!("Job {id} completed.");
                return Ok(job);
            }
            JobPhase::Failed => return Err(ConvergeError::JobFailed { job: Box::new(job) }),
            JobPhase::InProgress => {
                if let JobState::Unknown(state) = &job.job_state {
                    warn!("Job {id} is in unexpected state {state}, still waiting");
                }
            }
        }

        if attempt >= attempts {
            return Err(ConvergeError::JobTimeout {
                job: Box::new(job),
                attempts,
            });
        }
        attempt += 1;
        tokio::time::sleep(poll.interval).await;
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::*;
    use crate::mock::ScriptedBmc;
    use crate::BiosAttributes;

    const POLL: PollSettings = PollSettings::new(Duration::from_secs(12), 10);

    fn bmc(script: &[&'static str]) -> ScriptedBmc {
        let script = VecDeque::from(script.to_vec());
        ScriptedBmc::dell(BiosAttributes::default()).script(|s| s.job_script = script)
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_completes() {
        let bmc = bmc(&["New", "Scheduled", "Running", "Running", "Completed"]);
        let start = tokio::time::Instant::now();
        let job = wait_for_job(&bmc, "JID_1", &POLL).await.unwrap();
        assert_eq!(job.job_state, JobState::Completed);
        assert_eq!(job.percent_complete, Some(100));
        assert_eq!(bmc.state().job_polls, 5);
        assert!(start.elapsed() <= POLL.budget());
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_never_leaves_running() {
        let bmc = bmc(&["Running"]);
        let err = wait_for_job(&bmc, "JID_1", &POLL).await.unwrap_err();
        match err {
            ConvergeError::JobTimeout { job, attempts } => {
                assert_eq!(attempts, 10);
                assert_eq!(job.id, "JID_1");
                assert_eq!(job.job_state, JobState::Running);
                assert!(job.to_string().contains("JobState: Running"));
            }
            e => panic!("unexpected error {e}"),
        }
        assert_eq!(bmc.state().job_polls, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_does_not_wait() {
        let bmc = bmc(&["Failed"]);
        let start = tokio::time::Instant::now();
        let err = wait_for_job(&bmc, "JID_1", &POLL).await.unwrap_err();
        assert!(matches!(err, ConvergeError::JobFailed { .. }));
        assert_eq!(bmc.state().job_polls, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_state_keeps_polling() {
        let bmc = bmc(&["Paused", "Completed"]);
        wait_for_job(&bmc, "JID_1", &POLL).await.unwrap();
        assert_eq!(bmc.state().job_polls, 2);
    }
}
