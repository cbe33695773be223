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
use std::fmt;

use crate::{jsonmap, RedfishError};

/// Lifecycle state of a configuration job, as reported in `JobState`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    New,
    Scheduling,
    Scheduled,
    ReadyForExecution,
    Waiting,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
    RebootFailed,
    Unknown(String),
}

/// Which way a job is heading, as far as a poller is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    InProgress,
    Failed,
    Succeeded,
}

impl From<&str> for JobState {
    fn from(s: &str) -> JobState {
        match s {
            "New" => JobState::New,
            "Scheduling" => JobState::Scheduling,
            "Scheduled" => JobState::Scheduled,
            "ReadyForExecution" => JobState::ReadyForExecution,
            "Waiting" => JobState::Waiting,
            "Running" => JobState::Running,
            "Completed" => JobState::Completed,
            "CompletedWithErrors" => JobState::CompletedWithErrors,
            "Failed" => JobState::Failed,
            "RebootFailed" => JobState::RebootFailed,
            other => JobState::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Unknown(s) => write!(f, "{s}"),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

impl JobState {
    /// Unrecognised states are treated as still in progress so the poll bound decides.
    pub fn phase(&self) -> JobPhase {
        use JobState::*;
        match self {
            New | Scheduling | Scheduled | ReadyForExecution | Waiting | Running | Unknown(_) => {
                JobPhase::InProgress
            }
            Failed | CompletedWithErrors | RebootFailed => JobPhase::Failed,
            Completed => JobPhase::Succeeded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    BiosConfiguration,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::BiosConfiguration => "BIOSConfiguration",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An asynchronous job on the BMC. Every field of the payload is kept in `fields` so
/// failures can report the complete job.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub job_state: JobState,
    pub job_type: Option<String>,
    pub percent_complete: Option<i64>,
    pub message: Option<String>,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Job {
    pub fn from_json(
        fields: serde_json::Map<String, serde_json::Value>,
        url: &str,
    ) -> Result<Job, RedfishError> {
        let id = jsonmap::get_str(&fields, "Id", url)?.to_string();
        let job_state = JobState::from(jsonmap::get_str(&fields, "JobState", url)?);
        let job_type = fields
            .get("JobType")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let percent_complete = fields.get("PercentComplete").and_then(|v| v.as_i64());
        let message = fields
            .get("Message")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Ok(Job {
            id,
            job_state,
            job_type,
            percent_complete,
            message,
            fields,
        })
    }

    pub fn is_of_type(&self, job_type: JobType) -> bool {
        self.job_type.as_deref() == Some(job_type.as_str())
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job details:")?;
        for (k, v) in &self.fields {
            match v {
                serde_json::Value::String(s) => write!(f, "\n\t{k}: {s}")?,
                other => write!(f, "\n\t{k}: {other}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::{Job, JobPhase, JobState, JobType};

    fn dell_job(state: &str) -> serde_json::Map<String, serde_json::Value> {
        json!({
            "@odata.id": "/redfish/v1/Managers/iDRAC.Embedded.1/Jobs/JID_878659984891",
            "@odata.type": "#DellJob.v1_4_0.DellJob",
            "ActualRunningStartTime": null,
            "CompletionTime": null,
            "Description": "Job Instance",
            "EndTime": "TIME_NA",
            "Id": "JID_878659984891",
            "JobState": state,
            "JobType": "BIOSConfiguration",
            "Message": "Task successfully scheduled.",
            "MessageId": "JCP001",
            "Name": "Configure: BIOS.Setup.1-1",
            "PercentComplete": 0,
            "StartTime": "TIME_NOW"
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn test_job_parser() {
        let job = Job::from_json(dell_job("Scheduled"), "Managers/iDRAC.Embedded.1/Jobs").unwrap();
        assert_eq!(job.id, "JID_878659984891");
        assert_eq!(job.job_state, JobState::Scheduled);
        assert_eq!(job.percent_complete, Some(0));
        assert!(job.is_of_type(JobType::BiosConfiguration));
    }

    #[test]
    fn test_job_display_has_every_field() {
        let job = Job::from_json(dell_job("Failed"), "url").unwrap();
        let s = job.to_string();
        assert!(s.contains("JobState: Failed"));
        assert!(s.contains("MessageId: JCP001"));
        assert!(s.contains("CompletionTime: null"));
    }

    #[test]
    fn test_job_missing_state() {
        let mut fields = dell_job("Running");
        fields.remove("JobState");
        assert!(matches!(
            Job::from_json(fields, "url"),
            Err(crate::RedfishError::MissingKey { .. })
        ));
    }

    #[test]
    fn test_job_phases() {
        for s in [
            "Scheduled",
            "Running",
            "New",
            "Scheduling",
            "ReadyForExecution",
            "Waiting",
        ] {
            assert_eq!(JobState::from(s).phase(), JobPhase::InProgress, "{s}");
        }
        for s in ["Failed", "CompletedWithErrors", "RebootFailed"] {
            assert_eq!(JobState::from(s).phase(), JobPhase::Failed, "{s}");
        }
        assert_eq!(JobState::from("Completed").phase(), JobPhase::Succeeded);
        assert_eq!(JobState::from("Paused").to_string(), "Paused");
    }
}
