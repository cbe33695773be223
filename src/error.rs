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
use std::time::Duration;

use reqwest::StatusCode;

use crate::feature::Feature;
use crate::model::job::Job;
use crate::model::service_root::RedfishVendor;
use crate::model::system::PowerState;
use crate::plan::Stage;
use crate::stage::StagePhase;

/// Errors raised while talking to a single BMC.
#[derive(thiserror::Error, Debug)]
pub enum RedfishError {
    #[error("Network error talking to BMC at {url}. {source}")]
    NetworkError { url: String, source: reqwest::Error },

    #[error("HTTP {status_code} at {url}. Body: {body}")]
    HTTPErrorCode {
        url: String,
        status_code: StatusCode,
        body: String,
    },

    #[error("Could not deserialize response from {url}. Body: {body}. {source}")]
    JsonDeserializeError {
        url: String,
        body: String,
        source: serde_json::Error,
    },

    #[error("Could not serialize request body for {url}. Obj: {object_debug}. {source}")]
    JsonSerializeError {
        url: String,
        object_debug: String,
        source: serde_json::Error,
    },

    #[error("Remote returned empty body")]
    NoContent,

    #[error("Missing key {key} in JSON at {url}")]
    MissingKey { key: String, url: String },

    #[error("Key {key} should be {expected_type} at {url}")]
    InvalidKeyType {
        key: String,
        expected_type: String,
        url: String,
    },

    #[error("BMC does not support {0}")]
    NotSupported(String),

    #[error("Generic error: {error}")]
    GenericError { error: String },
}

/// Errors raised by the convergence engine. Each one ends the pipeline of the host it
/// happened on and is what the failure registry records for that host.
#[derive(thiserror::Error, Debug)]
pub enum ConvergeError {
    #[error("Redfish API at {address} is unreachable, ensure address and credentials are right. {source}")]
    Unreachable {
        address: String,
        source: RedfishError,
    },

    #[error("Job {} did not succeed.\n\t{job}", .job.id)]
    JobFailed { job: Box<Job> },

    #[error("Job {} did not succeed within {attempts} polls.\n\tJobState {}\n\t{job}", .job.id, .job.job_state)]
    JobTimeout { job: Box<Job>, attempts: u32 },

    #[error("Timed out after {waited:?} waiting for power state {target}, last seen {last_seen}")]
    PowerTimeout {
        target: PowerState,
        last_seen: PowerState,
        waited: Duration,
    },

    #[error("Could not read power state while waiting for {target}. {source}")]
    PowerStateUnreadable {
        target: PowerState,
        source: RedfishError,
    },

    #[error("Endpoint {endpoint} did not become available again. {source}")]
    EndpointTimeout {
        endpoint: String,
        source: RedfishError,
    },

    #[error("No scheduled {job_type} job found after power cycle")]
    NoScheduledJob { job_type: String },

    #[error("Failed to apply following bios settings: {pending}")]
    VerificationMismatch { pending: Stage },

    #[error("{feature} is not supported on {vendor} BMCs")]
    Unsupported {
        feature: Feature,
        vendor: RedfishVendor,
    },

    #[error("Stage {index} failed while {phase}. {source}")]
    Stage {
        index: usize,
        phase: StagePhase,
        source: Box<ConvergeError>,
    },

    #[error("Worker for host {address} panicked: {message}")]
    WorkerPanicked { address: String, message: String },

    #[error(transparent)]
    Redfish(#[from] RedfishError),
}

impl ConvergeError {
    /// The innermost error, skipping the stage context wrapper.
    pub fn root_cause(&self) -> &ConvergeError {
        match self {
            ConvergeError::Stage { source, .. } => source.root_cause(),
            e => e,
        }
    }
}
