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

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

pub const POWER_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const POWER_POLL_ATTEMPTS: u32 = 60;

pub const JOB_POLL_INTERVAL: Duration = Duration::from_secs(12);
pub const JOB_POLL_ATTEMPTS: u32 = 1800;

// Right after a config job the iDRAC answers /Bios with 500 "data sources are unavailable"
// for a while.
pub const ENDPOINT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const ENDPOINT_POLL_ATTEMPTS: u32 = 20;

// PATCH Bios/Settings fails with 503 "import or export operation is currently in progress"
// when stages follow each other too quickly. Which import/export that is, and how to query
// it, is unknown, so we wait a fixed time.
pub const STAGE_COOLDOWN: Duration = Duration::from_secs(15);

/// A bounded poll: check, and if not done yet sleep `interval`, at most `attempts` times.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde_as(as = "DurationSeconds<u64>")]
    pub interval: Duration,
    pub attempts: u32,
}

impl PollSettings {
    pub const fn new(interval: Duration, attempts: u32) -> Self {
        PollSettings { interval, attempts }
    }

    /// Upper bound of time spent sleeping in one poll. Saturates instead of overflowing.
    pub fn budget(&self) -> Duration {
        self.interval
            .checked_mul(self.attempts)
            .unwrap_or(Duration::MAX)
    }
}

/// Every wait the engine does. Defaults are the values above.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergeSettings {
    /// Each power transition phase (graceful off, forced off, on) gets this bound.
    pub power: PollSettings,
    pub job: PollSettings,
    /// Waiting for the BIOS resource to answer again after a job.
    pub endpoint: PollSettings,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub stage_cooldown: Duration,
}

impl Default for ConvergeSettings {
    fn default() -> Self {
        ConvergeSettings {
            power: PollSettings::new(POWER_POLL_INTERVAL, POWER_POLL_ATTEMPTS),
            job: PollSettings::new(JOB_POLL_INTERVAL, JOB_POLL_ATTEMPTS),
            endpoint: PollSettings::new(ENDPOINT_POLL_INTERVAL, ENDPOINT_POLL_ATTEMPTS),
            stage_cooldown: STAGE_COOLDOWN,
        }
    }
}

impl ConvergeSettings {
    pub fn builder() -> ConvergeSettingsBuilder {
        ConvergeSettingsBuilder {
            settings: ConvergeSettings::default(),
        }
    }
}

#[derive(Debug)]
pub struct ConvergeSettingsBuilder {
    settings: ConvergeSettings,
}

impl ConvergeSettingsBuilder {
    pub fn power_poll(mut self, interval: Duration, attempts: u32) -> ConvergeSettingsBuilder {
        self.settings.power = PollSettings::new(interval, attempts);
        self
    }

    pub fn job_poll(mut self, interval: Duration, attempts: u32) -> ConvergeSettingsBuilder {
        self.settings.job = PollSettings::new(interval, attempts);
        self
    }

    pub fn endpoint_poll(mut self, interval: Duration, attempts: u32) -> ConvergeSettingsBuilder {
        self.settings.endpoint = PollSettings::new(interval, attempts);
        self
    }

    pub fn stage_cooldown(mut self, cooldown: Duration) -> ConvergeSettingsBuilder {
        self.settings.stage_cooldown = cooldown;
        self
    }

    pub fn build(self) -> ConvergeSettings {
        self.settings
    }
}
