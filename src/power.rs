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
//! Getting a host through a full power cycle: graceful shutdown, forced off if the OS
//! hangs on the way down, then power on.

use tracing::{error, info, warn};

use crate::settings::PollSettings;
use crate::{ConvergeError, PowerState, Redfish, SystemPowerControl};

/// Poll until the system reports `target`. A failed read is logged and counts as an
/// attempt, the BMC sometimes answers 500 while the host changes state. If the last read
/// failed the wait ends in `PowerStateUnreadable` carrying that error, otherwise in
/// `PowerTimeout` with the last state seen.
pub async fn wait_for_power_state(
    redfish: &dyn Redfish,
    target: PowerState,
    poll: &PollSettings,
) -> Result<(), ConvergeError> {
    let mut last_seen = PowerState::Unknown;
    let mut last_error = None;
    for _ in 0..poll.attempts {
        match redfish.get_power_state().await {
            Ok(state) if state == target => return Ok(()),
            Ok(state) => {
                last_seen = state;
                last_error = None;
            }
            Err(e) => {
                error!("Error while waiting for power state change: {e}");
                last_error = Some(e);
            }
        }
        tokio::time::sleep(poll.interval).await;
    }
    match last_error {
        Some(source) => Err(ConvergeError::PowerStateUnreadable { target, source }),
        None => Err(ConvergeError::PowerTimeout {
            target,
            last_seen,
            waited: poll.budget(),
        }),
    }
}

/// Graceful shutdown, escalating to a single ForceOff if the last read still showed the
/// host running once `poll` runs out. A host whose power state cannot be read is never forced off.
pub async fn shutdown(redfish: &dyn Redfish, poll: &PollSettings) -> Result<(), ConvergeError> {
    info!("Setting PowerState: GracefulShutdown");
    redfish.power(SystemPowerControl::GracefulShutdown).await?;

    info!("Waiting for PowerState: Off ...");
    match wait_for_power_state(redfish, PowerState::Off, poll).await {
        Ok(()) => {}
        Err(e) if still_running(&e) => {
            warn!("System did not gracefully shutdown within time limit ({e}). Trying with PowerState: ForceOff ...");
            redfish.power(SystemPowerControl::ForceOff).await?;

            info!("Waiting for PowerState: Off ...");
            wait_for_power_state(redfish, PowerState::Off, poll).await?;
        }
        Err(e) => return Err(e),
    }
    info!("System is PowerState: Off");
    Ok(())
}

// A timeout after a successful read that showed the host not yet Off.
fn still_running(e: &ConvergeError) -> bool {
    matches!(e, ConvergeError::PowerTimeout { last_seen, .. } if *last_seen != PowerState::Unknown)
}

/// Reboot so a scheduled config job runs. Ends with the host On.
pub async fn power_cycle(redfish: &dyn Redfish, poll: &PollSettings) -> Result<(), ConvergeError> {
    let power_state = redfish.get_power_state().await?;
    info!("Current PowerState is: {power_state}");

    if power_state == PowerState::On {
        shutdown(redfish, poll).await?;
    }

    info!("Setting PowerState: On");
    redfish.power(SystemPowerControl::On).await?;

    info!("Waiting for PowerState: On ...");
    wait_for_power_state(redfish, PowerState::On, poll).await?;
    info!("Rebooting completed.");
    Ok(())
}
