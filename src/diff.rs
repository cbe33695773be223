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
//! Filtering planned stages down to what the live BIOS does not already have.

use tracing::debug;

use crate::model::BiosAttributes;
use crate::plan::Stage;

/// Attributes of `stage` whose live value differs from the target, or that the BIOS does
/// not report at all.
pub fn unapplied(live: &BiosAttributes, stage: &Stage) -> Stage {
    stage
        .iter()
        .filter(|(name, target)| !live.is_set_to(name, target))
        .collect()
}

/// Per-stage differences between `planned` and `live`, in planned order.
///
/// Write-only attributes always read back as their idle value, so they always look
/// different. A write-only attribute is sent along with the other differences of its
/// stage, but a stage where nothing else differs is emptied. Empty stages are kept so
/// ordinals stay stable; callers skip them.
pub fn pending_stages(live: &BiosAttributes, planned: &[Stage], write_only: &[&str]) -> Vec<Stage> {
    planned
        .iter()
        .enumerate()
        .map(|(index, stage)| {
            let mut pending = unapplied(live, stage);
            if pending.keys().all(|name| write_only.contains(&name)) && !pending.is_empty() {
                debug!("Stage {index}: only write-only attributes differ ({pending}), skipping");
                pending = Stage::new();
            }
            pending
        })
        .collect()
}

/// What is still not applied after a stage ran. Write-only attributes are never checked.
pub fn verify_stage(live: &BiosAttributes, intended: &Stage, write_only: &[&str]) -> Stage {
    let mut pending = unapplied(live, intended);
    for name in write_only {
        pending.remove(name);
    }
    pending
}

/// True when no stage has anything left to apply.
pub fn is_converged(pending: &[Stage]) -> bool {
    pending.iter().all(Stage::is_empty)
}
