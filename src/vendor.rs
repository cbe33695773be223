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
//! What each BMC family can do, decided once when the host session is created.

use crate::feature::Feature;
use crate::model::service_root::RedfishVendor;
use crate::plan::SGX_FACTORY_RESET;

const DELL_WRITE_ONLY: &[&str] = &[SGX_FACTORY_RESET];

impl RedfishVendor {
    /// Can this BMC family stage and commit the BIOS attributes for `feature`?
    /// Only iDRAC exposes the pending-settings plus config-job flow we drive.
    pub fn supports(&self, feature: Feature) -> bool {
        match self {
            RedfishVendor::Dell => matches!(feature, Feature::Tpm | Feature::SecureBoot | Feature::Sgx),
            RedfishVendor::Supermicro
            | RedfishVendor::Lenovo
            | RedfishVendor::Hpe
            | RedfishVendor::Unknown => false,
        }
    }

    /// Attributes that are settable but never read back as written (reset triggers).
    /// They are exempt from verification and only sent along with real changes.
    pub fn write_only_attributes(&self) -> &'static [&'static str] {
        match self {
            RedfishVendor::Dell => DELL_WRITE_ONLY,
            _ => &[],
        }
    }
}
