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

/* BIOS feature convergence client
 *
 * USAGE: ./biosconverge -H 10.153.145.103 -U TheBMCUsername -P TheBMCPassword --sgx on --tpm on
 *        ./biosconverge -i inventory.json
 * -H: IP address of the BMC's Redfish API. Should be HTTPS on port 443.
 * -i: JSON file with {"settings": {...}, "hosts": [{"address", "username", "password", "features"}]}
 * Run with no params for help.
 * Run with `-v` for more output.
 */

use std::path::Path;

use anyhow::{anyhow, Context};
use biosconverge::{
    ConvergeSettings, ExecutionMode, Feature, FeatureIntent, FeatureState, HostDescriptor,
    HostDriver, RedfishClientPool,
};
use serde::Deserialize;
use tracing::{error, info};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt::Layer;
use tracing_subscriber::prelude::*;

#[derive(Deserialize)]
struct Inventory {
    #[serde(default)]
    settings: ConvergeSettings,
    hosts: Vec<HostDescriptor>,
}

fn read_inventory(path: &Path) -> Result<Inventory, anyhow::Error> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading inventory {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing inventory {}", path.display()))
}

fn feature_flag(args: &getopts::Matches, flag: &str) -> Result<FeatureState, anyhow::Error> {
    match args.opt_str(flag) {
        None => Ok(FeatureState::Unset),
        Some(v) => FeatureState::parse(&v).ok_or_else(|| anyhow!("--{flag} expects on or off, got {v}")),
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args: Vec<String> = std::env::args().collect();
    let mut opts = getopts::Options::new();

    opts.optflag("h", "help", "Print this help");
    opts.optflag("v", "verbose", "Log at DEBUG level. Default is INFO");
    opts.optopt(
        "H",
        "hostname",
        "Hostname or IP address of BMC Redfish API. Required unless -i is given",
        "HOST",
    );
    opts.optopt("", "port", "BMC HTTPS port, default 443", "PORT");
    opts.optopt("U", "username", "BMC username", "USER");
    opts.optopt("P", "password", "BMC password", "PASS");
    opts.optopt("i", "inventory", "JSON file with hosts and their features", "FILE");
    opts.optopt("", "tpm", "Turn TPM on or off", "on|off");
    opts.optopt("", "sb", "Turn Secure Boot on or off", "on|off");
    opts.optopt("", "sgx", "Turn SGX on or off", "on|off");
    opts.optopt("", "proxy", "Send BMC traffic through this proxy", "URL");
    opts.optflag("", "sequential", "Configure hosts one after the other");
    opts.optflag(
        "",
        "status",
        "Only show current feature state and the stages each host still needs, change nothing",
    );

    let args_given = opts.parse(&args[1..])?;
    if args_given.opt_present("h") || !(args_given.opt_present("H") || args_given.opt_present("i")) {
        eprintln!(
            "{}",
            opts.usage("biosconverge -H bmc_ip -U bmc_user -P bmc_pass [--tpm on] [--sb off] [--sgx on]\n       biosconverge -i inventory.json")
        );
        return Ok(());
    }

    let log_level = if args_given.opt_present("v") {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let env_filter = EnvFilter::from_default_env()
        .add_directive(log_level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("rustls=warn".parse()?);
    tracing_subscriber::registry()
        .with(Layer::default().compact())
        .with(env_filter)
        .init();

    let (settings, hosts) = match args_given.opt_str("i") {
        Some(path) => {
            let inventory = read_inventory(Path::new(&path))?;
            (inventory.settings, inventory.hosts)
        }
        None => {
            let address = args_given
                .opt_str("H")
                .ok_or_else(|| anyhow!("-H is required"))?;
            let features: FeatureIntent = [
                (Feature::Tpm, feature_flag(&args_given, "tpm")?),
                (Feature::SecureBoot, feature_flag(&args_given, "sb")?),
                (Feature::Sgx, feature_flag(&args_given, "sgx")?),
            ]
            .into_iter()
            .collect();
            let mut host = HostDescriptor::new(
                address,
                args_given.opt_str("U").unwrap_or_default(),
                args_given.opt_str("P").unwrap_or_default(),
                features,
            );
            host.port = args_given
                .opt_str("port")
                .map(|p| p.parse::<u16>())
                .transpose()
                .context("--port")?;
            (ConvergeSettings::default(), vec![host])
        }
    };

    let mut pool = RedfishClientPool::builder();
    if let Some(proxy) = args_given.opt_str("proxy") {
        pool = pool.proxy(proxy);
    }
    let driver = HostDriver::new(pool.build()?, settings);

    if args_given.opt_present("status") {
        let mut failed = false;
        for host in &hosts {
            match driver.status(host).await {
                Ok(status) => {
                    for (feature, value) in &status.current {
                        info!(
                            "{}: {feature} is {}",
                            host.address,
                            value.as_deref().unwrap_or("not reported")
                        );
                    }
                    if status.is_converged() {
                        info!("{}: configured", host.address);
                    }
                    for (index, stage) in status.pending.iter().enumerate().filter(|(_, s)| !s.is_empty()) {
                        info!("{}: stage {index} pending {stage}", host.address);
                    }
                }
                Err(e) => {
                    error!("{}: {e}", host.address);
                    failed = true;
                }
            }
        }
        if failed {
            std::process::exit(1);
        }
        return Ok(());
    }

    let mode = if args_given.opt_present("sequential") {
        ExecutionMode::Sequential
    } else {
        ExecutionMode::Concurrent
    };
    let report = driver.converge(hosts, mode).await;
    for address in &report.converged {
        info!("{address}: configured");
    }
    for (address, e) in report.failures.iter() {
        error!("{address}: {e}");
    }
    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
