//! UniFi Harness CLI.
//!
//! This is the entry point for the `unifi-harness` binary. It waits for a
//! controller to come up, evaluates version gates offline, and previews VLAN
//! allocations.

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ipnet::Ipv4Net;
use tokio_util::sync::CancellationToken;
use unifi_harness_core::{default_network_name, parse_version, Feature, ParseMode, VersionGate};
use unifi_harness_env::{
    ControllerProbe, HarnessConfig, PollProgress, ReadinessPoller, VlanAllocation, VlanAllocator,
    VlanAllocatorConfig, DEFAULT_BASE,
};

/// UniFi Harness - controller test environment driver.
#[derive(Parser, Debug)]
#[command(name = "unifi-harness")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Wait for the controller to become ready, then check its version.
    Wait {
        /// Controller API URL.
        #[arg(long, env = "UNIFI_API")]
        api: Option<String>,

        /// Readiness deadline in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Seconds between probes.
        #[arg(long)]
        interval: Option<u64>,

        /// Print `export` lines for the test process once ready.
        #[arg(long, default_value = "false")]
        print_env: bool,
    },

    /// Evaluate the version gates against a version string.
    CheckVersion {
        /// Version string as reported by a controller.
        raw: String,
    },

    /// Allocate VLANs from several threads and print them.
    Vlans {
        /// Number of VLANs to allocate.
        #[arg(long, default_value_t = 4)]
        count: usize,

        /// Network the subnets are carved from.
        #[arg(long, default_value_t = DEFAULT_BASE)]
        base: Ipv4Net,

        /// First VLAN ID.
        #[arg(long, default_value_t = 2)]
        min: u16,

        /// One past the last VLAN ID.
        #[arg(long, default_value_t = 4095)]
        max: u16,

        /// Threads allocating concurrently.
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,unifi_harness=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Wait {
            api,
            timeout,
            interval,
            print_env,
        } => {
            let mut config = HarnessConfig::from_env();
            if let Some(api) = api {
                config.api_url = api.trim_end_matches('/').to_string();
            }
            if let Some(secs) = timeout {
                config.readiness.deadline = Duration::from_secs(secs);
            }
            if let Some(secs) = interval {
                config.readiness.interval = Duration::from_secs(secs);
            }
            wait(&config, print_env).await
        }
        Command::CheckVersion { raw } => check_version(&raw),
        Command::Vlans {
            count,
            base,
            min,
            max,
            workers,
        } => vlans(
            VlanAllocatorConfig {
                base,
                vlan_min: min,
                vlan_max: max,
            },
            count,
            workers,
        ),
    }
}

async fn wait(config: &HarnessConfig, print_env: bool) -> anyhow::Result<()> {
    tracing::info!(api = %config.api_url, "Waiting for UniFi controller");

    let probe = ControllerProbe::new(config).context("failed to build controller client")?;
    let cancel = CancellationToken::new();
    let poller = ReadinessPoller::new(config.readiness)?.with_cancellation(cancel.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping at the next probe");
            cancel.cancel();
        }
    });

    let report = poller
        .poll_until_ready_with(&probe, log_progress)
        .await
        .context("controller did not become ready")?;

    let version = report.version.as_deref().unwrap_or_default();
    VersionGate::compiled().check_minimum(version)?;

    println!(
        "controller ready after {:.1}s ({} probes), version {}",
        report.elapsed.as_secs_f64(),
        report.ticks,
        if version.is_empty() { "unknown" } else { version }
    );
    print_features(version);

    if print_env {
        for (key, value) in config.env_pairs() {
            println!("export {key}={value:?}");
        }
    }
    Ok(())
}

fn log_progress(progress: &PollProgress) {
    tracing::debug!(
        tick = progress.tick,
        state = ?progress.state,
        remaining_secs = progress.remaining.as_secs(),
        "readiness progress"
    );
}

fn check_version(raw: &str) -> anyhow::Result<()> {
    let parsed = parse_version(raw, ParseMode::Lenient)?;
    println!("parsed version: {parsed}");

    match VersionGate::compiled().check_minimum(raw) {
        Ok(()) => println!("minimum version: ok"),
        Err(e) => println!("minimum version: {e}"),
    }
    print_features(raw);
    Ok(())
}

fn print_features(raw: &str) {
    let gate = VersionGate::compiled();
    for feature in Feature::ALL {
        let requirement = gate
            .requirement(feature)
            .map_or_else(|| "-".to_string(), ToString::to_string);
        let status = if gate.is_feature_available(raw, feature) {
            "yes"
        } else {
            "no"
        };
        println!("{feature:<32} {status:<4} ({requirement})");
    }
    let network = default_network_name(raw).unwrap_or("unknown");
    println!("{:<32} {network}", "default network name");
}

fn vlans(config: VlanAllocatorConfig, count: usize, workers: usize) -> anyhow::Result<()> {
    let allocator = VlanAllocator::new(config)?;
    let workers = workers.max(1);
    tracing::debug!(count, workers, bits = allocator.subnet_bits(), "Allocating VLANs");

    let mut allocations: Vec<VlanAllocation> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let share = count / workers + usize::from(worker < count % workers);
                let allocator = &allocator;
                s.spawn(move || {
                    (0..share)
                        .map(|_| allocator.allocate())
                        .collect::<Result<Vec<_>, _>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .map_err(|_| anyhow::anyhow!("allocation worker panicked"))?
                    .map_err(anyhow::Error::from)
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })?
    .into_iter()
    .flatten()
    .collect();

    allocations.sort_by_key(|a| a.vlan_id);
    for allocation in &allocations {
        println!("{:>5}  {}", allocation.vlan_id, allocation.subnet);
    }
    Ok(())
}
