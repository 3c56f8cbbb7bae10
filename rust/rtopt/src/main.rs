// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use log::info;

use rtopt::policy_name;
use rtopt::ConfigData;
use rtopt::RealtimeConfig;
use rtopt::RealtimeOption;

const DEFAULT_CONFIG_PATH: &str = "/etc/rtopt.toml";

/// Inspect and try out the real-time options of an audio daemon
/// configuration.
///
/// Without flags the resulting per-thread scheduling table is printed.
#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
struct Opts {
    /// Configuration file to read.
    #[clap(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Only validate the configuration and exit.
    #[clap(long, action = clap::ArgAction::SetTrue)]
    check: bool,

    /// Run the daemon startup sequence (raise rlimits, lock memory) and apply
    /// the scheduling of ROLE to this process. Needs the privileges the
    /// daemon would have.
    #[clap(long, value_name = "ROLE")]
    apply: Option<String>,

    /// Enable verbose output. Specify multiple times to increase verbosity.
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn print_table(rtcfg: &RealtimeConfig) {
    println!(
        "enabled: {}  memlock: {}  stack_reserve: {}  heap_reserve: {}",
        rtcfg.enabled, rtcfg.memlock, rtcfg.stack_reserve, rtcfg.heap_reserve
    );
    for pdef in rtcfg.table.iter() {
        println!("{}", pdef);
    }
}

fn print_current_sched() -> Result<()> {
    let raw = unsafe { libc::sched_getscheduler(0) };
    if raw < 0 {
        return Err(std::io::Error::last_os_error()).context("sched_getscheduler");
    }
    let mut param = libc::sched_param { sched_priority: 0 };
    if unsafe { libc::sched_getparam(0, &mut param) } < 0 {
        return Err(std::io::Error::last_os_error()).context("sched_getparam");
    }
    println!(
        "current policy: {}  priority: {}",
        policy_name(raw),
        param.sched_priority
    );
    Ok(())
}

fn apply(config: &ConfigData, role: &str) -> Result<()> {
    let rtopt = RealtimeOption::initialize(config)?;
    if !rtopt.is_enabled() {
        info!("realtime_option is not configured, nothing to apply");
    }
    rtopt.lock_memory()?;

    match rtopt.get(role) {
        Some(pdef) => println!("{}", pdef),
        None => println!("'{}' is not configured", role),
    }
    rtopt.change_thread_priority(role);
    print_current_sched()
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    let llv = match opts.verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let mut lcfg = simplelog::ConfigBuilder::new();
    lcfg.set_time_level(simplelog::LevelFilter::Error)
        .set_location_level(simplelog::LevelFilter::Off)
        .set_target_level(simplelog::LevelFilter::Off)
        .set_thread_level(simplelog::LevelFilter::Off);
    simplelog::TermLogger::init(
        llv,
        lcfg.build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;

    let config = rtopt::parse_config_file(&opts.config)?;

    if let Some(role) = &opts.apply {
        return apply(&config, role);
    }

    let rtcfg = RealtimeConfig::load(&config)
        .with_context(|| format!("Invalid realtime_option in {:?}", opts.config))?;
    if opts.check {
        info!(
            "{:?}: OK, {} thread definition(s)",
            opts.config,
            rtcfg.table.len() - 1
        );
        return Ok(());
    }

    print_table(&rtcfg);
    Ok(())
}
