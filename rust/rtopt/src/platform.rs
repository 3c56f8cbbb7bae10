// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! OS operations used by the real-time options.
//!
//! Every thread operation acts on the calling thread only. On Linux
//! `sched_setscheduler(0, ..)` and `PR_SET_TIMERSLACK` are per-thread even
//! though the man pages talk about processes.

use std::io;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use nix::sys::mman::mlockall;
use nix::sys::mman::MlockAllFlags;
use nix::sys::resource::setrlimit;
use nix::sys::resource::Resource;
use nix::sys::resource::RLIM_INFINITY;

use crate::policy::SchedPolicy;

const IOPRIO_CLASS_SHIFT: libc::c_int = 13;
const IOPRIO_CLASS_IDLE: libc::c_int = 3;
const IOPRIO_WHO_PROCESS: libc::c_int = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlimitResource {
    Memlock,
    Rtprio,
}

impl RlimitResource {
    pub fn name(self) -> &'static str {
        match self {
            RlimitResource::Memlock => "memlock",
            RlimitResource::Rtprio => "rtprio",
        }
    }
}

pub trait Platform: Send + Sync {
    /// Switch the calling thread to `policy` with static `priority`.
    fn set_scheduler(&self, policy: SchedPolicy, priority: i32) -> Result<()>;

    /// Put the calling thread into the idle CPU and I/O classes.
    fn set_idle_priority(&self) -> Result<()>;

    fn set_timer_slack_ns(&self, ns: u64) -> Result<()>;

    /// Whether the idle scheduling class exists on this system.
    fn supports_idle(&self) -> bool;

    fn set_rlimit_infinity(&self, resource: RlimitResource) -> Result<()>;

    /// Lock every page currently mapped by the process.
    fn lock_all_memory(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct LinuxPlatform {
    idle_supported: bool,
}

impl LinuxPlatform {
    pub fn new() -> Self {
        // EINVAL here means the kernel doesn't know SCHED_IDLE.
        let idle_supported = unsafe { libc::sched_get_priority_min(libc::SCHED_IDLE) } >= 0;
        Self { idle_supported }
    }
}

impl Default for LinuxPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn sched_setscheduler(raw_policy: libc::c_int, priority: i32) -> io::Result<()> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    if unsafe { libc::sched_setscheduler(0, raw_policy, &param) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl Platform for LinuxPlatform {
    fn set_scheduler(&self, policy: SchedPolicy, priority: i32) -> Result<()> {
        let Some(raw) = policy.raw() else {
            bail!("{} is not a scheduling class", policy);
        };
        sched_setscheduler(raw, priority)
            .with_context(|| format!("sched_setscheduler({}, {})", policy, priority))
    }

    fn set_idle_priority(&self) -> Result<()> {
        sched_setscheduler(libc::SCHED_IDLE, 0).context("sched_setscheduler(IDLE, 0)")?;

        let ioprio = IOPRIO_CLASS_IDLE << IOPRIO_CLASS_SHIFT;
        let ret = unsafe { libc::syscall(libc::SYS_ioprio_set, IOPRIO_WHO_PROCESS, 0, ioprio) };
        if ret < 0 {
            return Err(anyhow!(io::Error::last_os_error()).context("ioprio_set(IDLE)"));
        }
        Ok(())
    }

    fn set_timer_slack_ns(&self, ns: u64) -> Result<()> {
        nix::sys::prctl::set_timerslack(ns)
            .with_context(|| format!("prctl(PR_SET_TIMERSLACK, {})", ns))
    }

    fn supports_idle(&self) -> bool {
        self.idle_supported
    }

    fn set_rlimit_infinity(&self, resource: RlimitResource) -> Result<()> {
        let res = match resource {
            RlimitResource::Memlock => Resource::RLIMIT_MEMLOCK,
            RlimitResource::Rtprio => Resource::RLIMIT_RTPRIO,
        };
        setrlimit(res, RLIM_INFINITY, RLIM_INFINITY)
            .with_context(|| format!("setrlimit({}, unlimited)", resource.name()))
    }

    fn lock_all_memory(&self) -> Result<()> {
        mlockall(MlockAllFlags::MCL_CURRENT).context("mlockall(MCL_CURRENT)")
    }
}
