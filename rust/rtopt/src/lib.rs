// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # Real-time scheduling options for audio daemon threads
//!
//! Audio playback threads (decoder, player, per-output I/O, ...) are
//! sensitive to scheduling latency and page faults. This crate turns a
//! declarative `realtime_option` configuration block into per-role
//! scheduling definitions and applies them from inside each worker thread.
//!
//! A role is configured with a `POLICY:VALUE` string, where `POLICY` is one
//! of `OTHER`, `FIFO`, `RR`, `BATCH` or `IDLE`. For `FIFO` and `RR` the
//! value is the 1-99 static priority, for the others it is the thread's
//! timer slack in nanoseconds.
//!
//! ## Usage
//!
//! Startup is single threaded and happens before any worker exists:
//!
//! 1. [`RealtimeOption::initialize`] loads the configuration and lifts
//!    RLIMIT_MEMLOCK and RLIMIT_RTPRIO.
//! 2. [`RealtimeOption::lock_memory`] pre-faults the stack and heap
//!    reserves and optionally locks all pages.
//! 3. Each worker thread, once running, calls
//!    [`RealtimeOption::change_thread_priority`] with its own role name.
//!
//! The `RealtimeOption` is immutable after step 1 and can be shared with the
//! workers through an `Arc`. Errors returned from steps 1 and 2 mean the
//! requested real-time guarantees can't be met and the daemon should exit.
//! Problems with a single role are only logged and leave that thread on its
//! default scheduling.

pub mod config;
pub use config::parse_config_file;
pub use config::ConfigBlock;
pub use config::ConfigData;
pub use config::RealtimeConfig;

pub mod memory;

pub mod platform;
pub use platform::LinuxPlatform;
pub use platform::Platform;
pub use platform::RlimitResource;

pub mod policy;
pub use policy::policy_name;
pub use policy::SchedPolicy;

pub mod priority;
pub use priority::PriorityDef;

pub mod table;
pub use table::PriorityTable;

use anyhow::Result;
use log::debug;
use log::warn;

#[derive(Debug)]
pub struct RealtimeOption<P: Platform = LinuxPlatform> {
    config: RealtimeConfig,
    platform: P,
}

impl RealtimeOption<LinuxPlatform> {
    pub fn initialize(config: &ConfigData) -> Result<Self> {
        Self::initialize_with(config, LinuxPlatform::new())
    }
}

impl<P: Platform> RealtimeOption<P> {
    /// Load the real-time options from `config` and, if the
    /// `realtime_option` block is present, raise the resource limits.
    pub fn initialize_with(config: &ConfigData, platform: P) -> Result<Self> {
        let rtopt = Self {
            config: RealtimeConfig::load(config)?,
            platform,
        };
        if !rtopt.is_enabled() {
            return Ok(rtopt);
        }

        memory::raise_limits(&rtopt.platform)?;
        rtopt.dump();
        Ok(rtopt)
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn get(&self, name: &str) -> Option<&PriorityDef> {
        self.config.table.get(name)
    }

    pub fn lock_memory(&self) -> Result<()> {
        memory::lock_memory(&self.config, &self.platform)
    }

    /// Apply the definition of role `name` to the calling thread.
    ///
    /// Unknown roles and disabled definitions are no-ops. Syscall failures
    /// are logged and the thread keeps its current scheduling.
    pub fn change_thread_priority(&self, name: &str) {
        if !self.is_enabled() {
            return;
        }

        let Some(pdef) = self.get(name) else {
            debug!("ChangeThreadPriority: name not found name = '{}'", name);
            return;
        };
        if !pdef.is_enabled() {
            debug!("ChangeThreadPriority: '{}' disabled", name);
            return;
        }

        debug!(
            "ChangeThreadPriority: name {}  policy {}  priority {}",
            pdef.name(),
            pdef.policy(),
            pdef.priority()
        );
        self.change_priority(pdef);

        let timerslack = pdef.timerslack();
        if timerslack != 0 {
            debug!(
                "SetThreadTimerSlackNS: name {}  policy {}  timerslack {}",
                pdef.name(),
                pdef.policy(),
                timerslack
            );
            if let Err(e) = self.platform.set_timer_slack_ns(timerslack) {
                warn!("ChangeThreadPriority: '{}': {:#}", name, e);
            }
        }
    }

    fn change_priority(&self, pdef: &PriorityDef) {
        let res = if pdef.policy() == SchedPolicy::Idle {
            if !self.platform.supports_idle() {
                warn!(
                    "ChangePriority: IDLE scheduling is not available, '{}' left unchanged",
                    pdef.name()
                );
                return;
            }
            self.platform.set_idle_priority()
        } else {
            self.platform.set_scheduler(pdef.policy(), pdef.priority())
        };

        if let Err(e) = res {
            warn!("ChangePriority: '{}': {:#}", pdef.name(), e);
        }
    }

    /// Log the global switches and every definition at debug level.
    pub fn dump(&self) {
        debug!(
            "enable_rtopt: {}  enable_memlock: {}  stack_reserve: {}  heap_reserve: {}",
            self.config.enabled,
            self.config.memlock,
            self.config.stack_reserve,
            self.config.heap_reserve
        );
        for pdef in self.config.table.iter() {
            debug!("{}", pdef);
        }
    }
}
