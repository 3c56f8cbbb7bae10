// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Scheduling policy names and the platform scheduling classes they map to.

use std::fmt;
use std::str::FromStr;

/// Scheduling class requested for a thread.
///
/// `Disabled` is not a kernel class. It marks a definition which asks for no
/// change at all and never reaches the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SchedPolicy {
    #[default]
    Disabled,
    Other,
    Fifo,
    RoundRobin,
    Batch,
    Idle,
}

/// Policy names accepted in `POLICY:VALUE` strings.
pub const POLICY_TABLE: [(&str, SchedPolicy); 5] = [
    ("OTHER", SchedPolicy::Other),
    ("FIFO", SchedPolicy::Fifo),
    ("RR", SchedPolicy::RoundRobin),
    ("BATCH", SchedPolicy::Batch),
    ("IDLE", SchedPolicy::Idle),
];

impl SchedPolicy {
    /// Look up a policy by its configuration name. Unknown names resolve to
    /// `Disabled` rather than failing.
    pub fn resolve(name: &str) -> SchedPolicy {
        name.parse().unwrap_or(SchedPolicy::Disabled)
    }

    /// Map a platform scheduling class id back to a policy.
    pub fn from_raw(raw: libc::c_int) -> Option<SchedPolicy> {
        POLICY_TABLE
            .iter()
            .map(|(_, policy)| *policy)
            .find(|policy| policy.raw() == Some(raw))
    }

    /// Platform scheduling class id, `None` for `Disabled`.
    pub fn raw(self) -> Option<libc::c_int> {
        match self {
            SchedPolicy::Disabled => None,
            SchedPolicy::Other => Some(libc::SCHED_OTHER),
            SchedPolicy::Fifo => Some(libc::SCHED_FIFO),
            SchedPolicy::RoundRobin => Some(libc::SCHED_RR),
            SchedPolicy::Batch => Some(libc::SCHED_BATCH),
            SchedPolicy::Idle => Some(libc::SCHED_IDLE),
        }
    }

    pub fn is_enabled(self) -> bool {
        self != SchedPolicy::Disabled
    }

    /// FIFO and RR take a 1-99 priority, everything else takes a timer slack.
    pub fn is_realtime(self) -> bool {
        matches!(self, SchedPolicy::Fifo | SchedPolicy::RoundRobin)
    }
}

/// Name of a raw platform scheduling class. Ids outside the table come back
/// as `UNDEF(<id>)` so arbitrary values can still be printed.
pub fn policy_name(raw: libc::c_int) -> String {
    match SchedPolicy::from_raw(raw) {
        Some(policy) => policy.to_string(),
        None => format!("UNDEF({raw})"),
    }
}

impl FromStr for SchedPolicy {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> anyhow::Result<SchedPolicy> {
        POLICY_TABLE
            .iter()
            .find(|(policy_name, _)| *policy_name == name)
            .map(|(_, policy)| *policy)
            .ok_or_else(|| anyhow::anyhow!("{name} is not a scheduling policy"))
    }
}

impl TryFrom<&str> for SchedPolicy {
    type Error = <SchedPolicy as FromStr>::Err;
    fn try_from(s: &str) -> Result<SchedPolicy, Self::Error> {
        <SchedPolicy as FromStr>::from_str(s)
    }
}

impl From<SchedPolicy> for &str {
    fn from(policy: SchedPolicy) -> Self {
        match policy {
            SchedPolicy::Disabled => "DISABLED",
            SchedPolicy::Other => "OTHER",
            SchedPolicy::Fifo => "FIFO",
            SchedPolicy::RoundRobin => "RR",
            SchedPolicy::Batch => "BATCH",
            SchedPolicy::Idle => "IDLE",
        }
    }
}

impl fmt::Display for SchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &str = (*self).into();
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_names() {
        assert_eq!(SchedPolicy::resolve("OTHER"), SchedPolicy::Other);
        assert_eq!(SchedPolicy::resolve("FIFO"), SchedPolicy::Fifo);
        assert_eq!(SchedPolicy::resolve("RR"), SchedPolicy::RoundRobin);
        assert_eq!(SchedPolicy::resolve("BATCH"), SchedPolicy::Batch);
        assert_eq!(SchedPolicy::resolve("IDLE"), SchedPolicy::Idle);
    }

    #[test]
    fn test_resolve_unknown_is_disabled() {
        assert_eq!(SchedPolicy::resolve("BOGUS"), SchedPolicy::Disabled);
        assert_eq!(SchedPolicy::resolve("fifo"), SchedPolicy::Disabled);
        assert_eq!(SchedPolicy::resolve(""), SchedPolicy::Disabled);
        assert!("DISABLED".parse::<SchedPolicy>().is_err());
    }

    #[test]
    fn test_name_round_trip() {
        for (name, policy) in POLICY_TABLE {
            let raw = SchedPolicy::resolve(name).raw().unwrap();
            assert_eq!(policy_name(raw), name);
            assert_eq!(SchedPolicy::from_raw(raw), Some(policy));
        }
    }

    #[test]
    fn test_undefined_raw_policy_name() {
        assert_eq!(policy_name(7), "UNDEF(7)");
        assert_eq!(policy_name(-1), "UNDEF(-1)");
        assert_eq!(SchedPolicy::from_raw(42), None);
    }

    #[test]
    fn test_realtime_classes() {
        assert!(SchedPolicy::Fifo.is_realtime());
        assert!(SchedPolicy::RoundRobin.is_realtime());
        assert!(!SchedPolicy::Other.is_realtime());
        assert!(!SchedPolicy::Batch.is_realtime());
        assert!(!SchedPolicy::Idle.is_realtime());
        assert!(!SchedPolicy::Disabled.is_realtime());
        assert!(!SchedPolicy::Disabled.is_enabled());
        assert_eq!(SchedPolicy::Disabled.raw(), None);
    }
}
