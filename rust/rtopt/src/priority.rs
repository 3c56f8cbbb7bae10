// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

use std::fmt;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use log::warn;

use crate::policy::SchedPolicy;

pub const RT_PRIORITY_MIN: u64 = 1;
pub const RT_PRIORITY_MAX: u64 = 99;

/// Scheduling request for one named thread role.
///
/// Real-time definitions (FIFO/RR) carry a 1-99 priority and no timer slack.
/// All other classes carry priority 0 and an optional timer slack in
/// nanoseconds. A disabled definition requests nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriorityDef {
    name: String,
    policy: SchedPolicy,
    priority: i32,
    timerslack: u64,
}

impl PriorityDef {
    pub fn disabled(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Parse a `POLICY:VALUE` string for role `name`.
    ///
    /// Malformed strings, unknown policy names and out of range real-time
    /// priorities are not errors for the caller: a warning is logged and a
    /// disabled definition is returned.
    pub fn parse(raw: &str, name: &str) -> Self {
        match parse_policy_value(raw) {
            Ok((policy, value)) => Self::from_policy_value(name, policy, value),
            Err(e) => {
                warn!("Ignoring priority of '{}' ('{}'): {:#}", name, raw, e);
                Self::disabled(name)
            }
        }
    }

    fn from_policy_value(name: &str, policy: SchedPolicy, value: u64) -> Self {
        if policy.is_realtime() {
            Self {
                name: name.to_string(),
                policy,
                // range checked by parse_policy_value()
                priority: value as i32,
                timerslack: 0,
            }
        } else {
            Self {
                name: name.to_string(),
                policy,
                priority: 0,
                timerslack: value,
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> SchedPolicy {
        self.policy
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Effective timer slack in nanoseconds, always 0 for real-time classes.
    pub fn timerslack(&self) -> u64 {
        if self.is_realtime() {
            0
        } else {
            self.timerslack
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.is_enabled()
    }

    pub fn is_realtime(&self) -> bool {
        self.policy.is_realtime()
    }
}

impl fmt::Display for PriorityDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "thread name: '{}'  policy: {}  priority: {}  timerslack: {}",
            self.name,
            self.policy,
            self.priority,
            self.timerslack()
        )
    }
}

/// Split and validate `POLICY:VALUE`. The value must be all decimal digits;
/// trailing garbage is rejected rather than truncated.
fn parse_policy_value(raw: &str) -> Result<(SchedPolicy, u64)> {
    let Some((policy_part, value_part)) = raw.split_once(':') else {
        bail!("missing ':' between policy and value");
    };

    let policy = SchedPolicy::resolve(policy_part);
    if !policy.is_enabled() {
        bail!("unknown policy '{}'", policy_part);
    }

    if value_part.is_empty() || !value_part.bytes().all(|b| b.is_ascii_digit()) {
        bail!("'{}' is not a non-negative integer", value_part);
    }
    let value: u64 = value_part
        .parse()
        .with_context(|| format!("'{}' is out of range", value_part))?;

    if policy.is_realtime() && !(RT_PRIORITY_MIN..=RT_PRIORITY_MAX).contains(&value) {
        bail!(
            "{} priority {} outside {}-{}",
            policy,
            value,
            RT_PRIORITY_MIN,
            RT_PRIORITY_MAX
        );
    }

    Ok((policy, value))
}
