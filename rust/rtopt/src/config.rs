// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Configuration blocks and the loader which turns them into a
//! [`RealtimeConfig`].
//!
//! The daemon configuration is a set of key/value blocks. Only two kinds are
//! looked at here:
//!
//! ```toml
//! [realtime_option]
//! player_priority = "FIFO:50"
//! memlock         = "yes"
//! stack_reserve   = 1024     # KiB
//! heap_reserve    = 10240    # KiB
//!
//! [[audio_output]]
//! name     = "alsa"
//! priority = "RR:20"
//! ```

use std::fs;
use std::path::Path;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use log::debug;
use log::warn;
use serde::Deserialize;

use crate::priority::PriorityDef;
use crate::table::PriorityTable;

pub const PRIORITY_SUFFIX: &str = "_priority";
pub const OUTPUT_PREFIX: &str = "output:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockParam {
    pub name: String,
    pub value: String,
}

/// One configuration block, parameters kept in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "toml::Table")]
pub struct ConfigBlock {
    pub params: Vec<BlockParam>,
}

impl ConfigBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.params.push(BlockParam {
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|param| param.name == name)
            .map(|param| param.value.as_str())
    }
}

impl TryFrom<toml::Table> for ConfigBlock {
    type Error = anyhow::Error;

    fn try_from(table: toml::Table) -> Result<Self> {
        let mut block = ConfigBlock::new();
        for (name, value) in table {
            let value = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Boolean(true) => "yes".to_string(),
                toml::Value::Boolean(false) => "no".to_string(),
                other => bail!(
                    "'{}' must be a string, integer or boolean, not {}",
                    name,
                    other.type_str()
                ),
            };
            block.params.push(BlockParam { name, value });
        }
        Ok(block)
    }
}

/// The parts of the daemon configuration the real-time options read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConfigData {
    pub realtime_option: Option<ConfigBlock>,
    pub audio_output: Vec<ConfigBlock>,
}

pub fn parse_config_file(path: &Path) -> Result<ConfigData> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read config {:?}", path))?;
    parse_config_content(&content).with_context(|| format!("Failed to parse config {:?}", path))
}

pub fn parse_config_content(content: &str) -> Result<ConfigData> {
    if content.trim().is_empty() {
        bail!("The config file is empty!");
    }
    let config: ConfigData = toml::from_str(content)?;
    Ok(config)
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        _ => bail!("'{}' is not a boolean value for {}", value, name),
    }
}

/// Parse a KiB count and return it in bytes.
fn parse_kib(name: &str, value: &str) -> Result<usize> {
    let kib: usize = value
        .parse()
        .map_err(|_| anyhow!("'{}' is not an unsigned size for {}", value, name))?;
    kib.checked_mul(1024)
        .ok_or_else(|| anyhow!("{} of {} KiB is too large", name, kib))
}

/// Everything the real-time options need after startup. Built once and
/// read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RealtimeConfig {
    /// Master switch, set iff the `realtime_option` block exists.
    pub enabled: bool,
    pub memlock: bool,
    pub stack_reserve: usize,
    pub heap_reserve: usize,
    pub table: PriorityTable,
}

impl RealtimeConfig {
    /// Build the priority table and scalar options from `config`.
    ///
    /// Bad priority strings only disable the affected role. Bad scalar
    /// values are configuration errors.
    pub fn load(config: &ConfigData) -> Result<Self> {
        let mut rtcfg = Self::default();

        let Some(block) = &config.realtime_option else {
            debug!("realtime_option not configured");
            return Ok(rtcfg);
        };
        rtcfg.enabled = true;

        for param in &block.params {
            match param.name.as_str() {
                "memlock" => rtcfg.memlock = parse_bool(&param.name, &param.value)?,
                "stack_reserve" => rtcfg.stack_reserve = parse_kib(&param.name, &param.value)?,
                "heap_reserve" => rtcfg.heap_reserve = parse_kib(&param.name, &param.value)?,
                key => match key.strip_suffix(PRIORITY_SUFFIX) {
                    Some("") => warn!("'{}' does not name a thread, ignored", key),
                    Some(role) => rtcfg.table.insert(PriorityDef::parse(&param.value, role)),
                    None => debug!("realtime_option: unknown key '{}' ignored", key),
                },
            }
        }

        for block in &config.audio_output {
            match (block.get("name"), block.get("priority")) {
                (Some(name), Some(raw)) => {
                    let role = format!("{}{}", OUTPUT_PREFIX, name);
                    rtcfg.table.insert(PriorityDef::parse(raw, &role));
                }
                (None, Some(raw)) => {
                    warn!("audio_output with priority '{}' is missing \"name\", ignored", raw)
                }
                _ => {}
            }
        }

        Ok(rtcfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::SchedPolicy;

    fn rt_only(block: ConfigBlock) -> ConfigData {
        ConfigData {
            realtime_option: Some(block),
            audio_output: vec![],
        }
    }

    #[test]
    fn test_no_realtime_block() {
        let config = ConfigData {
            realtime_option: None,
            audio_output: vec![ConfigBlock::new()
                .with("name", "alsa")
                .with("priority", "RR:20")],
        };
        let rtcfg = RealtimeConfig::load(&config).unwrap();
        assert!(!rtcfg.enabled);
        assert_eq!(rtcfg.table.len(), 1);
        assert!(rtcfg.table.get("output:alsa").is_none());
    }

    #[test]
    fn test_empty_realtime_block() {
        let rtcfg = RealtimeConfig::load(&rt_only(ConfigBlock::new())).unwrap();
        assert!(rtcfg.enabled);
        assert!(!rtcfg.memlock);
        assert_eq!(rtcfg.stack_reserve, 0);
        assert_eq!(rtcfg.heap_reserve, 0);
        assert_eq!(rtcfg.table.len(), 1);
    }

    #[test]
    fn test_scalars() {
        let block = ConfigBlock::new()
            .with("memlock", "yes")
            .with("stack_reserve", "1024")
            .with("heap_reserve", "10240");
        let rtcfg = RealtimeConfig::load(&rt_only(block)).unwrap();
        assert!(rtcfg.memlock);
        assert_eq!(rtcfg.stack_reserve, 1024 * 1024);
        assert_eq!(rtcfg.heap_reserve, 10240 * 1024);
    }

    #[test]
    fn test_bad_scalars() {
        for (name, value) in [
            ("memlock", "maybe"),
            ("stack_reserve", "-1"),
            ("heap_reserve", "10M"),
            ("heap_reserve", "18446744073709551615"),
        ] {
            let block = ConfigBlock::new().with(name, value);
            assert!(RealtimeConfig::load(&rt_only(block)).is_err(), "{name}={value}");
        }
    }

    #[test]
    fn test_thread_priorities() {
        let block = ConfigBlock::new()
            .with("player_priority", "FIFO:50")
            .with("decoder_priority", "RR:40")
            .with("update_priority", "IDLE:0")
            .with("io_priority", "BOGUS:1")
            .with("_priority", "FIFO:10")
            .with("priority_of_main", "FIFO:10")
            .with("colour", "blue");
        let rtcfg = RealtimeConfig::load(&rt_only(block)).unwrap();

        let player = rtcfg.table.get("player").unwrap();
        assert_eq!(player.policy(), SchedPolicy::Fifo);
        assert_eq!(player.priority(), 50);

        let decoder = rtcfg.table.get("decoder").unwrap();
        assert_eq!(decoder.policy(), SchedPolicy::RoundRobin);
        assert_eq!(decoder.priority(), 40);

        assert_eq!(rtcfg.table.get("update").unwrap().policy(), SchedPolicy::Idle);
        assert!(!rtcfg.table.get("io").unwrap().is_enabled());
        assert!(!rtcfg.table.get("").unwrap().is_enabled());
        assert!(rtcfg.table.get("priority_of_main").is_none());
        assert!(rtcfg.table.get("colour").is_none());
        assert_eq!(rtcfg.table.len(), 5);
    }

    #[test]
    fn test_output_priorities() {
        let config = ConfigData {
            realtime_option: Some(ConfigBlock::new()),
            audio_output: vec![
                ConfigBlock::new()
                    .with("type", "alsa")
                    .with("name", "alsa")
                    .with("priority", "RR:20"),
                ConfigBlock::new().with("name", "null"),
                ConfigBlock::new().with("priority", "FIFO:10"),
                ConfigBlock::new()
                    .with("name", "pipe")
                    .with("priority", "OTHER:500")
                    .with("timerslack", "100"),
            ],
        };
        let rtcfg = RealtimeConfig::load(&config).unwrap();
        assert_eq!(rtcfg.table.len(), 3);

        let alsa = rtcfg.table.get("output:alsa").unwrap();
        assert_eq!(alsa.policy(), SchedPolicy::RoundRobin);
        assert_eq!(alsa.priority(), 20);

        let pipe = rtcfg.table.get("output:pipe").unwrap();
        assert_eq!(pipe.policy(), SchedPolicy::Other);
        assert_eq!(pipe.timerslack(), 500);
        assert!(rtcfg.table.get("output:null").is_none());
    }

    #[test]
    fn test_parse_config_content() {
        let config_str = r#"
music_directory = "/srv/music"

[realtime_option]
player_priority = "FIFO:50"
memlock = true
stack_reserve = 1024
heap_reserve = "2048"

[[audio_output]]
type = "alsa"
name = "alsa"
priority = "RR:20"
timerslack = 100

[[audio_output]]
type = "null"
name = "null"
"#;
        let config = parse_config_content(config_str).expect("Failed to parse config");
        let block = config.realtime_option.as_ref().unwrap();
        assert_eq!(block.get("player_priority"), Some("FIFO:50"));
        assert_eq!(block.get("memlock"), Some("yes"));
        assert_eq!(block.get("stack_reserve"), Some("1024"));
        assert_eq!(config.audio_output.len(), 2);
        assert_eq!(config.audio_output[0].get("timerslack"), Some("100"));

        let rtcfg = RealtimeConfig::load(&config).unwrap();
        assert!(rtcfg.memlock);
        assert_eq!(rtcfg.heap_reserve, 2048 * 1024);
        assert!(rtcfg.table.get("output:alsa").unwrap().is_realtime());
    }

    #[test]
    fn test_parse_config_without_realtime() {
        let config = parse_config_content("[[audio_output]]\nname = \"alsa\"\n").unwrap();
        assert!(config.realtime_option.is_none());
        assert!(!RealtimeConfig::load(&config).unwrap().enabled);
    }

    #[test]
    fn test_empty_config() {
        assert!(parse_config_content("").is_err());
        assert!(parse_config_content("  \n").is_err());
    }

    #[test]
    fn test_nested_value_rejected() {
        let config_str = r#"
[realtime_option]
player_priority = ["FIFO", 50]
"#;
        assert!(parse_config_content(config_str).is_err());
    }
}
