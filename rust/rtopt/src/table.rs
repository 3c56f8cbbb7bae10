// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

use std::collections::BTreeMap;

use crate::priority::PriorityDef;

/// Role name to scheduling definition map.
///
/// Always holds the disabled default under the empty name. The table is
/// filled during startup and only read afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorityTable {
    defs: BTreeMap<String, PriorityDef>,
}

impl PriorityTable {
    pub fn new() -> Self {
        let mut defs = BTreeMap::new();
        defs.insert(String::new(), PriorityDef::disabled(""));
        Self { defs }
    }

    /// Insert `pdef` under its own name, replacing any earlier definition.
    pub fn insert(&mut self, pdef: PriorityDef) {
        self.defs.insert(pdef.name().to_string(), pdef);
    }

    pub fn get(&self, name: &str) -> Option<&PriorityDef> {
        self.defs.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PriorityDef> {
        self.defs.values()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

impl Default for PriorityTable {
    fn default() -> Self {
        Self::new()
    }
}
