// SPDX-License-Identifier: MIT OR Apache-2.0
//! Editor configuration.

use crate::error::{GraphError, Result};
use crate::events::{DEFAULT_EVENT_HISTORY, DEFAULT_MAX_LISTENERS};
use crate::history::MAX_HISTORY;
use serde::{Deserialize, Serialize};

/// Tunables for a [`GraphEditor`](crate::GraphEditor)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Undo steps kept before the oldest is dropped
    pub max_history: usize,
    /// Events kept in the diagnostic event history
    pub event_history_capacity: usize,
    /// Listeners per event type before a leak warning is logged
    pub max_listeners: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_history: MAX_HISTORY,
            event_history_capacity: DEFAULT_EVENT_HISTORY,
            max_listeners: DEFAULT_MAX_LISTENERS,
        }
    }
}

impl EditorConfig {
    /// Serialize to RON format
    pub fn to_ron(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| GraphError::serialization("failed to encode editor config", Some(e)))
    }

    /// Deserialize from RON format. Missing fields take their defaults.
    pub fn from_ron(ron: &str) -> Result<Self> {
        ron::from_str(ron)
            .map_err(|e| GraphError::deserialization(format!("invalid editor config: {e}"), Some(e)))
    }
}
