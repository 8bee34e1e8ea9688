//! Listener identity - seeds the display names of the four virtual endpoints.

use serde::{Deserialize, Serialize};
use std::env;

/// Number of virtual tally endpoints (and physical channels) per device.
pub const SLOT_COUNT: usize = 4;

/// How this device names itself to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Leading part of every endpoint display name.
    /// Default: Tally
    #[serde(default = "ListenerConfig::default_name_prefix")]
    pub name_prefix: String,

    /// Per-device suffix that keeps display names unique on one server.
    /// Default: $HOSTNAME, else "local"
    #[serde(default = "ListenerConfig::default_tag")]
    pub tag: String,
}

impl ListenerConfig {
    fn default_name_prefix() -> String {
        "Tally".to_string()
    }

    fn default_tag() -> String {
        env::var("HOSTNAME")
            .ok()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "local".to_string())
    }

    /// Display name for a slot: `<prefix>-Tally<n>-<TAG>`, `n` counted from 1.
    pub fn display_name(&self, slot_index: usize) -> String {
        format!(
            "{}-Tally{}-{}",
            self.name_prefix,
            slot_index + 1,
            self.tag.to_uppercase()
        )
    }

    /// Display names for every slot, in slot order.
    pub fn display_names(&self) -> [String; SLOT_COUNT] {
        std::array::from_fn(|i| self.display_name(i))
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            name_prefix: Self::default_name_prefix(),
            tag: Self::default_tag(),
        }
    }
}
