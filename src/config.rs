//! Node configuration and metadata dictionaries.

#![forbid(unsafe_code)]

use crate::error::{NodeError, Result};
use crate::negotiate::MAX_VOLUME;
use crate::MAX_PORTS;
use std::collections::BTreeMap;

pub const KEY_NODE_NAME: &str = "node.name";
pub const KEY_NODE_AUTOCONNECT: &str = "node.autoconnect";
pub const KEY_NODE_EXCLUSIVE: &str = "node.exclusive";
pub const KEY_MEDIA_NAME: &str = "media.name";
pub const KEY_MEDIA_TYPE: &str = "media.type";
pub const KEY_MEDIA_CATEGORY: &str = "media.category";
pub const KEY_MEDIA_ROLE: &str = "media.role";
pub const KEY_TARGET_OBJECT: &str = "target.object";
pub const KEY_PORT_NAME: &str = "port.name";
pub const KEY_FORMAT_DSP: &str = "format.dsp";

/// Human-readable metadata attached to the node and its ports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Startup parameters of a node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub name: String,
    pub media_name: String,
    pub media_category: String,
    pub media_role: String,
    /// Object the host should link the node to, if any.
    pub target_object: Option<String>,
    pub autoconnect: bool,
    pub exclusive: bool,
    /// Output ports created at startup.
    pub ports: usize,
    /// Samples in one buffer period; anchors the buffer size requirement.
    pub buffer_samples: u32,
    /// Test tone frequency in Hz.
    pub tone_frequency: f32,
    /// Initial tone amplitude.
    pub volume: f32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "livemix".to_string(),
            media_name: "livemix tone".to_string(),
            media_category: "Playback".to_string(),
            media_role: "Music".to_string(),
            target_object: None,
            autoconnect: true,
            exclusive: true,
            ports: 2,
            buffer_samples: 128,
            tone_frequency: 440.0,
            volume: 0.2,
        }
    }
}

impl NodeConfig {
    /// Check the configuration before a node is built from it.
    pub fn validate(&self) -> Result<()> {
        if self.ports > MAX_PORTS {
            return Err(NodeError::PortCapacity {
                capacity: MAX_PORTS,
            });
        }
        if self.name.is_empty() {
            return Err(NodeError::InvalidConfig("node name is empty"));
        }
        // Largest sample is 4 bytes; the size range is expressed as i32.
        if self.buffer_samples == 0 || self.buffer_samples > i32::MAX as u32 / 4 {
            return Err(NodeError::InvalidConfig("buffer period out of range"));
        }
        if !self.tone_frequency.is_finite() || self.tone_frequency <= 0.0 {
            return Err(NodeError::InvalidConfig("tone frequency must be positive"));
        }
        if !self.volume.is_finite() || self.volume < 0.0 || self.volume > MAX_VOLUME {
            return Err(NodeError::InvalidConfig("volume must be within 0..=10"));
        }
        Ok(())
    }

    /// Metadata announced with the node info.
    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert(KEY_NODE_NAME, self.name.as_str());
        props.insert(KEY_NODE_AUTOCONNECT, self.autoconnect.to_string());
        props.insert(KEY_NODE_EXCLUSIVE, self.exclusive.to_string());
        props.insert(KEY_MEDIA_NAME, self.media_name.as_str());
        props.insert(KEY_MEDIA_TYPE, "Audio");
        props.insert(KEY_MEDIA_CATEGORY, self.media_category.as_str());
        props.insert(KEY_MEDIA_ROLE, self.media_role.as_str());
        if let Some(target) = &self.target_object {
            props.insert(KEY_TARGET_OBJECT, target.as_str());
        }
        props
    }

    /// Metadata announced with port `index`.
    pub fn port_properties(&self, index: u32) -> Properties {
        let mut props = Properties::new();
        props.insert(KEY_FORMAT_DSP, "32 bit float mono audio");
        props.insert(KEY_PORT_NAME, format!("out_{index}"));
        props
    }
}
