use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::protection_data::ProtectionData;

const DEFAULT_EVENT_CAPACITY: usize = 64;

/**
    Dispatcher settings.

    No timeout is applied unless `request_timeout_ms` is set; the transport's
    own behavior decides when an exchange gives up.
*/
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    #[serde(
        rename = "request_timeout_ms",
        serialize_with = "serialize_timeout_ms",
        deserialize_with = "deserialize_timeout_ms"
    )]
    pub request_timeout: Option<Duration>,

    /// Capacity of the broadcast channel behind an [`EventBus`](crate::EventBus).
    pub event_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl DispatcherConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

fn serialize_timeout_ms<S: Serializer>(
    timeout: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match timeout {
        Some(timeout) => serializer.serialize_some(&(timeout.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}

fn deserialize_timeout_ms<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid protection config: {0}")]
    Json(#[from] serde_json::Error),
}

/**
    Protection data for each key system, keyed by key system string.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtectionConfig {
    entries: BTreeMap<String, ProtectionData>,
}

impl ProtectionConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn get(&self, key_system: &str) -> Option<&ProtectionData> {
        self.entries.get(key_system)
    }

    pub fn insert(&mut self, key_system: impl Into<String>, data: ProtectionData) {
        self.entries.insert(key_system.into(), data);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProtectionData)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
