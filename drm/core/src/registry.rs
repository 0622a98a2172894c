use std::sync::Arc;

use crate::constants::{
    CLEARKEY_KEY_SYSTEM, CLEARKEY_SCHEME_ID_URI, PLAYREADY_KEY_SYSTEM, PLAYREADY_SCHEME_ID_URI,
    WIDEVINE_KEY_SYSTEM, WIDEVINE_SCHEME_ID_URI,
};
use crate::error::RegistryError;
use crate::key_system::{
    ClearKeyCapabilities, KeySystemCapabilities, PlayReadyCapabilities, WidevineCapabilities,
};
use crate::types::SystemId;

/**
    One supported key system: its EME string, PSSH system ID, the DASH
    scheme URI that identifies it in manifests, and its capabilities.
*/
#[derive(Debug, Clone)]
pub struct KeySystemDescriptor {
    system_string: String,
    system_id: SystemId,
    scheme_id_uri: String,
    capabilities: Arc<dyn KeySystemCapabilities>,
}

impl KeySystemDescriptor {
    pub fn new(
        system_string: impl Into<String>,
        system_id: SystemId,
        scheme_id_uri: impl Into<String>,
        capabilities: impl KeySystemCapabilities + 'static,
    ) -> Self {
        Self {
            system_string: system_string.into(),
            system_id,
            scheme_id_uri: scheme_id_uri.into(),
            capabilities: Arc::new(capabilities),
        }
    }

    pub fn widevine() -> Self {
        Self::new(
            WIDEVINE_KEY_SYSTEM,
            SystemId::Widevine,
            WIDEVINE_SCHEME_ID_URI,
            WidevineCapabilities,
        )
    }

    pub fn playready() -> Self {
        Self::new(
            PLAYREADY_KEY_SYSTEM,
            SystemId::PlayReady,
            PLAYREADY_SCHEME_ID_URI,
            PlayReadyCapabilities,
        )
    }

    /**
        W3C clear key. Matched in manifests by the DASH-IF clear-key scheme,
        in PSSH boxes by the common system ID.
    */
    pub fn clear_key() -> Self {
        Self::new(
            CLEARKEY_KEY_SYSTEM,
            SystemId::ClearKey,
            CLEARKEY_SCHEME_ID_URI,
            ClearKeyCapabilities,
        )
    }

    pub fn system_string(&self) -> &str {
        &self.system_string
    }

    pub fn system_id(&self) -> SystemId {
        self.system_id
    }

    pub fn scheme_id_uri(&self) -> &str {
        &self.scheme_id_uri
    }

    pub fn capabilities(&self) -> &dyn KeySystemCapabilities {
        self.capabilities.as_ref()
    }

    /**
        Same registry identity: equal system string and system ID.
    */
    pub fn is_same(&self, other: &KeySystemDescriptor) -> bool {
        self.system_string == other.system_string && self.system_id == other.system_id
    }
}

/**
    Ordered catalog of supported key systems.

    Entries are kept in registration order, which is also their priority
    (first registered wins). The registry cannot be modified once built;
    share it behind an `Arc` for concurrent read-only lookups.
*/
#[derive(Debug, Clone)]
pub struct KeySystemRegistry {
    entries: Vec<KeySystemDescriptor>,
    clear_key: Option<usize>,
}

impl KeySystemRegistry {
    pub fn builder() -> KeySystemRegistryBuilder {
        KeySystemRegistryBuilder::default()
    }

    /**
        PlayReady, Widevine and clear key, in that priority order, with the
        clear-key entry designated for local key formatting.
    */
    pub fn with_defaults() -> Self {
        Self {
            entries: vec![
                KeySystemDescriptor::playready(),
                KeySystemDescriptor::widevine(),
                KeySystemDescriptor::clear_key(),
            ],
            clear_key: Some(2),
        }
    }

    pub fn lookup_by_system_string(&self, system_string: &str) -> Option<&KeySystemDescriptor> {
        self.entries
            .iter()
            .find(|d| d.system_string == system_string)
    }

    pub fn lookup_by_system_id(&self, system_id: SystemId) -> Option<&KeySystemDescriptor> {
        self.entries.iter().find(|d| d.system_id == system_id)
    }

    /**
        Whether `descriptor` is the distinguished clear-key entry.
    */
    pub fn is_designated_clear_key(&self, descriptor: &KeySystemDescriptor) -> bool {
        self.clear_key_descriptor()
            .is_some_and(|clear_key| clear_key.is_same(descriptor))
    }

    pub fn clear_key_descriptor(&self) -> Option<&KeySystemDescriptor> {
        self.clear_key.map(|idx| &self.entries[idx])
    }

    /**
        Entries in priority order.
    */
    pub fn iter(&self) -> impl Iterator<Item = &KeySystemDescriptor> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for KeySystemRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[derive(Debug, Default)]
pub struct KeySystemRegistryBuilder {
    entries: Vec<KeySystemDescriptor>,
    clear_key: Option<usize>,
}

impl KeySystemRegistryBuilder {
    /**
        Append a descriptor at the lowest priority so far.
    */
    pub fn register(mut self, descriptor: KeySystemDescriptor) -> Result<Self, RegistryError> {
        if self
            .entries
            .iter()
            .any(|d| d.system_string == descriptor.system_string)
        {
            return Err(RegistryError::DuplicateSystemString(
                descriptor.system_string,
            ));
        }
        if self
            .entries
            .iter()
            .any(|d| d.system_id == descriptor.system_id)
        {
            return Err(RegistryError::DuplicateSystemId(descriptor.system_id));
        }
        self.entries.push(descriptor);
        Ok(self)
    }

    /**
        Mark an already registered key system as the clear-key entry.
    */
    pub fn designate_clear_key(mut self, system_string: &str) -> Result<Self, RegistryError> {
        let idx = self
            .entries
            .iter()
            .position(|d| d.system_string == system_string)
            .ok_or_else(|| RegistryError::UnknownClearKey(system_string.to_string()))?;
        self.clear_key = Some(idx);
        Ok(self)
    }

    pub fn build(self) -> KeySystemRegistry {
        KeySystemRegistry {
            entries: self.entries,
            clear_key: self.clear_key,
        }
    }
}
