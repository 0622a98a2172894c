use std::collections::HashMap;

use crate::error::PsshError;
use crate::pssh::parse_initialization_box_list;
use crate::registry::{KeySystemDescriptor, KeySystemRegistry};
use crate::types::SystemId;
use crate::utils::bytes_equal;

/**
    A supported key system together with the initialization data a CDM
    session for it should be created with.

    `license_url` is the license server named by the manifest or, failing
    that, by the init data itself. It is meant as the fallback URL of a
    license request.
*/
#[derive(Debug, Clone)]
pub struct KeySystemMatch {
    pub key_system: KeySystemDescriptor,
    pub init_data: Vec<u8>,
    pub license_url: Option<String>,
}

impl KeySystemMatch {
    pub(crate) fn new(
        key_system: &KeySystemDescriptor,
        init_data: Vec<u8>,
        license_url: Option<String>,
    ) -> Self {
        let license_url = license_url
            .filter(|url| !url.is_empty())
            .or_else(|| key_system.capabilities().license_url_from_init_data(&init_data));
        Self {
            key_system: key_system.clone(),
            init_data,
            license_url,
        }
    }
}

/**
    Match the PSSH boxes in `buffer` against the registry.

    Returns one entry per registered key system whose system ID occurs in the
    buffer, in registry priority order. The init data is the complete PSSH box
    for that system; if the buffer carries several, the last one is used.
*/
pub fn match_against_registry(
    buffer: &[u8],
    registry: &KeySystemRegistry,
) -> Result<Vec<KeySystemMatch>, PsshError> {
    let records = parse_initialization_box_list(buffer)?;

    let mut boxes: HashMap<SystemId, &[u8]> = HashMap::with_capacity(records.len());
    for record in &records {
        boxes.insert(record.pssh.system_id(), record.box_bytes(buffer));
    }

    Ok(registry
        .iter()
        .filter_map(|key_system| {
            boxes
                .get(&key_system.system_id())
                .map(|bytes| KeySystemMatch::new(key_system, bytes.to_vec(), None))
        })
        .collect())
}

/**
    Byte-wise equality of two init data buffers.
*/
pub fn init_data_equals(a: &[u8], b: &[u8]) -> bool {
    bytes_equal(a, b)
}
