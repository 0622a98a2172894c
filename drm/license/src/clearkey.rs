/*!
    W3C clear-key key sets.

    A clear-key CDM asks for keys with a `{"kids": [...]}` message and
    accepts them as a JSON Web Key set. Keys can come from a license server
    or straight from protection data.
*/

use serde::{Deserialize, Serialize};
use tracing::debug;

use drm_core::{ContentKey, MessageError};

use crate::error::ClearKeyError;
use crate::protection_data::ProtectionData;

const KEY_TYPE: &str = "oct";
const KEY_ALGORITHM: &str = "A128KW";
const SESSION_TYPE: &str = "temporary";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    pub kid: String,
    pub k: String,
}

impl JsonWebKey {
    /**
        A symmetric key entry. Padding is stripped from both values.
    */
    pub fn new(kid: &str, k: &str) -> Self {
        Self {
            kty: KEY_TYPE.to_string(),
            alg: Some(KEY_ALGORITHM.to_string()),
            kid: kid.trim_end_matches('=').to_string(),
            k: k.trim_end_matches('=').to_string(),
        }
    }

    pub fn content_key(&self) -> Result<ContentKey, drm_core::ContentKeyError> {
        ContentKey::from_base64url(&self.kid, &self.k)
    }
}

impl From<&ContentKey> for JsonWebKey {
    fn from(key: &ContentKey) -> Self {
        Self::new(&key.kid_base64url(), &key.key_base64url())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
    #[serde(rename = "type", default = "default_session_type")]
    pub session_type: String,
}

fn default_session_type() -> String {
    SESSION_TYPE.to_string()
}

impl JsonWebKeySet {
    pub fn new(keys: Vec<JsonWebKey>) -> Self {
        Self {
            keys,
            session_type: default_session_type(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn content_keys(&self) -> Result<Vec<ContentKey>, drm_core::ContentKeyError> {
        self.keys.iter().map(JsonWebKey::content_key).collect()
    }
}

#[derive(Debug, Deserialize)]
struct KeyIdsMessage {
    kids: Vec<String>,
}

/**
    Key IDs requested by a clear-key `keyids` message, base64url encoded.
*/
pub fn requested_key_ids(message: &[u8]) -> Result<Vec<String>, MessageError> {
    let parsed: KeyIdsMessage =
        serde_json::from_slice(message).map_err(|e| MessageError::InvalidKeyIds(e.to_string()))?;
    Ok(parsed.kids)
}

/**
    Answer a clear-key message from keys embedded in protection data.

    Every requested key ID must have an embedded key; the first one without
    fails the whole message.
*/
pub fn local_key_set(
    message: &[u8],
    protection_data: &ProtectionData,
) -> Result<JsonWebKeySet, ClearKeyError> {
    let kids = requested_key_ids(message)?;
    debug!(requested = kids.len(), "formatting embedded clear keys");

    let mut keys = Vec::with_capacity(kids.len());
    for kid in &kids {
        let key = protection_data
            .clear_key(kid)
            .ok_or_else(|| ClearKeyError::UnknownKeyId(kid.clone()))?;
        let key = ContentKey::from_base64url(kid, key).map_err(|source| {
            ClearKeyError::InvalidKey {
                kid: kid.clone(),
                source,
            }
        })?;
        keys.push(JsonWebKey::from(&key));
    }

    Ok(JsonWebKeySet::new(keys))
}
