use serde::Deserialize;

use super::{LicenseServerAdapter, RawResponse, ResponseEncoding};
use crate::clearkey::{JsonWebKey, JsonWebKeySet, requested_key_ids};
use crate::error::DecodeError;
use crate::message::MessageType;
use crate::transport::HttpMethod;

/**
    Clear-key license server.

    Key IDs travel in the query string of a GET request and keys come back
    as JSON, which is normalized into the JWK set the CDM expects.
*/
#[derive(Debug, Default, Clone, Copy)]
pub struct ClearKeyLicenseServer;

#[derive(Debug, Deserialize)]
struct ServerKey {
    kid: String,
    k: String,
}

#[derive(Debug, Deserialize)]
struct ServerKeySet {
    keys: Option<Vec<ServerKey>>,
}

impl LicenseServerAdapter for ClearKeyLicenseServer {
    fn name(&self) -> &str {
        "clearkey"
    }

    /**
        `<base>/?<kid>&<kid>` for license requests.
    */
    fn resolve_url(&self, base: &str, message: &[u8], message_type: MessageType) -> Option<String> {
        if message_type != MessageType::LicenseRequest {
            return Some(base.to_string());
        }
        let kids = requested_key_ids(message).ok()?;
        if kids.is_empty() {
            return None;
        }
        Some(format!("{base}/?{}", kids.join("&")))
    }

    fn http_method(&self, _message_type: MessageType) -> HttpMethod {
        HttpMethod::Get
    }

    fn response_encoding(
        &self,
        _system_string: &str,
        _message_type: MessageType,
    ) -> ResponseEncoding {
        ResponseEncoding::Json
    }

    fn decode_license(
        &self,
        response: &RawResponse,
        _system_string: &str,
        _message_type: MessageType,
    ) -> Result<Vec<u8>, DecodeError> {
        let keys = response
            .json::<ServerKeySet>()?
            .keys
            .ok_or(DecodeError::MissingField("keys"))?;

        let set = JsonWebKeySet::new(
            keys.iter()
                .map(|key| JsonWebKey::new(&key.kid, &key.k))
                .collect(),
        );
        set.content_keys()?;
        set.to_json()
            .map_err(|e| DecodeError::InvalidJson(e.to_string()))
    }
}
