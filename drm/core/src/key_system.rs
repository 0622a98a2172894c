use core::fmt;

use serde::Serialize;
use tracing::warn;

use crate::error::MessageError;
use crate::playready::{self, PlayReadyKeyMessage};
use crate::protection::ContentProtection;
use crate::pssh::PsshBox;
use crate::types::SystemId;
use crate::utils::{base64url_encode, decode_base64_lenient, parse_kid};

/**
    Key-system specific behavior attached to a registry entry.

    Implementations translate between manifest / CDM representations and what
    a license server expects. Everything here is synchronous and pure.
*/
pub trait KeySystemCapabilities: Send + Sync + fmt::Debug {
    /**
        Initialization data for a manifest descriptor that matched this key
        system. `cenc` is the common `mp4protection` descriptor of the same
        adaptation set, if any. `None` means the descriptor yields nothing usable.
    */
    fn init_data(
        &self,
        descriptor: &ContentProtection,
        cenc: Option<&ContentProtection>,
    ) -> Option<Vec<u8>>;

    /**
        Body to send to the license server for a CDM message.
    */
    fn license_request(&self, message: &[u8]) -> Result<Vec<u8>, MessageError> {
        Ok(message.to_vec())
    }

    /**
        Request headers carried inside a CDM message.
    */
    fn request_headers(&self, _message: &[u8]) -> Result<Vec<(String, String)>, MessageError> {
        Ok(Vec::new())
    }

    /**
        License server URL embedded in initialization data, if the format has one.
    */
    fn license_url_from_init_data(&self, _init_data: &[u8]) -> Option<String> {
        None
    }
}

/**
    Decode the `cenc:pssh` element of a descriptor into box bytes.
*/
pub fn pssh_from_descriptor(descriptor: &ContentProtection) -> Option<Vec<u8>> {
    let encoded = descriptor.pssh.as_deref()?;
    match decode_base64_lenient(encoded) {
        Ok(bytes) if !bytes.is_empty() => Some(bytes),
        Ok(_) => None,
        Err(e) => {
            warn!(scheme = %descriptor.scheme_id_uri, "ignoring undecodable cenc:pssh: {e}");
            None
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WidevineCapabilities;

impl KeySystemCapabilities for WidevineCapabilities {
    fn init_data(
        &self,
        descriptor: &ContentProtection,
        _: Option<&ContentProtection>,
    ) -> Option<Vec<u8>> {
        pssh_from_descriptor(descriptor)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlayReadyCapabilities;

impl KeySystemCapabilities for PlayReadyCapabilities {
    fn init_data(
        &self,
        descriptor: &ContentProtection,
        _: Option<&ContentProtection>,
    ) -> Option<Vec<u8>> {
        if let Some(pro) = descriptor.pro.as_deref() {
            match decode_base64_lenient(pro) {
                Ok(pro) if !pro.is_empty() => {
                    return Some(PsshBox::new(SystemId::PlayReady, pro).to_bytes());
                }
                Ok(_) => {}
                Err(e) => warn!("ignoring undecodable mspr:pro: {e}"),
            }
        }
        pssh_from_descriptor(descriptor)
    }

    fn license_request(&self, message: &[u8]) -> Result<Vec<u8>, MessageError> {
        Ok(match PlayReadyKeyMessage::parse(message)? {
            Some(parsed) => parsed.challenge,
            None => message.to_vec(),
        })
    }

    fn request_headers(&self, message: &[u8]) -> Result<Vec<(String, String)>, MessageError> {
        let headers = PlayReadyKeyMessage::parse(message)?
            .map(|parsed| parsed.headers)
            .unwrap_or_default();
        if headers.is_empty() {
            Ok(playready::default_request_headers())
        } else {
            Ok(headers)
        }
    }

    fn license_url_from_init_data(&self, init_data: &[u8]) -> Option<String> {
        playready::license_url_from_init_data(init_data)
    }
}

/**
    Clear-key init data in the W3C `keyids` format.
*/
#[derive(Debug, Serialize)]
struct KeyIdsInitData {
    kids: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ClearKeyCapabilities;

impl KeySystemCapabilities for ClearKeyCapabilities {
    fn init_data(
        &self,
        descriptor: &ContentProtection,
        cenc: Option<&ContentProtection>,
    ) -> Option<Vec<u8>> {
        if let Some(pssh) = pssh_from_descriptor(descriptor) {
            return Some(pssh);
        }
        let kid = descriptor
            .default_kid
            .as_deref()
            .or_else(|| cenc.and_then(|c| c.default_kid.as_deref()))?;
        let Some(kid) = parse_kid(kid) else {
            warn!(kid, "ignoring malformed default_KID");
            return None;
        };
        let init = KeyIdsInitData {
            kids: vec![base64url_encode(&kid)],
        };
        serde_json::to_vec(&init).ok()
    }
}
