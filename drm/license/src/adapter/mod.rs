mod clearkey;
mod drmtoday;
mod playready;
mod widevine;

use core::fmt;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use drm_core::{CLEARKEY_KEY_SYSTEM, PLAYREADY_KEY_SYSTEM, WIDEVINE_KEY_SYSTEM};

use crate::error::DecodeError;
use crate::message::MessageType;
use crate::transport::{HttpMethod, HttpResponse};

pub use self::clearkey::ClearKeyLicenseServer;
pub use self::drmtoday::{DRMTODAY_PROVIDER, DrmTodayLicenseServer};
pub use self::playready::PlayReadyLicenseServer;
pub use self::widevine::WidevineLicenseServer;

/**
    How the body of a license response is meant to be read.
*/
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ResponseEncoding {
    #[default]
    Binary,
    Json,
    Text,
}

/**
    A license server response as handed to an adapter.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub status_text: String,
    pub encoding: ResponseEncoding,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(response: HttpResponse, encoding: ResponseEncoding) -> Self {
        Self {
            status: response.status,
            status_text: response.status_text,
            encoding,
            body: response.body,
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, DecodeError> {
        serde_json::from_slice(&self.body).map_err(|e| DecodeError::InvalidJson(e.to_string()))
    }
}

/**
    Protocol of one license server flavor.

    The dispatcher consults an adapter for everything that differs between
    servers. The defaults describe a plain binary POST exchange.
*/
pub trait LicenseServerAdapter: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /**
        Final request URL for `base`, possibly derived from the message.
        `None` means no usable URL.
    */
    fn resolve_url(
        &self,
        base: &str,
        _message: &[u8],
        _message_type: MessageType,
    ) -> Option<String> {
        Some(base.to_string())
    }

    fn http_method(&self, _message_type: MessageType) -> HttpMethod {
        HttpMethod::Post
    }

    fn response_encoding(
        &self,
        _system_string: &str,
        _message_type: MessageType,
    ) -> ResponseEncoding {
        ResponseEncoding::Binary
    }

    /**
        Payload to hand back to the CDM for a successful response.
    */
    fn decode_license(
        &self,
        response: &RawResponse,
        _system_string: &str,
        _message_type: MessageType,
    ) -> Result<Vec<u8>, DecodeError> {
        Ok(response.body.to_vec())
    }

    /**
        Human readable error extracted from a failed response.
    */
    fn decode_error(
        &self,
        response: &RawResponse,
        _system_string: &str,
        _message_type: MessageType,
    ) -> String {
        response.text().into_owned()
    }
}

/**
    Adapters by provider identity: a key system string or a provider marker.
*/
#[derive(Debug, Clone, Default)]
pub struct AdapterTable {
    adapters: HashMap<String, Arc<dyn LicenseServerAdapter>>,
}

impl AdapterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /**
        Widevine, PlayReady and clear-key servers under their key system
        strings, plus DRMtoday under its provider marker.
    */
    pub fn with_defaults() -> Self {
        Self::new()
            .with(WIDEVINE_KEY_SYSTEM, WidevineLicenseServer)
            .with(PLAYREADY_KEY_SYSTEM, PlayReadyLicenseServer)
            .with(CLEARKEY_KEY_SYSTEM, ClearKeyLicenseServer)
            .with(DRMTODAY_PROVIDER, DrmTodayLicenseServer)
    }

    pub fn with(
        mut self,
        identity: impl Into<String>,
        adapter: impl LicenseServerAdapter + 'static,
    ) -> Self {
        self.register(identity, Arc::new(adapter));
        self
    }

    /**
        Register an adapter, returning the one previously bound to `identity`.
    */
    pub fn register(
        &mut self,
        identity: impl Into<String>,
        adapter: Arc<dyn LicenseServerAdapter>,
    ) -> Option<Arc<dyn LicenseServerAdapter>> {
        self.adapters.insert(identity.into(), adapter)
    }

    pub fn resolve(&self, identity: &str) -> Option<Arc<dyn LicenseServerAdapter>> {
        self.adapters.get(identity).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
