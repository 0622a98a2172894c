use data_encoding::BASE64;
use serde::Deserialize;

use drm_core::WIDEVINE_KEY_SYSTEM;

use super::{LicenseServerAdapter, RawResponse, ResponseEncoding};
use crate::error::DecodeError;
use crate::message::MessageType;

/// Provider marker selecting [`DrmTodayLicenseServer`].
pub const DRMTODAY_PROVIDER: &str = "drmtoday";

/**
    castLabs DRMtoday. Widevine licenses are wrapped in a JSON envelope;
    every other key system gets the raw license back.
*/
#[derive(Debug, Default, Clone, Copy)]
pub struct DrmTodayLicenseServer;

#[derive(Debug, Deserialize)]
struct WidevineEnvelope {
    license: Option<String>,
}

impl LicenseServerAdapter for DrmTodayLicenseServer {
    fn name(&self) -> &str {
        DRMTODAY_PROVIDER
    }

    fn response_encoding(
        &self,
        system_string: &str,
        _message_type: MessageType,
    ) -> ResponseEncoding {
        if system_string == WIDEVINE_KEY_SYSTEM {
            ResponseEncoding::Json
        } else {
            ResponseEncoding::Binary
        }
    }

    fn decode_license(
        &self,
        response: &RawResponse,
        system_string: &str,
        message_type: MessageType,
    ) -> Result<Vec<u8>, DecodeError> {
        match self.response_encoding(system_string, message_type) {
            ResponseEncoding::Json => {
                let license = response
                    .json::<WidevineEnvelope>()?
                    .license
                    .ok_or(DecodeError::MissingField("license"))?;
                BASE64
                    .decode(license.as_bytes())
                    .map_err(|e| DecodeError::InvalidBase64(e.to_string()))
            }
            ResponseEncoding::Binary | ResponseEncoding::Text => Ok(response.body.to_vec()),
        }
    }
}
