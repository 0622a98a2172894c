use core::fmt;
use core::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use drm_core::ParseError;

use crate::error::LicenseRequestError;

/**
    Kind of a CDM message, as reported by the session that produced it.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    LicenseRequest,
    LicenseRenewal,
    LicenseRelease,
    IndividualizationRequest,
}

impl MessageType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LicenseRequest => "license-request",
            Self::LicenseRenewal => "license-renewal",
            Self::LicenseRelease => "license-release",
            Self::IndividualizationRequest => "individualization-request",
        }
    }

    /**
        Whether a license server is contacted for this kind of message.
        Releases and individualization requests complete locally.
    */
    pub const fn requires_network(self) -> bool {
        matches!(self, Self::LicenseRequest | Self::LicenseRenewal)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "license-request" => Ok(Self::LicenseRequest),
            "license-renewal" => Ok(Self::LicenseRenewal),
            "license-release" => Ok(Self::LicenseRelease),
            "individualization-request" => Ok(Self::IndividualizationRequest),
            _ => Err(ParseError {
                kind: "message type",
                value: s.to_owned(),
            }),
        }
    }
}

/**
    A message emitted by the CDM that has to reach a license server.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseMessage {
    pub message_type: MessageType,
    pub data: Bytes,
}

impl LicenseMessage {
    pub fn new(message_type: MessageType, data: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            data: data.into(),
        }
    }

    pub fn license_request(data: impl Into<Bytes>) -> Self {
        Self::new(MessageType::LicenseRequest, data)
    }
}

/**
    Opaque handle of the decryption session a request belongs to.

    Threaded through the dispatcher unchanged; clones are cheap.
*/
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(Arc<str>);

impl SessionToken {
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for SessionToken {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

/**
    Terminal event of one license request.

    Exactly one is published per dispatched request. A successful release
    carries neither payload nor error.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRequestResult {
    pub session_token: SessionToken,
    pub message_type: MessageType,
    pub payload: Option<Bytes>,
    pub error: Option<LicenseRequestError>,
}

impl LicenseRequestResult {
    pub fn completed(
        session_token: SessionToken,
        message_type: MessageType,
        payload: Option<Bytes>,
    ) -> Self {
        Self {
            session_token,
            message_type,
            payload,
            error: None,
        }
    }

    pub fn failed(
        session_token: SessionToken,
        message_type: MessageType,
        error: LicenseRequestError,
    ) -> Self {
        Self {
            session_token,
            message_type,
            payload: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_round_trips_through_strings() {
        for ty in [
            MessageType::LicenseRequest,
            MessageType::LicenseRenewal,
            MessageType::LicenseRelease,
            MessageType::IndividualizationRequest,
        ] {
            assert_eq!(ty.to_string().parse::<MessageType>(), Ok(ty));
            let json = serde_json::to_string(&ty).unwrap();
            assert_eq!(json, format!("\"{ty}\""));
        }
        let err = "license-renew".parse::<MessageType>().unwrap_err();
        assert_eq!(err.value, "license-renew");
    }

    #[test]
    fn only_requests_and_renewals_reach_the_network() {
        assert!(MessageType::LicenseRequest.requires_network());
        assert!(MessageType::LicenseRenewal.requires_network());
        assert!(!MessageType::LicenseRelease.requires_network());
        assert!(!MessageType::IndividualizationRequest.requires_network());
    }

    #[test]
    fn session_token_clones_share_storage() {
        let token = SessionToken::from("session-1");
        let clone = token.clone();
        assert_eq!(token, clone);
        assert!(std::ptr::eq(token.as_str(), clone.as_str()));
    }
}
