use core::fmt;
use std::time::Duration;

use thiserror::Error;

use drm_core::{ContentKeyError, MessageError};

use crate::transport::{ExchangeSnapshot, ReadyState};

/**
    Coarse classification of a failed license request.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Decode,
    Transport,
}

/**
    What is known about a license exchange at the moment it ended.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportDiagnostic {
    pub url: String,
    pub status: Option<u16>,
    pub status_text: String,
    pub ready_state: ReadyState,
    /// Error body as decoded by the license server adapter.
    pub body: Option<String>,
}

impl TransportDiagnostic {
    pub fn from_snapshot(url: impl Into<String>, snapshot: ExchangeSnapshot) -> Self {
        Self {
            url: url.into(),
            status: snapshot.status,
            status_text: snapshot.status_text,
            ready_state: snapshot.ready_state,
            body: None,
        }
    }
}

impl fmt::Display for TransportDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {status}")?,
            None => f.write_str("no status")?,
        }
        if !self.status_text.is_empty() {
            write!(f, " {}", self.status_text)?;
        }
        write!(f, " (ready state {}) from {}", self.ready_state, self.url)?;
        if let Some(body) = self.body.as_deref()
            && !body.is_empty()
        {
            write!(f, ": {body}")?;
        }
        Ok(())
    }
}

/**
    Errors raised by a license server adapter while decoding a response.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    #[error("license server fault: {0}")]
    ServerFault(String),

    #[error("invalid key: {0}")]
    InvalidKey(#[from] ContentKeyError),
}

/**
    Errors from formatting clear keys embedded in protection data.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClearKeyError {
    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("key ID '{0}' is not known")]
    UnknownKeyId(String),

    #[error("invalid clear key for '{kid}': {source}")]
    InvalidKey {
        kid: String,
        source: ContentKeyError,
    },

    #[error("failed to encode key set: {0}")]
    Encode(String),
}

/**
    Failure of a single license request, carried in its terminal event.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LicenseRequestError {
    // ── Configuration ──
    #[error("unresolved key system '{0}'")]
    UnresolvedKeySystem(String),

    #[error("no license server URL")]
    MissingLicenseUrl,

    #[error("invalid license server URL '{url}': {reason}")]
    InvalidLicenseUrl { url: String, reason: String },

    // ── Decode ──
    #[error("invalid CDM message: {0}")]
    InvalidMessage(#[from] MessageError),

    #[error("clear key decode failed: {0}")]
    ClearKeyDecode(#[from] ClearKeyError),

    #[error("license decode failed: {0}")]
    LicenseDecode(#[from] DecodeError),

    // ── Transport ──
    #[error("license server error: {0}")]
    ServerStatus(TransportDiagnostic),

    #[error("license request aborted: {0}")]
    TransportAborted(TransportDiagnostic),

    #[error("license request failed: {reason}: {diagnostic}")]
    TransportFailed {
        reason: String,
        diagnostic: TransportDiagnostic,
    },

    #[error("license request timed out after {timeout:?}: {diagnostic}")]
    TimedOut {
        timeout: Duration,
        diagnostic: TransportDiagnostic,
    },
}

impl LicenseRequestError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnresolvedKeySystem(_)
            | Self::MissingLicenseUrl
            | Self::InvalidLicenseUrl { .. } => ErrorKind::Configuration,
            Self::InvalidMessage(_) | Self::ClearKeyDecode(_) | Self::LicenseDecode(_) => {
                ErrorKind::Decode
            }
            Self::ServerStatus(_)
            | Self::TransportAborted(_)
            | Self::TransportFailed { .. }
            | Self::TimedOut { .. } => ErrorKind::Transport,
        }
    }

    /**
        The exchange diagnostic, for transport-level failures.
    */
    pub fn diagnostic(&self) -> Option<&TransportDiagnostic> {
        match self {
            Self::ServerStatus(d)
            | Self::TransportAborted(d)
            | Self::TransportFailed { diagnostic: d, .. }
            | Self::TimedOut { diagnostic: d, .. } => Some(d),
            _ => None,
        }
    }
}

/**
    Errors from building a [`LicenseRequestDispatcher`](crate::LicenseRequestDispatcher).
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatcherError {
    #[error("no tokio runtime available to run license requests on")]
    NoRuntime,
}
