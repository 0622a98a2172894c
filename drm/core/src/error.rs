use thiserror::Error;

use crate::types::SystemId;

/**
    Errors from PSSH box parsing.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PsshError {
    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    #[error("malformed PSSH box at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    #[error("PSSH system ID is {0}, expected {1}")]
    SystemIdMismatch(SystemId, SystemId),
}

impl PsshError {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            offset,
            reason: reason.into(),
        }
    }
}

/**
    Errors raised while building a [`KeySystemRegistry`](crate::KeySystemRegistry).
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("key system '{0}' is already registered")]
    DuplicateSystemString(String),

    #[error("system ID {0} is already registered")]
    DuplicateSystemId(SystemId),

    #[error("cannot designate unregistered key system '{0}' as clear key")]
    UnknownClearKey(String),
}

/**
    Errors from decoding a CDM key message.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("invalid XML: {0}")]
    InvalidXml(String),

    #[error("invalid challenge encoding: {0}")]
    InvalidChallenge(String),

    #[error("invalid key ID message: {0}")]
    InvalidKeyIds(String),
}

/**
    Errors from constructing or parsing a [`ContentKey`](crate::ContentKey).
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentKeyError {
    #[error("key ID must be 16 bytes, got {0}")]
    InvalidKidLength(usize),

    #[error("key must not be empty")]
    EmptyKey,

    #[error("invalid base64url: {0}")]
    InvalidBase64(String),
}

/**
    Error returned by `FromStr` implementations on enum types.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}
