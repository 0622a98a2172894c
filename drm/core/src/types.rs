use core::fmt;
use core::str::FromStr;

use crate::error::{ContentKeyError, ParseError};
use crate::utils::{base64url_decode, base64url_encode, bytes_equal, parse_kid};

/**
    DRM content protection system identifier.

    Recognizes the major DRM systems by their DASH-IF registered UUIDs.
    Unrecognized system IDs are captured in the `Unknown` variant, so any
    16-byte identifier round-trips through this type unchanged.

    Reference: <https://dashif.org/identifiers/content_protection/>
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemId {
    Widevine,
    PlayReady,
    FairPlay,
    ClearKey,
    Unknown([u8; 16]),
}

impl SystemId {
    /**
        Identify a DRM system from its 16-byte UUID.
    */
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        use crate::constants::*;
        if bytes_equal(&bytes, &WIDEVINE_SYSTEM_ID) {
            Self::Widevine
        } else if bytes_equal(&bytes, &PLAYREADY_SYSTEM_ID) {
            Self::PlayReady
        } else if bytes_equal(&bytes, &FAIRPLAY_SYSTEM_ID) {
            Self::FairPlay
        } else if bytes_equal(&bytes, &CLEARKEY_SYSTEM_ID) {
            Self::ClearKey
        } else {
            Self::Unknown(bytes)
        }
    }

    /**
        Return the raw 16-byte UUID for this system.
    */
    pub const fn to_bytes(self) -> [u8; 16] {
        use crate::constants::*;
        match self {
            Self::Widevine => WIDEVINE_SYSTEM_ID,
            Self::PlayReady => PLAYREADY_SYSTEM_ID,
            Self::FairPlay => FAIRPLAY_SYSTEM_ID,
            Self::ClearKey => CLEARKEY_SYSTEM_ID,
            Self::Unknown(bytes) => bytes,
        }
    }

    pub const fn to_name(self) -> &'static str {
        match self {
            Self::Widevine => "Widevine",
            Self::PlayReady => "PlayReady",
            Self::FairPlay => "FairPlay",
            Self::ClearKey => "ClearKey",
            Self::Unknown(_) => "Unknown",
        }
    }

    /**
        Parse a UUID string into a `SystemId`.

        Accepts both hyphenated (`edef8ba9-79d6-4ace-a3c8-27dcd51d21ed`) and
        plain (`edef8ba979d64acea3c827dcd51d21ed`) formats, and an optional
        `urn:uuid:` prefix as found in DASH scheme URIs. Hex digits are
        case-insensitive.
    */
    pub fn from_uuid(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = match s.get(..9) {
            Some(prefix) if prefix.eq_ignore_ascii_case("urn:uuid:") => &s[9..],
            _ => s,
        };
        parse_kid(s).map(Self::from_bytes)
    }

    /**
        Format as a standard UUID string (`xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`).
    */
    pub fn to_uuid(self) -> String {
        let hex = hex::encode(self.to_bytes());
        format!(
            "{}-{}-{}-{}-{}",
            &hex[..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..]
        )
    }

    pub const fn is_known(self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    pub const fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.to_name(), self.to_uuid())
    }
}

impl FromStr for SystemId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_uuid(s).ok_or_else(|| ParseError {
            kind: "system ID",
            value: s.to_owned(),
        })
    }
}

/**
    A content key pair as carried by clear-key protection data and JWK sets.

    `Display` prints `kid_hex:key_hex`.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentKey {
    kid: [u8; 16],
    key: Vec<u8>,
}

impl ContentKey {
    pub fn new(kid: impl AsRef<[u8]>, key: impl AsRef<[u8]>) -> Result<Self, ContentKeyError> {
        let kid_bytes: &[u8] = kid.as_ref();
        let kid: [u8; 16] = kid_bytes
            .try_into()
            .map_err(|_| ContentKeyError::InvalidKidLength(kid_bytes.len()))?;
        let key: &[u8] = key.as_ref();
        if key.is_empty() {
            return Err(ContentKeyError::EmptyKey);
        }
        Ok(Self {
            kid,
            key: key.to_vec(),
        })
    }

    /**
        Build a key pair from base64url `kid` and `k` values, the encoding
        used by JWK sets and by clear-key protection data.
    */
    pub fn from_base64url(kid: &str, key: &str) -> Result<Self, ContentKeyError> {
        let kid = base64url_decode(kid)
            .map_err(|e| ContentKeyError::InvalidBase64(format!("kid: {e}")))?;
        let key = base64url_decode(key)
            .map_err(|e| ContentKeyError::InvalidBase64(format!("key: {e}")))?;
        Self::new(kid, key)
    }

    pub fn kid(&self) -> [u8; 16] {
        self.kid
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn kid_base64url(&self) -> String {
        base64url_encode(&self.kid)
    }

    pub fn key_base64url(&self) -> String {
        base64url_encode(&self.key)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", hex::encode(self.kid), hex::encode(&self.key))
    }
}
