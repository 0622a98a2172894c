use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::MP4_PROTECTION_SCHEME_ID_URI;
use crate::init_data::KeySystemMatch;
use crate::registry::KeySystemRegistry;
use crate::utils::eq_ignore_ascii_case;

/**
    A manifest `ContentProtection` descriptor, reduced to the fields the
    key systems read. Field names follow the DASH attribute / element names
    so descriptor lists can be deserialized straight from JSON.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentProtection {
    pub scheme_id_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// `cenc:default_KID`
    #[serde(
        default,
        rename = "default_KID",
        alias = "defaultKid",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_kid: Option<String>,
    /// `cenc:pssh`, base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pssh: Option<String>,
    /// `mspr:pro`, base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pro: Option<String>,
    /// `dashif:laurl` / `ms:laurl`
    #[serde(
        default,
        rename = "laurl",
        alias = "laUrl",
        skip_serializing_if = "Option::is_none"
    )]
    pub la_url: Option<String>,
}

impl ContentProtection {
    pub fn new(scheme_id_uri: impl Into<String>) -> Self {
        Self {
            scheme_id_uri: scheme_id_uri.into(),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_default_kid(mut self, kid: impl Into<String>) -> Self {
        self.default_kid = Some(kid.into());
        self
    }

    pub fn with_pssh(mut self, pssh: impl Into<String>) -> Self {
        self.pssh = Some(pssh.into());
        self
    }

    pub fn with_pro(mut self, pro: impl Into<String>) -> Self {
        self.pro = Some(pro.into());
        self
    }

    pub fn with_la_url(mut self, url: impl Into<String>) -> Self {
        self.la_url = Some(url.into());
        self
    }

    /**
        Whether this is the common encryption (`mp4protection` + `cenc`) descriptor.
    */
    pub fn is_cenc(&self) -> bool {
        eq_ignore_ascii_case(&self.scheme_id_uri, MP4_PROTECTION_SCHEME_ID_URI)
            && self
                .value
                .as_deref()
                .is_some_and(|v| v.eq_ignore_ascii_case("cenc"))
    }
}

/**
    Locate the common encryption descriptor in a list.
*/
pub fn find_cenc_descriptor(descriptors: &[ContentProtection]) -> Option<&ContentProtection> {
    descriptors.iter().find(|cp| cp.is_cenc())
}

/**
    Match manifest descriptors against the registry.

    Iterates the registry in priority order and, for each entry, every
    descriptor whose scheme URI equals the entry's (ASCII case-insensitive).
    Descriptors for which the key system derives no init data are skipped.
    A descriptor's `laurl` becomes the match's license URL.
    The result order follows registry priority, never manifest order.
*/
pub fn match_content_protection(
    descriptors: &[ContentProtection],
    registry: &KeySystemRegistry,
) -> Vec<KeySystemMatch> {
    let cenc = find_cenc_descriptor(descriptors);
    let mut matches = Vec::new();

    for key_system in registry.iter() {
        for descriptor in descriptors {
            if !eq_ignore_ascii_case(&descriptor.scheme_id_uri, key_system.scheme_id_uri()) {
                continue;
            }
            match key_system.capabilities().init_data(descriptor, cenc) {
                Some(init_data) => matches.push(KeySystemMatch::new(
                    key_system,
                    init_data,
                    descriptor.la_url.clone(),
                )),
                None => debug!(
                    key_system = key_system.system_string(),
                    "descriptor matched but yielded no init data"
                ),
            }
        }
    }

    matches
}
