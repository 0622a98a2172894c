use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::adapter::DRMTODAY_PROVIDER;

/**
    Caller supplied license configuration for one key system.

    Field names follow the player-side JSON convention (`serverURL`,
    `httpRequestHeaders`, `withCredentials`, `clearkeys`, `drmtoday`), so
    existing protection data documents deserialize as is.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionData {
    /// Overrides any license URL from the manifest or init data.
    #[serde(
        default,
        rename = "serverURL",
        alias = "serverUrl",
        skip_serializing_if = "Option::is_none"
    )]
    pub server_url: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub http_request_headers: BTreeMap<String, String>,

    #[serde(default)]
    pub with_credentials: bool,

    /// base64url key ID to base64url key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub clearkeys: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "core::ops::Not::not")]
    pub drmtoday: bool,

    /// Explicit license server adapter identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_provider: Option<String>,
}

impl ProtectionData {
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.http_request_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    pub fn with_clear_key(mut self, kid: impl Into<String>, key: impl Into<String>) -> Self {
        self.clearkeys.insert(kid.into(), key.into());
        self
    }

    pub fn with_license_provider(mut self, provider: impl Into<String>) -> Self {
        self.license_provider = Some(provider.into());
        self
    }

    /**
        Adapter identity selected by this configuration, if any.

        An explicit `licenseProvider` wins over the `drmtoday` flag.
    */
    pub fn provider_marker(&self) -> Option<&str> {
        match self.license_provider.as_deref() {
            Some(provider) if !provider.is_empty() => Some(provider),
            _ if self.drmtoday => Some(DRMTODAY_PROVIDER),
            _ => None,
        }
    }

    /**
        Server URL override, ignoring an empty string.
    */
    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref().filter(|url| !url.is_empty())
    }

    pub fn has_clear_keys(&self) -> bool {
        !self.clearkeys.is_empty()
    }

    /**
        Embedded clear key for a base64url key ID. Padding is ignored on
        both sides of the comparison.
    */
    pub fn clear_key(&self, kid: &str) -> Option<&str> {
        let kid = kid.trim_end_matches('=');
        self.clearkeys
            .iter()
            .find(|(k, _)| k.trim_end_matches('=') == kid)
            .map(|(_, v)| v.as_str())
    }
}
