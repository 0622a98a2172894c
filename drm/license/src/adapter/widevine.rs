use super::LicenseServerAdapter;

/**
    Widevine license proxy: the challenge is POSTed as is and the response
    body is the license.
*/
#[derive(Debug, Default, Clone, Copy)]
pub struct WidevineLicenseServer;

impl LicenseServerAdapter for WidevineLicenseServer {
    fn name(&self) -> &str {
        "widevine"
    }
}
