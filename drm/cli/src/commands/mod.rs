mod inspect_pssh;
mod match_manifest;
mod request_license;

pub use self::inspect_pssh::InspectPsshCommand;
pub use self::match_manifest::MatchManifestCommand;
pub use self::request_license::RequestLicenseCommand;
