use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{InspectPsshCommand, MatchManifestCommand, RequestLicenseCommand};

/**
    DRM key system and license tool.
*/
#[derive(Parser)]
#[command(name = "drm-cli")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect PSSH boxes and match them against the supported key systems.
    InspectPssh(InspectPsshCommand),
    /// Match manifest content protection descriptors against the supported key systems.
    MatchManifest(MatchManifestCommand),
    /// Send a CDM message to a license server.
    RequestLicense(RequestLicenseCommand),
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::InspectPssh(cmd) => cmd.run(),
            Command::MatchManifest(cmd) => cmd.run(),
            Command::RequestLicense(cmd) => cmd.run().await,
        }
    }
}
