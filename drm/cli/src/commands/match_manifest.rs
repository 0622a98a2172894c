use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use data_encoding::BASE64;

use drm_core::{ContentProtection, KeySystemRegistry};

/**
    Match manifest content protection descriptors against the supported key
    systems.
*/
#[derive(Args)]
pub struct MatchManifestCommand {
    /// JSON array of descriptors (`schemeIdUri`, `value`, `default_KID`, `pssh`, `pro`, `laurl`).
    pub descriptors: PathBuf,
}

impl MatchManifestCommand {
    pub fn run(self) -> Result<()> {
        let json = std::fs::read_to_string(&self.descriptors)
            .with_context(|| format!("failed to read {}", self.descriptors.display()))?;
        let descriptors: Vec<ContentProtection> =
            serde_json::from_str(&json).context("failed to parse descriptors")?;

        let registry = KeySystemRegistry::with_defaults();
        let matches = drm_core::match_content_protection(&descriptors, &registry);
        tracing::debug!(
            descriptors = descriptors.len(),
            matches = matches.len(),
            "matched content protection"
        );

        if matches.is_empty() {
            eprintln!("No supported key system in {} descriptors.", descriptors.len());
            return Ok(());
        }

        for m in &matches {
            println!("{}", m.key_system.system_string());
            println!("  System ID:  {}", m.key_system.system_id());
            println!("  Init Data:  {}", BASE64.encode(&m.init_data));
            if let Some(url) = &m.license_url {
                println!("  LA URL:     {url}");
            }
        }

        Ok(())
    }
}
