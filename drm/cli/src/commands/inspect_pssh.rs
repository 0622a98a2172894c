use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;

use drm_core::{KeySystemRegistry, SystemId, playready, utils::decode_base64_lenient};

/**
    Inspect PSSH boxes.
*/
#[derive(Args)]
pub struct InspectPsshCommand {
    /// Base64-encoded PSSH box or concatenated boxes.
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    pub base64: Option<String>,

    /// Read raw init data (concatenated boxes) from a file instead.
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

impl InspectPsshCommand {
    pub fn run(self) -> Result<()> {
        let buffer = match (&self.base64, &self.file) {
            (Some(encoded), _) => {
                decode_base64_lenient(encoded).context("PSSH is not valid base64")?
            }
            (None, Some(path)) => std::fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
            (None, None) => bail!("either a base64 PSSH or --file is required"),
        };

        let records = drm_core::parse_initialization_box_list(&buffer)
            .context("failed to parse init data")?;
        if records.is_empty() {
            println!("No PSSH boxes found.");
            return Ok(());
        }

        for (i, record) in records.iter().enumerate() {
            let pssh = &record.pssh;
            if i > 0 {
                println!();
            }
            println!("Box {i} (bytes {}..{})", record.range.start, record.range.end);
            println!("  Version:    {}", pssh.version);
            println!("  System ID:  {}", pssh.system_id());
            println!("  Data Size:  {} bytes", pssh.data.len());

            let kids = pssh.key_ids();
            if !kids.is_empty() {
                println!("  Key IDs ({}):", kids.len());
                for kid in kids {
                    println!("    {}", hex::encode(kid));
                }
            }

            if pssh.system_id() == SystemId::PlayReady
                && let Some(url) = playready::license_url_from_init_data(&pssh.data)
            {
                println!("  LA URL:     {url}");
            }
        }

        let registry = KeySystemRegistry::with_defaults();
        let matches = drm_core::match_against_registry(&buffer, &registry)
            .context("failed to match init data")?;
        println!();
        if matches.is_empty() {
            println!("No supported key system.");
        } else {
            println!("Supported key systems (by priority):");
            for m in &matches {
                println!(
                    "  {} ({} bytes of init data)",
                    m.key_system.system_string(),
                    m.init_data.len()
                );
            }
        }

        Ok(())
    }
}
