use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use data_encoding::BASE64;

use drm_core::utils::decode_base64_lenient;
use drm_license::{
    DispatcherConfig, EventBus, LicenseMessage, LicenseRequest, LicenseRequestDispatcher,
    MessageType, ProtectionConfig, ReqwestTransport,
};

/**
    Send a CDM message to a license server and print the license.
*/
#[derive(Args)]
pub struct RequestLicenseCommand {
    /**
        Key system string, e.g. com.widevine.alpha.
    */
    #[arg(short, long)]
    key_system: String,

    /**
        File holding the raw CDM message.
    */
    #[arg(short, long)]
    message_file: PathBuf,

    /**
        license-request, license-renewal, license-release or
        individualization-request.
    */
    #[arg(short = 't', long, default_value = "license-request")]
    message_type: MessageType,

    /**
        License server URL, used when the protection data has none.
    */
    #[arg(short, long)]
    url: Option<String>,

    /**
        Protection config JSON: key system string to protection data.
    */
    #[arg(short, long)]
    protection_data: Option<PathBuf>,

    /**
        Base64 init data; PlayReady init data may carry the license URL.
    */
    #[arg(short, long)]
    init_data: Option<String>,

    /**
        Additional HTTP headers in "Key: Value" format. Can be repeated.
    */
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /**
        Send credentials (cookies) with the request.
    */
    #[arg(long)]
    with_credentials: bool,

    /**
        Give up on the license server after this many milliseconds.
    */
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl RequestLicenseCommand {
    pub async fn run(self) -> Result<()> {
        let message = std::fs::read(&self.message_file)
            .with_context(|| format!("failed to read {}", self.message_file.display()))?;

        let mut protection_data = match &self.protection_data {
            Some(path) => ProtectionConfig::from_path(path)
                .context("failed to load protection config")?
                .get(&self.key_system)
                .cloned(),
            None => None,
        };
        if !self.headers.is_empty() || self.with_credentials {
            let mut data = protection_data.take().unwrap_or_default();
            for h in &self.headers {
                let (key, value) = parse_header(h)?;
                data = data.with_header(key, value);
            }
            if self.with_credentials {
                data = data.with_credentials(true);
            }
            protection_data = Some(data);
        }

        let mut request = LicenseRequest::new(
            &self.key_system,
            LicenseMessage::new(self.message_type, message),
            "cli",
        );
        if let Some(data) = protection_data {
            request = request.with_protection_data(data);
        }
        if let Some(url) = self.url {
            request = request.with_fallback_url(url);
        }
        if let Some(init_data) = &self.init_data {
            let init_data =
                decode_base64_lenient(init_data).context("init data is not valid base64")?;
            request = request.with_init_data(init_data);
        }

        let mut config = DispatcherConfig::default();
        if let Some(ms) = self.timeout_ms {
            config = config.with_request_timeout(Duration::from_millis(ms));
        }

        let bus = EventBus::new(config.event_capacity);
        let mut events = bus.subscribe();
        let transport = ReqwestTransport::new().context("failed to create HTTP client")?;
        let dispatcher = LicenseRequestDispatcher::builder(transport, bus)
            .config(config)
            .build()
            .context("failed to create dispatcher")?;

        eprintln!("Requesting {} for {}", self.message_type, self.key_system);
        dispatcher.send_license_request(request);
        let result = events
            .recv()
            .await
            .context("license request ended without a result")?;

        if let Some(error) = result.error {
            bail!(error);
        }
        match result.payload {
            Some(payload) => {
                eprintln!("Received license ({} bytes)", payload.len());
                println!("{}", BASE64.encode(&payload));
            }
            None => eprintln!("Completed without a license payload"),
        }

        Ok(())
    }
}

fn parse_header(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once(':')
        .context("header must be in 'Key: Value' format")?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}
