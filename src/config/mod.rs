mod store;
mod types;

pub use store::{ActiveConfig, ConfigStore};
pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./hlsrelay.toml",
        "~/.config/hlsrelay/config.toml",
        "/etc/hlsrelay/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let transcode = &config.transcode;

    if let Some(ref path) = transcode.transcoder_path {
        if !path.exists() {
            tracing::warn!(
                "Transcoder path does not exist, falling back to PATH lookup: {:?}",
                path
            );
        }
    }

    for host in &transcode.allowed_hosts {
        if host.trim().is_empty() {
            anyhow::bail!("allowed_hosts contains an empty entry");
        }
        if host.contains(|c: char| c == '/' || c == ':' || c.is_whitespace()) {
            anyhow::bail!(
                "allowed_hosts entry '{}' must be a bare host name without scheme, port or path",
                host
            );
        }
    }

    Ok(())
}
