// Configuration management for the AttentID CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/attentid/config.json
// - Linux: ~/.config/attentid/config.json
// - Windows: %APPDATA%\attentid\config.json

use anyhow::{Context, Result};
use attentid_core::config::{
    AuthPolicy, PayloadDecoding, PeripheralConfig, ScanConfig, ShutdownPolicy,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GATT peripheral settings
    pub peripheral: PeripheralConfig,

    /// Passive scanner settings
    pub scan: ScanConfig,

    /// Default log filter when RUST_LOG is unset
    pub log_level: Option<String>,
}

fn parse_bool(value: &str) -> Result<bool> {
    value.parse().context("Invalid boolean value")
}

fn parse_auth_policy(value: &str) -> Result<AuthPolicy> {
    match value {
        "disabled" => Ok(AuthPolicy::Disabled),
        "audit" => Ok(AuthPolicy::Audit),
        "enforce" => Ok(AuthPolicy::Enforce),
        _ => anyhow::bail!("Invalid auth policy (disabled|audit|enforce): {}", value),
    }
}

fn parse_decoding(value: &str) -> Result<PayloadDecoding> {
    match value {
        "latin1" => Ok(PayloadDecoding::Latin1),
        "ascii" => Ok(PayloadDecoding::Ascii),
        "utf8" => Ok(PayloadDecoding::Utf8),
        _ => anyhow::bail!("Invalid payload decoding (latin1|ascii|utf8): {}", value),
    }
}

fn parse_shutdown(value: &str) -> Result<ShutdownPolicy> {
    if value == "abandon" {
        return Ok(ShutdownPolicy::Abandon);
    }
    let grace = value
        .strip_prefix("drain:")
        .context("Invalid shutdown policy (abandon|drain:<ms>)")?;
    Ok(ShutdownPolicy::Drain {
        grace_ms: grace.parse().context("Invalid grace period")?,
    })
}

fn format_shutdown(policy: &ShutdownPolicy) -> String {
    match policy {
        ShutdownPolicy::Abandon => "abandon".to_string(),
        ShutdownPolicy::Drain { grace_ms } => format!("drain:{}", grace_ms),
    }
}

fn format_policy<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("attentid");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    /// Load config from `path`, or write and return the default if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Set a config value. The result must still validate.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut next = self.clone();
        let p = &mut next.peripheral;
        match key {
            "service_uuid" => p.service_uuid = Uuid::parse_str(value).context("Invalid UUID")?,
            "characteristic_uuid" => {
                p.characteristic_uuid = Uuid::parse_str(value).context("Invalid UUID")?
            }
            "initial_value" => p.initial_value = value.to_string(),
            "description" => p.description = value.to_string(),
            "local_name" => p.local_name = value.to_string(),
            "object_root" => p.object_root = value.to_string(),
            "adapter" => {
                p.adapter = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "known_addresses" => {
                p.known_addresses = value
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "auth_policy" => p.auth_policy = parse_auth_policy(value)?,
            "payload_decoding" => p.payload_decoding = parse_decoding(value)?,
            "export_descriptors" => p.export_descriptors = parse_bool(value)?,
            "scan_timeout" => next.scan.timeout_secs = value.parse().context("Invalid number")?,
            "max_in_flight" => next.scan.max_in_flight = value.parse().context("Invalid number")?,
            "scan_shutdown" => next.scan.shutdown = parse_shutdown(value)?,
            "log_level" => {
                next.log_level = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        next.peripheral.validate()?;
        next.scan.validate()?;
        *self = next;
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        self.list()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        let p = &self.peripheral;
        vec![
            ("service_uuid".to_string(), p.service_uuid.to_string()),
            (
                "characteristic_uuid".to_string(),
                p.characteristic_uuid.to_string(),
            ),
            ("initial_value".to_string(), p.initial_value.clone()),
            ("description".to_string(), p.description.clone()),
            ("local_name".to_string(), p.local_name.clone()),
            ("object_root".to_string(), p.object_root.clone()),
            (
                "adapter".to_string(),
                p.adapter.clone().unwrap_or_else(|| "(auto)".to_string()),
            ),
            ("known_addresses".to_string(), p.known_addresses.join(",")),
            ("auth_policy".to_string(), format_policy(&p.auth_policy)),
            (
                "payload_decoding".to_string(),
                format_policy(&p.payload_decoding),
            ),
            (
                "export_descriptors".to_string(),
                p.export_descriptors.to_string(),
            ),
            ("scan_timeout".to_string(), self.scan.timeout_secs.to_string()),
            ("max_in_flight".to_string(), self.scan.max_in_flight.to_string()),
            (
                "scan_shutdown".to_string(),
                format_shutdown(&self.scan.shutdown),
            ),
            (
                "log_level".to_string(),
                self.log_level.clone().unwrap_or_else(|| "info".to_string()),
            ),
        ]
    }
}
