//! Server configuration.

use anyhow::{Context, bail};
use protocol::{DecodeOptions, EscapeBit, OrientationEncoding};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub interest: InterestConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub spectator: SpectatorConfig,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = Path::new("config.toml");
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Self::from_toml_str(&contents).with_context(|| format!("invalid {}", path.display()))
        } else {
            info!("No config.toml found, creating default config");
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.interest.max_visible_players == 0 {
            bail!("interest.max_visible_players must be at least 1");
        }
        if !(self.interest.visibility_radius > 0.0) {
            bail!("interest.visibility_radius must be positive");
        }
        if self.grid.width == 0 || self.grid.height == 0 || self.grid.cell_radius == 0 {
            bail!("grid dimensions and cell_radius must be non-zero");
        }
        if self.server.tick_interval_ms == 0 {
            bail!("server.tick_interval_ms must be non-zero");
        }
        if self.spectator.enabled && self.spectator.update_interval_ms == 0 {
            bail!("spectator.update_interval_ms must be non-zero");
        }
        Ok(())
    }
}

/// UDP listener and client lifecycle settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maintenance tick interval in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Clients silent for longer than this are evicted.
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_ms: u64,
    /// Persona ids allowed to join. Everyone is allowed when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_personas: Option<Vec<u32>>,
}

impl ServerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            tick_interval_ms: default_tick_interval(),
            inactivity_timeout_ms: default_inactivity_timeout(),
            allowed_personas: None,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    9999
}
fn default_tick_interval() -> u64 {
    1000
}
fn default_inactivity_timeout() -> u64 {
    5000
}

/// Slot allocation and transmission policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InterestConfig {
    /// Players further away than this (2D) are never bound to a slot.
    #[serde(default = "default_visibility_radius")]
    pub visibility_radius: f64,
    /// Number of slots per viewer.
    #[serde(default = "default_max_visible_players")]
    pub max_visible_players: usize,
    /// Full payloads allowed per viewer per slot update.
    #[serde(default = "default_full_budget")]
    pub full_budget: usize,
    /// Missed acks before a full payload is re-sent.
    #[serde(default = "default_ack_retry_threshold")]
    pub ack_retry_threshold: u32,
    /// Restrict candidates to the viewer's grid cell.
    #[serde(default = "default_spatial_index")]
    pub spatial_index: bool,
}

impl Default for InterestConfig {
    fn default() -> Self {
        Self {
            visibility_radius: default_visibility_radius(),
            max_visible_players: default_max_visible_players(),
            full_budget: default_full_budget(),
            ack_retry_threshold: default_ack_retry_threshold(),
            spatial_index: default_spatial_index(),
        }
    }
}

fn default_visibility_radius() -> f64 {
    300.0
}
fn default_max_visible_players() -> usize {
    14
}
fn default_full_budget() -> usize {
    3
}
fn default_ack_retry_threshold() -> u32 {
    5
}
fn default_spatial_index() -> bool {
    true
}

/// World map partition, in map-space units.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GridConfig {
    #[serde(default = "default_grid_width")]
    pub width: u32,
    #[serde(default = "default_grid_height")]
    pub height: u32,
    #[serde(default = "default_cell_radius")]
    pub cell_radius: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: default_grid_width(),
            height: default_grid_height(),
            cell_radius: default_cell_radius(),
        }
    }
}

fn default_grid_width() -> u32 {
    2048
}
fn default_grid_height() -> u32 {
    1125
}
fn default_cell_radius() -> u32 {
    3
}

/// Client revision quirks.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProtocolConfig {
    #[serde(default)]
    pub orientation: OrientationSetting,
    #[serde(default)]
    pub escape_bit: EscapeBitSetting,
}

impl ProtocolConfig {
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            orientation: match self.orientation {
                OrientationSetting::Quaternion => OrientationEncoding::Quaternion,
                OrientationSetting::Angles => OrientationEncoding::Angles,
            },
            escape: match self.escape_bit {
                EscapeBitSetting::Consume => EscapeBit::Consume,
                EscapeBitSetting::Peek => EscapeBit::Peek,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrientationSetting {
    #[default]
    Quaternion,
    Angles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EscapeBitSetting {
    #[default]
    Consume,
    Peek,
}

/// Live map feed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpectatorConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_spectator_bind")]
    pub bind: String,
    #[serde(default = "default_spectator_port")]
    pub port: u16,
    /// Expected `Origin` header host of connecting browsers.
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
    #[serde(default = "default_spectator_interval")]
    pub update_interval_ms: u64,
}

impl Default for SpectatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_spectator_bind(),
            port: default_spectator_port(),
            allowed_origin: default_allowed_origin(),
            update_interval_ms: default_spectator_interval(),
        }
    }
}

fn default_spectator_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_spectator_port() -> u16 {
    6996
}
fn default_allowed_origin() -> String {
    "127.0.0.1".to_string()
}
fn default_spectator_interval() -> u64 {
    250
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.interest.max_visible_players, 14);
        assert_eq!(config.interest.full_budget, 3);
        assert_eq!(config.grid.width, 2048);
        assert!(!config.spectator.enabled);
        assert!(config.server.allowed_personas.is_none());
        assert_eq!(config.protocol.decode_options(), DecodeOptions::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml_str(
            r#"
            [server]
            port = 10000
            allowed_personas = [100, 200]

            [interest]
            max_visible_players = 4

            [protocol]
            orientation = "angles"
            escape_bit = "peek"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 10000);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.server.allowed_personas, Some(vec![100, 200]));
        assert_eq!(config.interest.max_visible_players, 4);
        assert_eq!(config.interest.visibility_radius, 300.0);

        let options = config.protocol.decode_options();
        assert_eq!(options.orientation, OrientationEncoding::Angles);
        assert_eq!(options.escape, EscapeBit::Peek);
    }

    #[test]
    fn test_rejects_zero_slots() {
        let err = Config::from_toml_str("[interest]\nmax_visible_players = 0").unwrap_err();
        assert!(err.to_string().contains("max_visible_players"));
    }

    #[test]
    fn test_default_serializes() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let back = Config::from_toml_str(&text).unwrap();
        assert_eq!(back.spectator.port, 6996);
    }
}
