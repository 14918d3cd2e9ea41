use std::io;
use std::path::Path;
use std::str::FromStr;

use ron::error::SpannedError;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    IO(#[from] io::Error),
    #[error(transparent)]
    RonSpanned(#[from] SpannedError),
    #[error("unknown config key `{0}`")]
    UnknownKey(String),
    #[error("invalid value `{value}` for config key `{key}`")]
    InvalidValue { key: String, value: String },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Display, EnumString)]
pub enum ByteOrder {
    #[strum(serialize = "little")]
    LittleEndian,
    #[strum(serialize = "big")]
    BigEndian,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Decides which half of a long array element the filler of a narrow value goes into.
    pub byte_order: ByteOrder,
    pub constants_alignment: usize,
    pub constant_bytes_per_site: usize,
    pub relocations_per_site: usize,
    pub safepoint_poll_offset: usize,
    pub code_cache_base: u64,
    pub code_cache_capacity: usize,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::LittleEndian,
            constants_alignment: 16,
            constant_bytes_per_site: 2 * installer_common::BYTES_PER_LONG,
            relocations_per_site: 2,
            safepoint_poll_offset: 0,
            code_cache_base: 0x7f00_0000,
            code_cache_capacity: 48 * 1024 * 1024,
        }
    }
}

impl InstallerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config_string = std::fs::read_to_string(path)?;
        Ok(ron::from_str(config_string.as_str())?)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "byte_order" => self.byte_order = parse_value(key, value)?,
            "constants_alignment" => self.constants_alignment = parse_value(key, value)?,
            "constant_bytes_per_site" => self.constant_bytes_per_site = parse_value(key, value)?,
            "relocations_per_site" => self.relocations_per_site = parse_value(key, value)?,
            "safepoint_poll_offset" => self.safepoint_poll_offset = parse_value(key, value)?,
            "code_cache_base" => self.code_cache_base = parse_address(key, value)?,
            "code_cache_capacity" => self.code_cache_capacity = parse_value(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        if !self.constants_alignment.is_power_of_two() {
            return Err(ConfigError::InvalidValue { key: key.to_string(), value: value.to_string() });
        }
        Ok(())
    }

    pub fn with_overrides<'a>(mut self, overrides: impl IntoIterator<Item=&'a (String, String)>) -> Result<Self, ConfigError> {
        for (key, value) in overrides {
            self.set(key.as_str(), value.as_str())?;
        }
        Ok(self)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue { key: key.to_string(), value: value.to_string() })
}

fn parse_address(key: &str, value: &str) -> Result<u64, ConfigError> {
    match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).map_err(|_| ConfigError::InvalidValue { key: key.to_string(), value: value.to_string() }),
        None => parse_value(key, value),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::config::{ByteOrder, ConfigError, InstallerConfig};

    #[test]
    fn partial_config_keeps_defaults() {
        let config: InstallerConfig = ron::from_str("(byte_order: BigEndian, constants_alignment: 32)").unwrap();
        assert_eq!(config.byte_order, ByteOrder::BigEndian);
        assert_eq!(config.constants_alignment, 32);
        assert_eq!(config.relocations_per_site, InstallerConfig::default().relocations_per_site);
    }

    #[test]
    fn overrides_are_applied_in_order() {
        let overrides = vec![
            ("byte_order".to_string(), "big".to_string()),
            ("code_cache_base".to_string(), "0x1000".to_string()),
            ("code_cache_capacity".to_string(), "4096".to_string()),
        ];
        let config = InstallerConfig::default().with_overrides(&overrides).unwrap();
        assert_eq!(config.byte_order, ByteOrder::BigEndian);
        assert_eq!(config.code_cache_base, 0x1000);
        assert_eq!(config.code_cache_capacity, 4096);
    }

    #[test]
    fn bad_overrides_are_rejected() {
        let mut config = InstallerConfig::default();
        assert!(matches!(config.set("frame_size", "1"), Err(ConfigError::UnknownKey(_))));
        assert!(matches!(config.set("constants_alignment", "12"), Err(ConfigError::InvalidValue { .. })));
        assert!(matches!(config.set("byte_order", "middle"), Err(ConfigError::InvalidValue { .. })));
    }
}
