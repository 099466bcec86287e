//! Protocol configuration.
//!
//! The fractional precision is fixed when a protocol instance is set up and is
//! shared by every encode and decode performed through that instance.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Number of fractional bits used when no configuration says otherwise.
pub const DEFAULT_FRACTIONAL_PRECISION: u32 = 16;

/// Largest precision for which both `2^F` and the encoding of `1.0` fit in an `i64`.
pub const MAX_FRACTIONAL_PRECISION: u32 = 62;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolConfig {
    pub fractional_precision: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            fractional_precision: DEFAULT_FRACTIONAL_PRECISION,
        }
    }
}

impl ProtocolConfig {
    pub fn with_precision(fractional_precision: u32) -> Result<Self> {
        let config = ProtocolConfig {
            fractional_precision,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: ProtocolConfig =
            toml::from_str(raw).map_err(|e| Error::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading protocol configuration from {:?}", path);
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fractional_precision > MAX_FRACTIONAL_PRECISION {
            return Err(Error::Configuration(format!(
                "fractional precision {} exceeds maximum of {}",
                self.fractional_precision, MAX_FRACTIONAL_PRECISION
            )));
        }
        Ok(())
    }
}
