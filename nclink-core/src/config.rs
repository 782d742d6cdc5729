// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict schema validation.
//!
//! Validates the monitor configuration before the link controller starts.
//! Any invalid field results in a HardValidationError.

use std::path::Path;

use serde::Deserialize;

use crate::error::{HardValidationError, NcError, NcResult};
use crate::types::{ChannelSizeLimit, VerifierSecret};

/// Raw link configuration as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLinkConfig {
    verifier_secret: Option<String>,
    #[serde(default = "default_max_channel_size")]
    max_channel_size: usize,
}

fn default_max_channel_size() -> usize {
    16 * 1024 * 1024 // 16MB
}

/// Raw root configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    link: RawLinkConfig,
}

/// Validated link configuration.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub verifier_secret: VerifierSecret,
    pub max_channel_size: ChannelSizeLimit,
}

/// Complete validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub link: LinkConfig,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> NcResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(NcError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| NcError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> NcResult<Config> {
        let raw: RawConfig = serde_yaml::from_str(content).map_err(|e| NcError::ConfigParse {
            message: format!("YAML parse error: {}", e),
        })?;

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> NcResult<Config> {
        let link = Self::validate_link(raw.link)?;
        Ok(Config { link })
    }

    fn validate_link(raw: RawLinkConfig) -> NcResult<LinkConfig> {
        let secret = raw
            .verifier_secret
            .ok_or(HardValidationError::MissingRequiredField {
                field: "verifier_secret",
                context: "link".to_string(),
            })?;
        let verifier_secret = VerifierSecret::from_hex(&secret)?;

        let max_channel_size = ChannelSizeLimit::new(raw.max_channel_size)?;

        Ok(LinkConfig {
            verifier_secret,
            max_channel_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_CONFIG: &str = r#"
link:
  verifier_secret: "00112233445566778899aabbccddeeff"
  max_channel_size: 1048576
"#;

    #[test]
    fn test_valid_config() {
        let config = ConfigLoader::load_string(VALID_CONFIG).unwrap();
        assert_eq!(config.link.max_channel_size.bytes(), 1048576);
        assert_eq!(config.link.verifier_secret.as_bytes().len(), 16);
    }

    #[test]
    fn test_default_channel_size() {
        let yaml = r#"
link:
  verifier_secret: "00112233445566778899aabbccddeeff"
"#;
        let config = ConfigLoader::load_string(yaml).unwrap();
        assert_eq!(config.link.max_channel_size.bytes(), 16 * 1024 * 1024);
    }

    #[test]
    fn test_missing_secret() {
        let yaml = r#"
link:
  max_channel_size: 1048576
"#;
        let result = ConfigLoader::load_string(yaml);
        assert!(matches!(
            result,
            Err(NcError::HardValidation(
                HardValidationError::MissingRequiredField { .. }
            ))
        ));
    }

    #[test]
    fn test_short_secret() {
        let yaml = r#"
link:
  verifier_secret: "0011"
"#;
        assert!(ConfigLoader::load_string(yaml).is_err());
    }

    #[test]
    fn test_channel_size_out_of_bounds() {
        let yaml = r#"
link:
  verifier_secret: "00112233445566778899aabbccddeeff"
  max_channel_size: 1024
"#;
        assert!(matches!(
            ConfigLoader::load_string(yaml),
            Err(NcError::HardValidation(
                HardValidationError::ChannelSizeOutOfBounds { .. }
            ))
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r#"
link:
  verifier_secret: "00112233445566778899aabbccddeeff"
  encryption_passes: 5
"#;
        assert!(matches!(
            ConfigLoader::load_string(yaml),
            Err(NcError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ConfigLoader::load_file("/nonexistent/nclink.yaml"),
            Err(NcError::ConfigNotFound { .. })
        ));
    }
}
