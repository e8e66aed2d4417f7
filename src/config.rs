//! Core configuration.
//!
//! The core takes its configuration as a plain value passed at
//! construction; there is no file/env loading here, only the shape and
//! construction-time validation (fail startup, not mid-PA).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration for the trust-management and Passive Authentication core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Validator write-batch size.
    pub batch_size: usize,

    /// Directory publisher write-batch size ("default batch size 100").
    pub directory_batch_size: usize,

    /// Documented safe ceiling for the CSCA cache built between validator
    /// passes ("~5 KB x number of CSCAs; documented safe
    /// ceiling ~10 MB").
    pub csca_cache_max_bytes: usize,

    /// Promotes `CRL_UNAVAILABLE` from WARNING to ERROR during PA's
    /// `CRL_CHECK` step.
    pub strict_crl_mode: bool,

    /// DER bytes of a trust anchor certificate used to verify a Master
    /// List's own CMS signature. When absent, the Master List CMS
    /// signature is treated as not-verified and a WARNING is emitted.
    pub master_list_trust_anchor: Option<Vec<u8>>,

    /// Tolerance applied to validity-window and `notAfter`/`nextUpdate`
    /// comparisons against "now", to absorb clock skew between the core
    /// and whatever produced the artifact being checked.
    #[serde(with = "duration_as_millis")]
    pub clock_skew_tolerance: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            directory_batch_size: 100,
            csca_cache_max_bytes: 10 * 1024 * 1024,
            strict_crl_mode: false,
            master_list_trust_anchor: None,
            clock_skew_tolerance: Duration::from_secs(0),
        }
    }
}

impl CoreConfig {
    /// Validate at construction time, not mid-pipeline ("fail
    /// startup, not mid-PA").
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "batch_size must be greater than zero".into(),
            ));
        }
        if self.directory_batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "directory_batch_size must be greater than zero".into(),
            ));
        }
        if self.csca_cache_max_bytes == 0 {
            return Err(ConfigError::InvalidConfig(
                "csca_cache_max_bytes must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

mod duration_as_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_batch_size_rejected() {
        let mut config = CoreConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn serializes_clock_skew_as_millis() {
        let config = CoreConfig::default();
        let json = serde_json::to_value(&config).unwrap();
        assert!(json["clock_skew_tolerance"].is_u64());
    }
}
