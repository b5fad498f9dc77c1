//! # Configuration
//!
//! Capacities and the credential implication table, loaded once at startup.
//!
//! ```toml
//! request_id_capacity = 4096
//! collection_id_capacity = 1024
//! inbound_capacity = 10000
//! outbound_capacity = 10000
//!
//! [[implications]]
//! token = "admin"
//! implies = "moderator"
//! ```
//!
//! Every field is optional; missing fields keep their defaults.

use courier_core::IdPool;
use courier_shared::constants::{
    DEFAULT_COLLECTION_ID_CAPACITY, DEFAULT_INBOUND_CAPACITY, DEFAULT_OUTBOUND_CAPACITY,
    DEFAULT_REQUEST_ID_CAPACITY,
};
use courier_shared::Credential;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or validating a [`CourierConfig`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The TOML did not parse or did not match the schema.
    #[error("invalid configuration: {0}")]
    Parse(String),

    /// A capacity was zero.
    #[error("{field} must be at least 1")]
    ZeroCapacity {
        /// Offending field.
        field: &'static str,
    },

    /// An id capacity exceeds the 16-bit id space.
    #[error("{field} is {value}, maximum is {max}")]
    CapacityTooLarge {
        /// Offending field.
        field: &'static str,
        /// Configured value.
        value: usize,
        /// Largest allowed value.
        max: usize,
    },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// "Holding `token` also grants `implies`."
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implication {
    /// The token held.
    pub token: Credential,
    /// The token it stands in for.
    pub implies: Credential,
}

impl Implication {
    /// Creates an implication pair.
    #[must_use]
    pub fn new(token: impl Into<String>, implies: impl Into<String>) -> Self {
        Self {
            token: Credential::new(token),
            implies: Credential::new(implies),
        }
    }
}

/// Dispatcher and transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CourierConfig {
    /// Requests this endpoint may have in flight at once.
    pub request_id_capacity: usize,
    /// Collections this endpoint may publish at once.
    pub collection_id_capacity: usize,
    /// Inbound queue depth (transport → processing).
    pub inbound_capacity: usize,
    /// Outbound queue depth (processing → transport).
    pub outbound_capacity: usize,
    /// Credential implications. Transitive.
    pub implications: Vec<Implication>,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            request_id_capacity: DEFAULT_REQUEST_ID_CAPACITY,
            collection_id_capacity: DEFAULT_COLLECTION_ID_CAPACITY,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            implications: Vec::new(),
        }
    }
}

impl CourierConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every capacity.
    pub fn validate(&self) -> ConfigResult<()> {
        let id_spaces = [
            ("request_id_capacity", self.request_id_capacity),
            ("collection_id_capacity", self.collection_id_capacity),
        ];
        for (field, value) in id_spaces {
            if value == 0 {
                return Err(ConfigError::ZeroCapacity { field });
            }
            if value > IdPool::MAX_CAPACITY {
                return Err(ConfigError::CapacityTooLarge {
                    field,
                    value,
                    max: IdPool::MAX_CAPACITY,
                });
            }
        }

        let queues = [
            ("inbound_capacity", self.inbound_capacity),
            ("outbound_capacity", self.outbound_capacity),
        ];
        for (field, value) in queues {
            if value == 0 {
                return Err(ConfigError::ZeroCapacity { field });
            }
        }
        Ok(())
    }

    /// Builder-style override of the request id capacity.
    #[must_use]
    pub fn with_request_id_capacity(mut self, capacity: usize) -> Self {
        self.request_id_capacity = capacity;
        self
    }

    /// Builder-style override of the collection id capacity.
    #[must_use]
    pub fn with_collection_id_capacity(mut self, capacity: usize) -> Self {
        self.collection_id_capacity = capacity;
        self
    }

    /// Builder-style addition of an implication.
    #[must_use]
    pub fn with_implication(mut self, token: &str, implies: &str) -> Self {
        self.implications.push(Implication::new(token, implies));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = CourierConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_id_capacity, DEFAULT_REQUEST_ID_CAPACITY);
        assert!(config.implications.is_empty());
    }

    #[test]
    fn test_from_toml() {
        let config = CourierConfig::from_toml_str(
            r#"
            request_id_capacity = 8

            [[implications]]
            token = "admin"
            implies = "moderator"

            [[implications]]
            token = "moderator"
            implies = "chat"
            "#,
        )
        .unwrap();

        assert_eq!(config.request_id_capacity, 8);
        assert_eq!(config.collection_id_capacity, DEFAULT_COLLECTION_ID_CAPACITY);
        assert_eq!(config.implications.len(), 2);
        assert_eq!(config.implications[1], Implication::new("moderator", "chat"));
    }

    #[test]
    fn test_rejects_zero_and_oversized() {
        assert_eq!(
            CourierConfig::from_toml_str("inbound_capacity = 0"),
            Err(ConfigError::ZeroCapacity { field: "inbound_capacity" })
        );
        assert_eq!(
            CourierConfig::from_toml_str("request_id_capacity = 65537"),
            Err(ConfigError::CapacityTooLarge {
                field: "request_id_capacity",
                value: 65537,
                max: 65536,
            })
        );
        assert!(CourierConfig::from_toml_str("request_id_capacity = 65536").is_ok());
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(matches!(
            CourierConfig::from_toml_str("timeout_ms = 5"),
            Err(ConfigError::Parse(_))
        ));
    }
}
