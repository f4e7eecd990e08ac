//! Recorder configuration

use crate::error::DatalogError;
use crate::sync::RESYNC_PERIOD;
use crate::types::{BodyLocation, SamplingRate};
use serde::{Deserialize, Serialize};

/// Largest batch the accelerometer service delivers
pub const MAX_BATCH_SIZE: usize = 25;

/// Session identifier used when no body location is chosen
pub const DEFAULT_SESSION_ID: u8 = 164;

/// Settings for one recording activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Logging session identifier
    pub session_id: u8,
    /// Body location; when set its menu index is the session identifier
    pub body_location: Option<BodyLocation>,
    /// Requested accelerometer rate (a hint; the platform may apply another)
    pub sampling_rate: SamplingRate,
    /// Samples per delivered batch
    pub batch_size: usize,
    /// Samples between timestamp anchors
    pub resync_period: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            session_id: DEFAULT_SESSION_ID,
            body_location: None,
            sampling_rate: SamplingRate::default(),
            batch_size: MAX_BATCH_SIZE,
            resync_period: RESYNC_PERIOD,
        }
    }
}

impl RecorderConfig {
    /// Configuration for a session tagged with a body location
    pub fn for_location(location: BodyLocation) -> Self {
        Self {
            body_location: Some(location),
            ..Self::default()
        }
    }

    /// Identifier the logging session is created under
    pub fn effective_session_id(&self) -> u8 {
        self.body_location
            .map(|location| location.session_id())
            .unwrap_or(self.session_id)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), DatalogError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(DatalogError::InvalidConfig(format!(
                "batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        if self.resync_period == 0 {
            return Err(DatalogError::InvalidConfig(
                "resync_period must be greater than zero".to_string(),
            ));
        }
        if self.resync_period % self.batch_size as u64 != 0 {
            return Err(DatalogError::InvalidConfig(format!(
                "resync_period {} must be a multiple of batch_size {}",
                self.resync_period, self.batch_size
            )));
        }
        Ok(())
    }

    /// Load and validate configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, DatalogError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = RecorderConfig::default();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.resync_period, 1000);
        assert_eq!(config.sampling_rate, SamplingRate::Hz10);
        assert_eq!(config.effective_session_id(), 164);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_location_overrides_session_id() {
        let config = RecorderConfig::for_location(BodyLocation::Chest);
        assert_eq!(config.effective_session_id(), 9);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            RecorderConfig::from_json(r#"{"body_location": "left_ankle", "sampling_rate": 25}"#)
                .unwrap();
        assert_eq!(config.effective_session_id(), 4);
        assert_eq!(config.sampling_rate, SamplingRate::Hz25);
        assert_eq!(config.batch_size, 25);
    }

    #[test]
    fn test_json_round_trip() {
        let config = RecorderConfig {
            session_id: 12,
            sampling_rate: SamplingRate::Hz100,
            batch_size: 20,
            resync_period: 500,
            ..RecorderConfig::default()
        };
        let loaded = RecorderConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            r#"{"batch_size": 0}"#,
            r#"{"batch_size": 26}"#,
            r#"{"resync_period": 0}"#,
            r#"{"batch_size": 25, "resync_period": 1010}"#,
        ];
        for json in cases {
            assert!(
                matches!(RecorderConfig::from_json(json), Err(DatalogError::InvalidConfig(_))),
                "{json} should be rejected"
            );
        }
        assert!(matches!(
            RecorderConfig::from_json(r#"{"sampling_rate": 33}"#),
            Err(DatalogError::JsonError(_))
        ));
    }
}
