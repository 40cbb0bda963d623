//! Tracer tuning.

use serde::Deserialize;
use thiserror::Error;

use crate::adapter::MAX_CYCLES_PER_INSTRUCTION;

/// Rejected configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("trace headroom {headroom} must exceed the {min} cycles of one instruction")]
    HeadroomTooSmall { headroom: usize, min: usize },
    #[error("trace headroom {headroom} leaves no room in a {capacity}-slot trace ring")]
    HeadroomTooLarge { headroom: usize, capacity: usize },
    #[error("binary frames must carry at least one element")]
    EmptyFrames,
    #[error("invalid tracer config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Backpressure and framing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TracerConfig {
    /// Free trace slots below which the target is held.
    pub trace_headroom: usize,
    /// Upper bound on elements packed into one binary frame.
    pub max_frame_elements: usize,
    /// Transport space required before a binary frame is attempted. Zero
    /// means anything that fits a header and one element.
    pub min_frame_space: usize,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            trace_headroom: 50,
            max_frame_elements: 2000,
            min_frame_space: 0,
        }
    }
}

impl TracerConfig {
    /// Parse a JSON document. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check the headroom can absorb a whole instruction after the hold is
    /// requested, and still leave usable space in a ring of
    /// `trace_capacity` slots.
    pub fn validate(&self, trace_capacity: usize) -> Result<(), ConfigError> {
        if self.trace_headroom <= MAX_CYCLES_PER_INSTRUCTION {
            return Err(ConfigError::HeadroomTooSmall {
                headroom: self.trace_headroom,
                min: MAX_CYCLES_PER_INSTRUCTION,
            });
        }
        if self.trace_headroom >= trace_capacity {
            return Err(ConfigError::HeadroomTooLarge {
                headroom: self.trace_headroom,
                capacity: trace_capacity,
            });
        }
        if self.max_frame_elements == 0 {
            return Err(ConfigError::EmptyFrames);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::TRACE_CAPACITY;

    #[test]
    fn defaults_are_valid() {
        TracerConfig::default().validate(TRACE_CAPACITY).unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = TracerConfig::from_json(r#"{"traceHeadroom": 64}"#).unwrap();
        assert_eq!(config.trace_headroom, 64);
        assert_eq!(config.max_frame_elements, 2000);
    }

    #[test]
    fn headroom_bounds() {
        let small = TracerConfig {
            trace_headroom: MAX_CYCLES_PER_INSTRUCTION,
            ..TracerConfig::default()
        };
        assert!(matches!(small.validate(1024), Err(ConfigError::HeadroomTooSmall { .. })));

        let large = TracerConfig {
            trace_headroom: 64,
            ..TracerConfig::default()
        };
        assert!(matches!(large.validate(64), Err(ConfigError::HeadroomTooLarge { .. })));
        large.validate(128).unwrap();
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            TracerConfig::from_json(r#"{"traceHeadroom": "lots"}"#),
            Err(ConfigError::Parse(_))
        ));
    }
}
