//! Runtime configuration for the forwarding engine.
//!
//! All thresholds share the unit of node coordinates. Delays are jitter
//! bounds for broadcast contention.
//!
//! # Example
//!
//! ```
//! use geocast::{CancelPolicy, DelayMode, Duration, ForwarderConfig};
//!
//! let config = ForwarderConfig::default()
//!     .with_delay_bounds(Duration::from_millis(10), Duration::from_millis(50))
//!     .with_delay_mode(DelayMode::DistanceScaled)
//!     .with_cancel_policy(CancelPolicy::Projection);
//! assert!(config.validate().is_ok());
//!
//! // Strategy instance parameters are `[minDelaySecs, maxDelaySecs]`.
//! let parsed = ForwarderConfig::from_parameters(&["0.01", "0.05"]).unwrap();
//! assert_eq!(parsed.max_delay, Duration::from_millis(50));
//! ```

use alloc::string::String;

use thiserror::Error;

use crate::time::Duration;

/// How the contention delay is drawn within contention range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelayMode {
    /// Uniform in `[min_delay, max_delay]`.
    #[default]
    Uniform,
    /// `max_delay * (max_contend - d) / max_contend` plus the uniform draw.
    DistanceScaled,
}

/// Test applied when a duplicate arrives for a pending relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelPolicy {
    /// Cancel when the new sender is closer to the target than the prior
    /// sender, or within `close_proximity` of this node.
    #[default]
    ProgressOrProximity,
    /// Cancel when the new sender has passed this node as seen from the
    /// prior sender.
    Projection,
}

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("min delay {min} exceeds max delay {max}")]
    DelayBounds { min: Duration, max: Duration },
    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
    #[error("request lifetime must be non-zero")]
    ZeroLifetime,
    #[error("expected 0 or 2 parameters, got {0}")]
    ParameterCount(usize),
    #[error("parameter {index} `{value}` is not a valid number of seconds")]
    InvalidParameter { index: usize, value: String },
}

/// Tunables of one forwarder instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwarderConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Delay used when the sender is beyond contention range.
    pub delay_floor: Duration,
    pub max_contend_distance: f64,
    /// New-sender distance below which a pending relay is redundant.
    pub close_proximity: f64,
    /// Radius around the route source and target inside which relaying stops.
    pub exclusion_radius: f64,
    /// Routes shorter than this are not relayed at all.
    pub min_hop_distance: f64,
    /// Corridor half-width when the route descriptor does not carry one.
    pub corridor_limit: f64,
    /// Pending-request records expire this long after the last request.
    pub request_lifetime: Duration,
    pub delay_mode: DelayMode,
    pub cancel_policy: CancelPolicy,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
            delay_floor: Duration::from_millis(10),
            max_contend_distance: 600.0,
            close_proximity: 20.0,
            exclusion_radius: 10.0,
            min_hop_distance: 120.0,
            corridor_limit: 0.0,
            request_lifetime: Duration::from_secs(4),
            delay_mode: DelayMode::Uniform,
            cancel_policy: CancelPolicy::ProgressOrProximity,
        }
    }
}

impl ForwarderConfig {
    /// Build a configuration from strategy instance parameters.
    ///
    /// Accepts no parameters (defaults) or exactly `[minDelaySecs, maxDelaySecs]`.
    pub fn from_parameters(params: &[&str]) -> Result<Self, ConfigError> {
        let config = Self::default();
        match params {
            [] => Ok(config),
            [min, max] => {
                let min = parse_secs(0, min)?;
                let max = parse_secs(1, max)?;
                let config = config.with_delay_bounds(min, max);
                config.validate()?;
                Ok(config)
            }
            _ => Err(ConfigError::ParameterCount(params.len())),
        }
    }

    pub fn with_delay_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_delay = min;
        self.max_delay = max;
        self
    }

    pub fn with_delay_floor(mut self, floor: Duration) -> Self {
        self.delay_floor = floor;
        self
    }

    pub fn with_max_contend_distance(mut self, distance: f64) -> Self {
        self.max_contend_distance = distance;
        self
    }

    pub fn with_close_proximity(mut self, distance: f64) -> Self {
        self.close_proximity = distance;
        self
    }

    pub fn with_exclusion_radius(mut self, radius: f64) -> Self {
        self.exclusion_radius = radius;
        self
    }

    pub fn with_min_hop_distance(mut self, distance: f64) -> Self {
        self.min_hop_distance = distance;
        self
    }

    pub fn with_corridor_limit(mut self, limit: f64) -> Self {
        self.corridor_limit = limit;
        self
    }

    pub fn with_request_lifetime(mut self, lifetime: Duration) -> Self {
        self.request_lifetime = lifetime;
        self
    }

    pub fn with_delay_mode(mut self, mode: DelayMode) -> Self {
        self.delay_mode = mode;
        self
    }

    pub fn with_cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.cancel_policy = policy;
        self
    }

    /// Check bounds and thresholds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_delay > self.max_delay {
            return Err(ConfigError::DelayBounds {
                min: self.min_delay,
                max: self.max_delay,
            });
        }
        let thresholds = [
            ("max_contend_distance", self.max_contend_distance),
            ("close_proximity", self.close_proximity),
            ("exclusion_radius", self.exclusion_radius),
            ("min_hop_distance", self.min_hop_distance),
            ("corridor_limit", self.corridor_limit),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }
        if self.request_lifetime == Duration::ZERO {
            return Err(ConfigError::ZeroLifetime);
        }
        Ok(())
    }
}

fn parse_secs(index: usize, raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(Duration::from_secs_f64(secs)),
        _ => Err(ConfigError::InvalidParameter {
            index,
            value: String::from(raw),
        }),
    }
}
