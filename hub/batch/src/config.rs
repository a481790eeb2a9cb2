//! Runtime configuration of the batch manager

use sensorhub_core::{HubError, HubResult};

/// Largest non-wakeup queue: 250 samples plus 10 %
pub const HIF_NWKUP_SENSOR_DATA_QUEUE_SIZE: usize = 275;
pub const HIF_WKUP_SENSOR_DATA_QUEUE_SIZE: usize = 220;
pub const HIF_CONTROL_QUEUE_SIZE: usize = 2;

/// Queue high threshold as a share of capacity, leaving room for host wake-up
pub const HOST_WAKEUP_TOLERANCE_PERCENT: u8 = 90;

/// Configuration for the batch manager.
///
/// Queue capacities may be lowered below their compile-time maxima; the
/// remaining fields shape control responses.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub nonwakeup_capacity: usize,
    pub wakeup_capacity: usize,
    pub control_capacity: usize,
    pub host_wakeup_tolerance_percent: u8,
    /// Append a CRC to control responses
    pub response_crc: bool,
    /// Returned for the VERSION parameter
    pub version: &'static str,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            nonwakeup_capacity: HIF_NWKUP_SENSOR_DATA_QUEUE_SIZE,
            wakeup_capacity: HIF_WKUP_SENSOR_DATA_QUEUE_SIZE,
            control_capacity: HIF_CONTROL_QUEUE_SIZE,
            host_wakeup_tolerance_percent: HOST_WAKEUP_TOLERANCE_PERCENT,
            response_crc: true,
            version: sensorhub_core::VERSION,
        }
    }
}

impl BatchConfig {
    /// Creates a new batch configuration builder.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder::default()
    }

    /// Check capacities against the queue storage and the threshold share
    pub fn validate(&self) -> HubResult<()> {
        let fits = (2..=HIF_NWKUP_SENSOR_DATA_QUEUE_SIZE).contains(&self.nonwakeup_capacity)
            && (2..=HIF_WKUP_SENSOR_DATA_QUEUE_SIZE).contains(&self.wakeup_capacity)
            && (2..=HIF_CONTROL_QUEUE_SIZE).contains(&self.control_capacity)
            && (1..=100).contains(&self.host_wakeup_tolerance_percent);
        if fits {
            Ok(())
        } else {
            Err(HubError::InvalidParameter)
        }
    }
}

/// Builder for batch manager configuration.
#[derive(Debug, Clone, Default)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    /// Sets the non-wakeup and wakeup queue capacities.
    pub fn queue_capacities(mut self, nonwakeup: usize, wakeup: usize) -> Self {
        self.config.nonwakeup_capacity = nonwakeup;
        self.config.wakeup_capacity = wakeup;
        self
    }

    /// Sets the control response queue capacity.
    pub fn control_capacity(mut self, capacity: usize) -> Self {
        self.config.control_capacity = capacity;
        self
    }

    /// Sets the share of capacity used as the highest threshold.
    pub fn host_wakeup_tolerance(mut self, percent: u8) -> Self {
        self.config.host_wakeup_tolerance_percent = percent;
        self
    }

    /// Enables or disables the CRC on control responses.
    pub fn response_crc(mut self, enabled: bool) -> Self {
        self.config.response_crc = enabled;
        self
    }

    /// Sets the version string reported to the host.
    pub fn version(mut self, version: &'static str) -> Self {
        self.config.version = version;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> BatchConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = BatchConfig::default();
        assert_eq!(config.nonwakeup_capacity, 275);
        assert_eq!(config.wakeup_capacity, 220);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_rejects_oversized_queue() {
        let config = BatchConfig::builder().queue_capacities(300, 10).build();
        assert_eq!(config.validate(), Err(HubError::InvalidParameter));
    }
}
