use pmulink_frame::telemetry::MAX_PACKET_SIZE;
use pmulink_frame::{TelemetryLayout, CRC_SIZE, HEADER_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::{PortError, Result};
use crate::store::DEFAULT_CONFIG_CAPACITY;

/// Identity and I/O counts reported by GetCapabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub device_type: u8,
    pub fw_major: u8,
    pub fw_minor: u8,
    pub fw_patch: u8,
    pub output_count: u8,
    pub analog_in_count: u8,
    pub digital_in_count: u8,
    pub hbridge_count: u8,
    pub can_count: u8,
}

impl DeviceInfo {
    /// Capabilities reply payload. The final byte is reserved.
    pub fn capabilities_payload(&self) -> [u8; 10] {
        [
            self.device_type,
            self.fw_major,
            self.fw_minor,
            self.fw_patch,
            self.output_count,
            self.analog_in_count,
            self.digital_in_count,
            self.hbridge_count,
            self.can_count,
            0,
        ]
    }

    /// Snapshot layout for these I/O counts.
    pub fn telemetry_layout(&self) -> TelemetryLayout {
        TelemetryLayout::new(
            usize::from(self.output_count),
            usize::from(self.analog_in_count),
        )
    }

    /// Shrink the analog input count, then the output count, until a
    /// snapshot's fixed portion fits in one packet. Returns `true` if
    /// anything changed.
    pub fn fit_telemetry(&mut self) -> bool {
        let before = *self;
        while !self.telemetry_layout().fits() {
            if self.analog_in_count > 0 {
                self.analog_in_count -= 1;
            } else {
                self.output_count -= 1;
            }
        }
        *self != before
    }
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            device_type: 0x01,
            fw_major: 1,
            fw_minor: 0,
            fw_patch: 0,
            output_count: 30,
            analog_in_count: 20,
            digital_in_count: 8,
            hbridge_count: 4,
            can_count: 2,
        }
    }
}

/// Port sizing and defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// TX batch capacity; must hold the largest encoded frame.
    pub tx_capacity: usize,
    /// Bytes buffered while a frame is on the wire.
    pub rx_capacity: usize,
    /// Largest configuration blob accepted.
    pub config_capacity: usize,
    /// Stream rate used when StartStream carries no rate (or 0).
    pub default_rate_hz: u16,
    pub device: DeviceInfo,
}

impl PortConfig {
    /// Reject sizings the port cannot honor.
    pub fn validate(&self) -> Result<()> {
        let layout = self.device.telemetry_layout();
        if !layout.fits() {
            return Err(PortError::InvalidConfig(format!(
                "{} outputs and {} analog inputs need a {}-byte snapshot (max {MAX_PACKET_SIZE})",
                layout.outputs,
                layout.analog_inputs,
                layout.fixed_size(),
            )));
        }
        let data_frame = HEADER_SIZE + MAX_PACKET_SIZE + CRC_SIZE;
        if self.tx_capacity < data_frame {
            return Err(PortError::InvalidConfig(format!(
                "tx_capacity {} cannot hold a {data_frame}-byte telemetry frame",
                self.tx_capacity
            )));
        }
        if self.rx_capacity == 0 {
            return Err(PortError::InvalidConfig("rx_capacity must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            tx_capacity: 512,
            rx_capacity: 256,
            config_capacity: DEFAULT_CONFIG_CAPACITY,
            default_rate_hz: 10,
            device: DeviceInfo::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: PortConfig =
            serde_json::from_str(r#"{"rx_capacity": 64, "device": {"output_count": 12}}"#)
                .unwrap();
        assert_eq!(cfg.rx_capacity, 64);
        assert_eq!(cfg.tx_capacity, 512);
        assert_eq!(cfg.device.output_count, 12);
        assert_eq!(cfg.device.analog_in_count, 20);
    }

    #[test]
    fn default_config_is_valid() {
        PortConfig::default().validate().unwrap();
    }

    #[test]
    fn oversized_snapshot_layout_is_rejected() {
        let cfg: PortConfig =
            serde_json::from_str(r#"{"device": {"analog_in_count": 80}}"#).unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, PortError::InvalidConfig(ref msg) if msg.contains("226-byte")));
    }

    #[test]
    fn small_tx_batch_is_rejected() {
        let cfg = PortConfig {
            tx_capacity: 205,
            ..PortConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(PortError::InvalidConfig(_))));
    }

    #[test]
    fn fit_telemetry_trims_analog_inputs_first() {
        let mut info = DeviceInfo {
            analog_in_count: 80,
            ..DeviceInfo::default()
        };
        assert!(info.fit_telemetry());
        assert_eq!(info.analog_in_count, 67);
        assert_eq!(info.output_count, 30);
        assert_eq!(info.telemetry_layout().fixed_size(), 200);

        let mut huge = DeviceInfo {
            output_count: 255,
            analog_in_count: 255,
            ..DeviceInfo::default()
        };
        assert!(huge.fit_telemetry());
        assert_eq!(huge.analog_in_count, 0);
        assert_eq!(huge.output_count, 164);

        let mut reference = DeviceInfo::default();
        assert!(!reference.fit_telemetry());
    }

    #[test]
    fn capabilities_layout() {
        let info = DeviceInfo::default();
        assert_eq!(info.capabilities_payload(), [1, 1, 0, 0, 30, 20, 8, 4, 2, 0]);
    }
}
