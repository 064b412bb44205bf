use std::path::Path;

use axisbus_common::{constants, messages::CobLayout, node_id::MAX_NODE_ID, NodeId};
use serde::Deserialize;
use snafu::{ResultExt, Snafu};

use crate::axis::Calibration;

/// Error returned when loading controller configuration files
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// The file could not be read
    #[snafu(display("IO error loading {path}: {source:?}"))]
    Io {
        /// The file path
        path: String,
        /// The underlying error
        source: std::io::Error,
    },
    /// The content is not a valid configuration
    #[snafu(display("Error parsing TOML: {source}"))]
    TomlDeserialization {
        /// The parser error
        source: toml::de::Error,
    },
    /// The axis count must be in 1..=127
    #[snafu(display("Invalid axis count {value}"))]
    InvalidAxisCount {
        /// The configured count
        value: u8,
    },
    /// An `[[axis]]` entry refers to a node outside of 1..=axis_count
    #[snafu(display("Axis override for node {node_id}, but only {axis_count} axes configured"))]
    InvalidAxisOverride {
        /// The node ID of the entry
        node_id: u8,
        /// The configured axis count
        axis_count: u8,
    },
    /// A PDO base is not a function code, or collides with a fixed service
    #[snafu(display("Invalid {pdo} COB-ID base 0x{value:03X}"))]
    InvalidCobBase {
        /// Which PDO
        pdo: &'static str,
        /// The configured base
        value: u16,
    },
}

/// COB-ID bases of the PDOs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CobConfig {
    /// RPDO1 base, the node ID is added
    pub rpdo1_base: u16,
    /// TPDO1 base, the node ID is added
    pub tpdo1_base: u16,
}

impl Default for CobConfig {
    fn default() -> Self {
        Self {
            rpdo1_base: constants::cob::RPDO1_BASE,
            tpdo1_base: constants::cob::TPDO1_BASE,
        }
    }
}

impl CobConfig {
    /// Check that both bases are function codes which don't collide with SDO or heartbeat
    pub fn validate(&self) -> Result<(), ConfigError> {
        use constants::cob::{FUNCTION_MASK, HEARTBEAT_BASE, SDO_REQ_BASE, SDO_RESP_BASE};
        let reserved = [HEARTBEAT_BASE, SDO_REQ_BASE, SDO_RESP_BASE];
        for (pdo, value) in [("RPDO1", self.rpdo1_base), ("TPDO1", self.tpdo1_base)] {
            if value & !FUNCTION_MASK != 0 || value == 0 || reserved.contains(&value) {
                return InvalidCobBaseSnafu { pdo, value }.fail();
            }
        }
        Ok(())
    }
}

impl From<CobConfig> for CobLayout {
    fn from(value: CobConfig) -> Self {
        CobLayout {
            rpdo1_base: value.rpdo1_base,
            tpdo1_base: value.tpdo1_base,
        }
    }
}

/// Zero-initialization options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ZeiConfig {
    /// Drive to the reference position after the key writes, and wait for target reached
    pub reference_move: bool,
    /// Maximum number of statusword reads while waiting for target reached
    pub statusword_attempts: u8,
    /// Time between statusword reads
    pub poll_interval_ms: u64,
}

impl Default for ZeiConfig {
    fn default() -> Self {
        Self {
            reference_move: false,
            statusword_attempts: 3,
            poll_interval_ms: 1000,
        }
    }
}

/// Move start options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MoveConfig {
    /// Mode of operation sent in RPDO1
    pub profile_position_mode: i8,
    /// Controlword sent in RPDO1 to start the move
    pub start_controlword: u16,
}

impl Default for MoveConfig {
    fn default() -> Self {
        Self {
            profile_position_mode: constants::modes::PROFILE_POSITION,
            start_controlword: constants::controlword::START_ABSOLUTE_MOVE,
        }
    }
}

/// Per-axis calibration overrides
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AxisOverride {
    /// The node the override applies to
    pub node_id: u8,
    /// Replaces `calibration.steps_per_motor_rev`
    pub steps_per_motor_rev: Option<u32>,
    /// Replaces `calibration.gear_ratio`
    pub gear_ratio: Option<f64>,
    /// Replaces `calibration.units_per_output_rev`
    pub units_per_output_rev: Option<f64>,
}

/// Configuration of a [`MotionCoordinator`](crate::MotionCoordinator)
///
/// Every field has a default, so an empty file is a valid configuration:
///
/// ```toml
/// axis_count = 2
/// heartbeat_timeout_ms = 750
///
/// [calibration]
/// steps_per_motor_rev = 32768
/// gear_ratio = 5.0
/// units_per_output_rev = 360.0
///
/// [[axis]]
/// node_id = 2
/// gear_ratio = 10.0
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ControllerConfig {
    /// Number of axes; nodes 1..=axis_count are used
    pub axis_count: u8,
    /// An axis is considered dead when no heartbeat arrives for this long
    pub heartbeat_timeout_ms: u64,
    /// Rate limit for statusword polls during a move, and TPDO staleness threshold
    pub status_poll_interval_ms: u64,
    /// Rate limit for position refresh reads on idle axes
    pub position_refresh_interval_ms: u64,
    /// A pending SDO request fails after this long; 0 waits forever
    pub sdo_timeout_ms: u64,
    /// PDO COB-ID bases
    pub cob: CobConfig,
    /// Default calibration for all axes
    pub calibration: Calibration,
    /// Zero-initialization options
    pub zei: ZeiConfig,
    /// Move options
    #[serde(rename = "move")]
    pub motion: MoveConfig,
    /// Calibration overrides
    #[serde(rename = "axis")]
    pub axes: Vec<AxisOverride>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            axis_count: 3,
            heartbeat_timeout_ms: 750,
            status_poll_interval_ms: 100,
            position_refresh_interval_ms: 500,
            sdo_timeout_ms: 1000,
            cob: CobConfig::default(),
            calibration: Calibration::default(),
            zei: ZeiConfig::default(),
            motion: MoveConfig::default(),
            axes: Vec::new(),
        }
    }
}

impl ControllerConfig {
    /// Read a configuration from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<ControllerConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(IoSnafu {
            path: path.to_string_lossy(),
        })?;
        Self::load_from_str(&content)
    }

    /// Read a configuration from a string
    pub fn load_from_str(s: &str) -> Result<ControllerConfig, ConfigError> {
        let config: ControllerConfig = toml::from_str(s).context(TomlDeserializationSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values which cannot be expressed by the types
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.axis_count == 0 || self.axis_count > MAX_NODE_ID {
            return InvalidAxisCountSnafu {
                value: self.axis_count,
            }
            .fail();
        }
        self.cob.validate()?;
        for o in &self.axes {
            if o.node_id == 0 || o.node_id > self.axis_count {
                return InvalidAxisOverrideSnafu {
                    node_id: o.node_id,
                    axis_count: self.axis_count,
                }
                .fail();
            }
        }
        for node in 1..=self.axis_count {
            if let Ok(node) = NodeId::new(node) {
                let cal = self.calibration_for(node);
                if cal.is_degenerate() {
                    log::warn!("Node {node} has degenerate calibration {cal:?}");
                }
            }
        }
        Ok(())
    }

    /// The calibration for a node, with overrides applied
    pub fn calibration_for(&self, node: NodeId) -> Calibration {
        let mut cal = self.calibration;
        for o in self.axes.iter().filter(|o| o.node_id == node.raw()) {
            if let Some(v) = o.steps_per_motor_rev {
                cal.steps_per_motor_rev = v;
            }
            if let Some(v) = o.gear_ratio {
                cal.gear_ratio = v;
            }
            if let Some(v) = o.units_per_output_rev {
                cal.units_per_output_rev = v;
            }
        }
        cal
    }

    /// The PDO layout
    pub fn cob_layout(&self) -> CobLayout {
        self.cob.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertables::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ControllerConfig::load_from_str("").unwrap();
        assert_eq!(ControllerConfig::default(), config);
        assert_eq!(3, config.axis_count);
        assert_eq!(750, config.heartbeat_timeout_ms);
        assert_eq!(0x200, config.cob.rpdo1_base);
        assert_eq!(0x3F, config.motion.start_controlword);
    }

    #[test]
    fn test_full_config() {
        let s = r#"
            axis_count = 2
            heartbeat_timeout_ms = 1500
            sdo_timeout_ms = 0

            [cob]
            tpdo1_base = 0x280

            [calibration]
            steps_per_motor_rev = 10000
            gear_ratio = 5.0
            units_per_output_rev = 360.0

            [zei]
            reference_move = true
            statusword_attempts = 5

            [move]
            start_controlword = 0x7F

            [[axis]]
            node_id = 2
            gear_ratio = 10.0
        "#;
        let config = ControllerConfig::load_from_str(s).unwrap();
        assert_eq!(2, config.axis_count);
        assert_eq!(1500, config.heartbeat_timeout_ms);
        assert_eq!(0, config.sdo_timeout_ms);
        assert_eq!(0x280, config.cob_layout().tpdo1_base);
        assert_eq!(0x200, config.cob_layout().rpdo1_base);
        assert!(config.zei.reference_move);
        assert_eq!(5, config.zei.statusword_attempts);
        assert_eq!(1000, config.zei.poll_interval_ms);
        assert_eq!(0x7F, config.motion.start_controlword);

        let node1 = config.calibration_for(NodeId::new(1).unwrap());
        assert_eq!(5.0, node1.gear_ratio);
        let node2 = config.calibration_for(NodeId::new(2).unwrap());
        assert_eq!(10.0, node2.gear_ratio);
        assert_eq!(10000, node2.steps_per_motor_rev);
        assert_eq!(360.0, node2.units_per_output_rev);
    }

    #[test]
    fn test_invalid_configs() {
        let err = ControllerConfig::load_from_str("axis_count = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAxisCount { value: 0 }));

        let err = ControllerConfig::load_from_str("axis_count = 2\n[[axis]]\nnode_id = 3\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAxisOverride { node_id: 3, .. }));

        let err = ControllerConfig::load_from_str("bogus = 1").unwrap_err();
        assert_contains!(err.to_string(), "bogus");
    }

    #[test]
    fn test_invalid_cob_bases() {
        // Not a function code; the node bits would be lost when classifying
        let err = ControllerConfig::load_from_str("[cob]\ntpdo1_base = 0x1A0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidCobBase {
                pdo: "TPDO1",
                value: 0x1A0
            }
        ));
        assert_eq!("Invalid TPDO1 COB-ID base 0x1A0", err.to_string());

        for base in [0x580, 0x700, 0x800] {
            let s = format!("[cob]\ntpdo1_base = {base}\n");
            let err = ControllerConfig::load_from_str(&s).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidCobBase { pdo: "TPDO1", .. }));
        }

        let err = ControllerConfig::load_from_str("[cob]\nrpdo1_base = 0x600\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCobBase { pdo: "RPDO1", .. }));

        assert!(ControllerConfig::load_from_str("[cob]\ntpdo1_base = 0x280\n").is_ok());
    }

    #[test]
    fn test_missing_file() {
        let err = ControllerConfig::load_from_file("/nonexistent/axisbus.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
