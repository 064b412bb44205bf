//! Per-node register mirror and unit conversion
//!
//! An [`Axis`] is the controller's view of one drive: the last values read from or written to its
//! registers, its liveness, and where it is in the zero-initialization and move sequences. The
//! [`Calibration`] converts between physical units (e.g. degrees) and the step / RPM values the
//! drive works with.
use axisbus_common::{messages::HeartbeatState, NodeId};
use serde::Deserialize;
use snafu::Snafu;

/// Error returned by axis setters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum AxisError {
    /// The axis has no node ID
    #[snafu(display("Axis is not initialized"))]
    NotInitialized,
}

/// Conversion constants for an axis
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Calibration {
    /// Steps per revolution of the motor shaft
    pub steps_per_motor_rev: u32,
    /// Motor revolutions per output shaft revolution
    pub gear_ratio: f64,
    /// Physical units per output shaft revolution
    pub units_per_output_rev: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            steps_per_motor_rev: 32768,
            gear_ratio: 1.0,
            units_per_output_rev: 7.2,
        }
    }
}

impl Calibration {
    /// True if any constant is zero, making the conversions meaningless
    pub fn is_degenerate(&self) -> bool {
        self.steps_per_motor_rev == 0 || self.gear_ratio == 0.0 || self.units_per_output_rev == 0.0
    }

    fn check(&self) -> bool {
        if self.is_degenerate() {
            log::error!("Degenerate calibration {self:?}, conversion returns 0");
            false
        } else {
            true
        }
    }

    /// Convert a step count to units
    pub fn steps_to_units(&self, steps: i32) -> f64 {
        if !self.check() {
            return 0.0;
        }
        steps as f64 * self.units_per_output_rev
            / (self.gear_ratio * self.steps_per_motor_rev as f64)
    }

    /// Convert units to steps, truncating toward zero
    pub fn units_to_steps(&self, units: f64) -> i32 {
        if !self.check() {
            return 0;
        }
        (units * self.gear_ratio * self.steps_per_motor_rev as f64 / self.units_per_output_rev)
            as i32
    }

    /// Convert an output speed in units/s to motor RPM
    pub fn units_per_sec_to_rpm(&self, units_per_sec: f64) -> f64 {
        if units_per_sec < 0.0 {
            log::warn!("Negative speed {units_per_sec} rejected");
            return 0.0;
        }
        if !self.check() {
            return 0.0;
        }
        units_per_sec * 60.0 * self.gear_ratio / self.units_per_output_rev
    }

    /// Convert an output acceleration in units/s² to motor RPM/s
    pub fn units_per_sec2_to_rpm_per_sec(&self, units_per_sec2: f64) -> f64 {
        if units_per_sec2 < 0.0 {
            log::warn!("Negative acceleration {units_per_sec2} rejected");
            return 0.0;
        }
        if !self.check() {
            return 0.0;
        }
        units_per_sec2 * 60.0 * self.gear_ratio / self.units_per_output_rev
    }

    /// Convert motor RPM to output units/s
    pub fn rpm_to_units_per_sec(&self, rpm: f64) -> f64 {
        if !self.check() {
            return 0.0;
        }
        rpm * self.units_per_output_rev / (60.0 * self.gear_ratio)
    }

    /// Motor revolutions covered by a step count
    pub fn steps_to_motor_revs(&self, steps: i32) -> f64 {
        if self.steps_per_motor_rev == 0 {
            return 0.0;
        }
        steps as f64 / self.steps_per_motor_rev as f64
    }
}

/// Zero-initialization progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitStatus {
    /// Never initialized
    #[default]
    None,
    /// A ZEI sequence is running
    Ongoing,
    /// The last ZEI sequence failed
    Failed,
    /// The last ZEI sequence succeeded
    Finished,
}

impl InitStatus {
    /// The numeric code reported in status replies
    pub fn code(&self) -> u8 {
        match self {
            InitStatus::None => 0,
            InitStatus::Failed => 1,
            InitStatus::Ongoing => 2,
            InitStatus::Finished => 3,
        }
    }
}

/// Movement status of an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisStatus {
    /// Alive and idle
    #[default]
    Operational,
    /// A profile has been computed and the MAJ sequence is writing it
    PreparedForMove,
    /// The start command was sent
    Moving,
    /// Target reached
    MoveFinished,
    /// The move could not be completed
    MoveFailed,
    /// The axis is not responding
    Failed,
}

impl AxisStatus {
    /// True while a move is in flight on this axis
    pub fn is_in_move(&self) -> bool {
        matches!(self, AxisStatus::PreparedForMove | AxisStatus::Moving)
    }
}

/// The controller's mirror of a single drive
#[derive(Debug, Clone, Copy, Default)]
pub struct Axis {
    node_id: Option<NodeId>,
    calibration: Calibration,

    position_actual: i32,
    position_known: bool,
    target_position: i32,
    relative_movement_steps: i32,
    profile_velocity: u32,
    profile_acceleration: u32,
    controlword: u16,
    modes_of_operation: i8,
    statusword: u16,

    // Unit space values used while computing a profile
    regular_speed: f64,
    regular_acceleration: f64,

    pub(crate) is_alive: bool,
    pub(crate) last_heartbeat_ms: u64,
    pub(crate) nmt_state: Option<HeartbeatState>,
    pub(crate) init_status: InitStatus,
    pub(crate) status: AxisStatus,
    pub(crate) statusword_read_attempts: u8,
    pub(crate) last_statusword_request_ms: Option<u64>,
    pub(crate) last_tpdo_ms: Option<u64>,
    pub(crate) last_position_request_ms: Option<u64>,
}

impl Axis {
    /// Create an axis for a node
    pub fn new(node_id: NodeId, calibration: Calibration) -> Self {
        Self {
            node_id: Some(node_id),
            calibration,
            ..Default::default()
        }
    }

    fn require_init(&self) -> Result<(), AxisError> {
        if self.node_id.is_none() {
            log::warn!("Access to uninitialized axis");
            return Err(AxisError::NotInitialized);
        }
        Ok(())
    }

    fn read<T>(&self, value: T) -> Option<T> {
        match self.node_id {
            Some(_) => Some(value),
            None => {
                log::warn!("Read from uninitialized axis");
                None
            }
        }
    }

    /// The node ID, or None for an uninitialized axis
    pub fn node_id(&self) -> Option<NodeId> {
        self.node_id
    }

    /// The conversion constants
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Set the commanded position, and snapshot the movement relative to the current position
    pub fn set_target_position_in_steps(&mut self, steps: i32) -> Result<(), AxisError> {
        self.require_init()?;
        self.target_position = steps;
        self.relative_movement_steps = steps.wrapping_sub(self.position_actual);
        Ok(())
    }

    /// Set the commanded position in units
    pub fn set_target_position_in_units(&mut self, units: f64) -> Result<(), AxisError> {
        self.require_init()?;
        self.set_target_position_in_steps(self.calibration.units_to_steps(units))
    }

    /// Set the profile velocity
    pub fn set_profile_velocity_in_rpm(&mut self, rpm: u32) -> Result<(), AxisError> {
        self.require_init()?;
        self.profile_velocity = rpm;
        Ok(())
    }

    /// Set the profile velocity from an output speed in units/s
    pub fn set_profile_velocity_in_units_per_sec(&mut self, speed: f64) -> Result<(), AxisError> {
        self.require_init()?;
        let rpm = self.calibration.units_per_sec_to_rpm(speed) as u32;
        self.regular_speed = speed.max(0.0);
        self.set_profile_velocity_in_rpm(rpm)
    }

    /// Set the profile acceleration
    pub fn set_profile_acceleration_in_rpm_per_sec(&mut self, rpm_s: u32) -> Result<(), AxisError> {
        self.require_init()?;
        self.profile_acceleration = rpm_s;
        Ok(())
    }

    /// Set the profile acceleration from an output acceleration in units/s²
    pub fn set_profile_acceleration_in_units_per_sec2(
        &mut self,
        acceleration: f64,
    ) -> Result<(), AxisError> {
        self.require_init()?;
        let rpm_s = self.calibration.units_per_sec2_to_rpm_per_sec(acceleration) as u32;
        self.regular_acceleration = acceleration.max(0.0);
        self.set_profile_acceleration_in_rpm_per_sec(rpm_s)
    }

    /// Overwrite the mirrored position, e.g. from a bus read
    ///
    /// The target and relative movement are left alone.
    pub fn set_current_position_in_steps(&mut self, steps: i32) -> Result<(), AxisError> {
        self.require_init()?;
        self.position_actual = steps;
        self.position_known = true;
        Ok(())
    }

    /// Overwrite the mirrored position in units
    pub fn set_current_position_in_units(&mut self, units: f64) -> Result<(), AxisError> {
        self.require_init()?;
        self.set_current_position_in_steps(self.calibration.units_to_steps(units))
    }

    /// True once the position has been read from the drive or set explicitly
    pub fn is_position_known(&self) -> bool {
        self.position_known
    }

    /// Last known position
    pub fn current_position_in_steps(&self) -> Option<i32> {
        self.read(self.position_actual)
    }

    /// Last known position in units
    pub fn current_position_in_units(&self) -> Option<f64> {
        self.read(self.calibration.steps_to_units(self.position_actual))
    }

    /// Last commanded position
    pub fn target_position_in_steps(&self) -> Option<i32> {
        self.read(self.target_position)
    }

    /// Movement computed when the target was last set
    pub fn relative_movement_in_steps(&self) -> Option<i32> {
        self.read(self.relative_movement_steps)
    }

    /// Profile velocity in RPM
    pub fn profile_velocity_in_rpm(&self) -> Option<u32> {
        self.read(self.profile_velocity)
    }

    /// Profile acceleration in RPM/s
    pub fn profile_acceleration_in_rpm_per_sec(&self) -> Option<u32> {
        self.read(self.profile_acceleration)
    }

    /// Speed in units/s used for the last profile
    pub fn regular_speed(&self) -> f64 {
        self.regular_speed
    }

    /// Acceleration in units/s² used for the last profile
    pub fn regular_acceleration(&self) -> f64 {
        self.regular_acceleration
    }

    pub(crate) fn set_regular_motion(&mut self, speed: f64, acceleration: f64) {
        self.regular_speed = speed;
        self.regular_acceleration = acceleration;
    }

    /// Last controlword written
    pub fn controlword(&self) -> u16 {
        self.controlword
    }

    /// Last mode of operation written
    pub fn modes_of_operation(&self) -> i8 {
        self.modes_of_operation
    }

    /// Last statusword received
    pub fn statusword(&self) -> u16 {
        self.statusword
    }

    pub(crate) fn record_controlword(&mut self, value: u16) {
        self.controlword = value;
    }

    pub(crate) fn record_mode(&mut self, mode: i8) {
        self.modes_of_operation = mode;
    }

    pub(crate) fn record_statusword(&mut self, value: u16) {
        self.statusword = value;
    }

    /// True if heartbeats are being received
    pub fn is_alive(&self) -> bool {
        self.is_alive
    }

    /// Time of the last heartbeat
    pub fn last_heartbeat_ms(&self) -> u64 {
        self.last_heartbeat_ms
    }

    /// The state reported by the last heartbeat
    pub fn nmt_state(&self) -> Option<HeartbeatState> {
        self.nmt_state
    }

    /// Zero-initialization status
    pub fn init_status(&self) -> InitStatus {
        self.init_status
    }

    /// Movement status
    pub fn status(&self) -> AxisStatus {
        self.status
    }

    /// Statusword reads issued by the current ZEI sequence
    pub fn statusword_read_attempts(&self) -> u8 {
        self.statusword_read_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertables::*;

    fn axis() -> Axis {
        Axis::new(NodeId::new(1).unwrap(), Calibration::default())
    }

    #[test]
    fn test_conversion_round_trip() {
        let cal = Calibration {
            steps_per_motor_rev: 32768,
            gear_ratio: 5.0,
            units_per_output_rev: 360.0,
        };
        let step_units = cal.steps_to_units(1);
        for x in [0.0, 0.5, 1.0, 12.345, 90.0, 359.9, -45.25, 1000.0] {
            let back = cal.steps_to_units(cal.units_to_steps(x));
            assert_in_delta!(x, back, step_units);
        }
    }

    #[test]
    fn test_units_to_steps_truncates() {
        let cal = Calibration {
            steps_per_motor_rev: 10,
            gear_ratio: 1.0,
            units_per_output_rev: 1.0,
        };
        assert_eq!(12, cal.units_to_steps(1.29));
        assert_eq!(-12, cal.units_to_steps(-1.29));
    }

    #[test]
    fn test_rpm_conversion() {
        let cal = Calibration {
            steps_per_motor_rev: 32768,
            gear_ratio: 2.0,
            units_per_output_rev: 360.0,
        };
        // 360 units/s is one output rev per second, two motor revs per second
        assert_in_delta!(120.0, cal.units_per_sec_to_rpm(360.0), 1e-9);
        assert_in_delta!(120.0, cal.units_per_sec2_to_rpm_per_sec(360.0), 1e-9);
        assert_in_delta!(360.0, cal.rpm_to_units_per_sec(120.0), 1e-9);
        assert_eq!(0.0, cal.units_per_sec_to_rpm(-1.0));
        assert_eq!(0.0, cal.units_per_sec2_to_rpm_per_sec(-1.0));
    }

    #[test]
    fn test_degenerate_calibration_returns_zero() {
        let cal = Calibration {
            steps_per_motor_rev: 0,
            gear_ratio: 1.0,
            units_per_output_rev: 7.2,
        };
        assert_eq!(0, cal.units_to_steps(10.0));
        assert_eq!(0.0, cal.steps_to_units(1000));
        let cal = Calibration {
            units_per_output_rev: 0.0,
            ..Default::default()
        };
        assert_eq!(0, cal.units_to_steps(10.0));
        assert_eq!(0.0, cal.units_per_sec_to_rpm(10.0));
    }

    #[test]
    fn test_uninitialized_axis() {
        let mut axis = Axis::default();
        assert_eq!(Err(AxisError::NotInitialized), axis.set_target_position_in_steps(10));
        assert_eq!(Err(AxisError::NotInitialized), axis.set_target_position_in_units(1.0));
        assert_eq!(Err(AxisError::NotInitialized), axis.set_profile_velocity_in_rpm(10));
        assert_eq!(
            Err(AxisError::NotInitialized),
            axis.set_profile_acceleration_in_units_per_sec2(1.0)
        );
        assert_eq!(None, axis.current_position_in_steps());
        assert_eq!(None, axis.target_position_in_steps());
        assert_eq!(None, axis.profile_velocity_in_rpm());
        assert_eq!(None, axis.profile_acceleration_in_rpm_per_sec());
    }

    #[test]
    fn test_relative_movement_is_a_snapshot() {
        let mut axis = axis();
        axis.set_current_position_in_steps(400).unwrap();
        axis.set_target_position_in_steps(1000).unwrap();
        assert_eq!(Some(600), axis.relative_movement_in_steps());

        // Moving the mirror does not re-derive the relative movement
        axis.set_current_position_in_steps(900).unwrap();
        assert_eq!(Some(600), axis.relative_movement_in_steps());
        assert_eq!(Some(1000), axis.target_position_in_steps());
    }

    #[test]
    fn test_set_current_position_is_idempotent() {
        let mut axis = axis();
        assert!(!axis.is_position_known());
        axis.set_target_position_in_steps(77).unwrap();
        assert!(!axis.is_position_known());
        axis.set_current_position_in_steps(-5).unwrap();
        axis.set_current_position_in_steps(-5).unwrap();
        assert_eq!(Some(-5), axis.current_position_in_steps());
        assert_eq!(Some(77), axis.target_position_in_steps());
        assert!(axis.is_position_known());
    }

    #[test]
    fn test_unit_setters() {
        let cal = Calibration {
            steps_per_motor_rev: 32768,
            gear_ratio: 1.0,
            units_per_output_rev: 360.0,
        };
        let mut axis = Axis::new(NodeId::new(2).unwrap(), cal);
        axis.set_profile_velocity_in_units_per_sec(360.0).unwrap();
        assert_eq!(Some(60), axis.profile_velocity_in_rpm());
        assert_eq!(360.0, axis.regular_speed());
        axis.set_profile_acceleration_in_units_per_sec2(720.0).unwrap();
        assert_eq!(Some(120), axis.profile_acceleration_in_rpm_per_sec());
        axis.set_target_position_in_units(90.0).unwrap();
        assert_eq!(Some(8192), axis.target_position_in_steps());
    }

    #[test]
    fn test_init_status_codes() {
        assert_eq!(0, InitStatus::None.code());
        assert_eq!(1, InitStatus::Failed.code());
        assert_eq!(2, InitStatus::Ongoing.code());
        assert_eq!(3, InitStatus::Finished.code());
    }
}
