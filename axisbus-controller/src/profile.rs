//! Synchronized trapezoidal profiles
//!
//! The axis with the largest displacement (the lead axis) moves with the commanded speed and
//! acceleration. Every other axis gets a velocity which covers its own displacement in the same
//! cruise window, and an acceleration which reaches that velocity in the same acceleration time,
//! so that all axes start, stop accelerating, and arrive together.
use axisbus_common::NodeId;
use snafu::Snafu;

use crate::axis::Calibration;

/// How the movement values of a [`MoveCommand`] are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    /// Movement values are absolute unit positions
    Absolute,
    /// Movement values are added to the current positions
    Relative,
}

impl MoveKind {
    /// The reply prefix for this kind of move
    pub fn prefix(&self) -> &'static str {
        match self {
            MoveKind::Absolute => "MAJ",
            MoveKind::Relative => "MRJ",
        }
    }
}

/// A host move command
#[derive(Debug, Clone, PartialEq)]
pub struct MoveCommand {
    /// Absolute or relative
    pub kind: MoveKind,
    /// One value per axis, in node order
    pub movement_units: Vec<f64>,
    /// Lead axis speed in units/s
    pub speed: f64,
    /// Lead axis acceleration in units/s²
    pub acceleration: f64,
}

/// Error preparing a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum ProfileError {
    /// The command must have one value per axis
    #[snafu(display("Expected {expected} movement values, got {actual}"))]
    WrongAxisCount {
        /// The number of axes
        expected: usize,
        /// The number of values
        actual: usize,
    },
    /// No axis would move
    #[snafu(display("No axis moves"))]
    ZeroDisplacement {
        /// The first axis
        lead: NodeId,
    },
    /// The lead speed is zero in RPM
    #[snafu(display("Speed is zero for lead axis {lead}"))]
    ZeroSpeed {
        /// The lead axis
        lead: NodeId,
    },
    /// The lead acceleration is zero in RPM/s
    #[snafu(display("Acceleration is zero for lead axis {lead}"))]
    ZeroAcceleration {
        /// The lead axis
        lead: NodeId,
    },
    /// The acceleration time or the full movement time came out as zero
    #[snafu(display("Degenerate profile timing for lead axis {lead}"))]
    DegenerateTiming {
        /// The lead axis
        lead: NodeId,
    },
}

impl ProfileError {
    /// The lead axis, if one was chosen before the failure
    pub fn lead(&self) -> Option<NodeId> {
        match self {
            ProfileError::WrongAxisCount { .. } => None,
            ProfileError::ZeroDisplacement { lead }
            | ProfileError::ZeroSpeed { lead }
            | ProfileError::ZeroAcceleration { lead }
            | ProfileError::DegenerateTiming { lead } => Some(*lead),
        }
    }
}

/// One axis' share of a move
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileInput {
    /// The node
    pub node: NodeId,
    /// The axis calibration
    pub calibration: Calibration,
    /// Signed displacement in steps
    pub relative_steps: i32,
}

/// Computed profile of one axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisProfile {
    /// The node
    pub node: NodeId,
    /// Exact velocity in RPM
    pub velocity_rpm: f64,
    /// Exact acceleration in RPM/s
    pub acceleration_rpm_per_sec: f64,
    /// Velocity written to the drive
    pub profile_velocity: u32,
    /// Acceleration written to the drive
    pub profile_acceleration: u32,
}

/// A synchronized profile for all axes
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilePlan {
    /// The axis with the largest displacement
    pub lead: NodeId,
    /// Time spent accelerating, and again decelerating
    pub acceleration_time_s: f64,
    /// Time spent at cruise velocity; zero or negative for a triangular profile
    pub constant_velocity_time_s: f64,
    /// Total movement time
    pub full_time_s: f64,
    /// Per-axis profiles, in input order
    pub axes: Vec<AxisProfile>,
}

impl ProfilePlan {
    /// The profile of a node
    pub fn axis(&self, node: NodeId) -> Option<&AxisProfile> {
        self.axes.iter().find(|a| a.node == node)
    }
}

/// Compute a synchronized profile
///
/// `speed` and `acceleration` are in units/s and units/s², and apply to the lead axis.
pub fn plan_profile(
    inputs: &[ProfileInput],
    speed: f64,
    acceleration: f64,
) -> Result<ProfilePlan, ProfileError> {
    let lead = inputs
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| {
            a.relative_steps
                .unsigned_abs()
                .cmp(&b.relative_steps.unsigned_abs())
                // Prefer the first axis on ties
                .then(ib.cmp(ia))
        })
        .map(|(_, input)| *input)
        .ok_or(ProfileError::WrongAxisCount {
            expected: 1,
            actual: 0,
        })?;

    if lead.relative_steps == 0 {
        return ZeroDisplacementSnafu { lead: lead.node }.fail();
    }

    let lead_velocity = lead.calibration.units_per_sec_to_rpm(speed) as u32;
    let lead_acceleration = lead.calibration.units_per_sec2_to_rpm_per_sec(acceleration) as u32;
    if lead_velocity == 0 {
        return ZeroSpeedSnafu { lead: lead.node }.fail();
    }
    if lead_acceleration == 0 {
        return ZeroAccelerationSnafu { lead: lead.node }.fail();
    }

    let v = lead_velocity as f64;
    let a = lead_acceleration as f64;
    let lead_revs = lead
        .calibration
        .steps_to_motor_revs(lead.relative_steps)
        .abs();
    let acceleration_time_s = v / a;
    let full_time_s = lead_revs * 60.0 / v + acceleration_time_s;
    let constant_velocity_time_s = full_time_s - 2.0 * acceleration_time_s;

    if acceleration_time_s == 0.0 || full_time_s == 0.0 {
        return DegenerateTimingSnafu { lead: lead.node }.fail();
    }
    if constant_velocity_time_s <= 0.0 {
        log::warn!(
            "Movement too short to reach cruise speed on node {} (tc = {constant_velocity_time_s:.3}s)",
            lead.node
        );
    }

    let cruise_window = full_time_s - acceleration_time_s;
    let axes = inputs
        .iter()
        .map(|input| {
            if input.node == lead.node || input.relative_steps == 0 {
                return AxisProfile {
                    node: input.node,
                    velocity_rpm: v,
                    acceleration_rpm_per_sec: a,
                    profile_velocity: lead_velocity,
                    profile_acceleration: lead_acceleration,
                };
            }
            let revs = input
                .calibration
                .steps_to_motor_revs(input.relative_steps)
                .abs();
            let velocity_rpm = revs * 60.0 / cruise_window;
            let acceleration_rpm_per_sec = velocity_rpm / acceleration_time_s;
            AxisProfile {
                node: input.node,
                velocity_rpm,
                acceleration_rpm_per_sec,
                profile_velocity: (velocity_rpm as u32).max(1),
                profile_acceleration: (acceleration_rpm_per_sec as u32).max(1),
            }
        })
        .collect();

    Ok(ProfilePlan {
        lead: lead.node,
        acceleration_time_s,
        constant_velocity_time_s,
        full_time_s,
        axes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertables::*;

    fn node(id: u8) -> NodeId {
        NodeId::new(id).unwrap()
    }

    fn cal() -> Calibration {
        Calibration {
            steps_per_motor_rev: 100,
            gear_ratio: 1.0,
            units_per_output_rev: 360.0,
        }
    }

    fn input(id: u8, steps: i32) -> ProfileInput {
        ProfileInput {
            node: node(id),
            calibration: cal(),
            relative_steps: steps,
        }
    }

    fn total_time(p: &AxisProfile, steps: i32) -> f64 {
        let revs = cal().steps_to_motor_revs(steps).abs();
        let ta = p.velocity_rpm / p.acceleration_rpm_per_sec;
        revs * 60.0 / p.velocity_rpm + ta
    }

    #[test]
    fn test_two_axes_arrive_together() {
        // 360 units/s = 60 RPM, 720 units/s² = 120 RPM/s
        let plan = plan_profile(&[input(1, 100), input(2, 50)], 360.0, 720.0).unwrap();
        assert_eq!(node(1), plan.lead);
        assert_in_delta!(0.5, plan.acceleration_time_s, 1e-9);
        assert_in_delta!(1.5, plan.full_time_s, 1e-9);
        assert_in_delta!(0.5, plan.constant_velocity_time_s, 1e-9);

        let lead = plan.axis(node(1)).unwrap();
        assert_eq!(60, lead.profile_velocity);
        assert_eq!(120, lead.profile_acceleration);

        let other = plan.axis(node(2)).unwrap();
        assert_in_delta!(30.0, other.velocity_rpm, 1e-9);
        assert_in_delta!(60.0, other.acceleration_rpm_per_sec, 1e-9);

        for (p, steps) in [(lead, 100), (other, 50)] {
            assert_in_delta!(plan.full_time_s, total_time(p, steps), 1e-9);
            let ta = p.velocity_rpm / p.acceleration_rpm_per_sec;
            assert_in_delta!(plan.acceleration_time_s, ta, 1e-9);
        }
    }

    #[test]
    fn test_lead_is_largest_absolute_displacement() {
        let plan = plan_profile(&[input(1, 40), input(2, -90), input(3, 90)], 360.0, 720.0).unwrap();
        assert_eq!(node(2), plan.lead);
        let p3 = plan.axis(node(3)).unwrap();
        assert_in_delta!(60.0, p3.velocity_rpm, 1e-9);
    }

    #[test]
    fn test_zero_displacement_axis_gets_lead_profile() {
        let plan = plan_profile(&[input(1, 0), input(2, 200)], 360.0, 720.0).unwrap();
        assert_eq!(node(2), plan.lead);
        assert_eq!(60, plan.axis(node(1)).unwrap().profile_velocity);
    }

    #[test]
    fn test_small_displacement_clamped_to_one() {
        let plan = plan_profile(&[input(1, 100000), input(2, 1)], 360.0, 720.0).unwrap();
        let p2 = plan.axis(node(2)).unwrap();
        assert_eq!(1, p2.profile_velocity);
        assert_eq!(1, p2.profile_acceleration);
    }

    #[test]
    fn test_degenerate_commands() {
        assert_eq!(
            Err(ProfileError::ZeroDisplacement { lead: node(1) }),
            plan_profile(&[input(1, 0), input(2, 0)], 360.0, 720.0)
        );
        assert_eq!(
            Err(ProfileError::ZeroSpeed { lead: node(2) }),
            plan_profile(&[input(1, 10), input(2, 20)], 0.0, 720.0)
        );
        assert_eq!(
            Err(ProfileError::ZeroAcceleration { lead: node(1) }),
            plan_profile(&[input(1, 10)], 360.0, 1.0)
        );
        assert_eq!(
            Err(ProfileError::ZeroSpeed { lead: node(1) }),
            plan_profile(&[input(1, 10)], -360.0, 720.0)
        );
        assert_eq!(None, ProfileError::WrongAxisCount { expected: 2, actual: 1 }.lead());
    }

    #[test]
    fn test_triangular_profile_proceeds() {
        // 1 rev at 60 RPM with 6 RPM/s never reaches cruise
        let plan = plan_profile(&[input(1, 100)], 360.0, 36.0).unwrap();
        assert_lt!(plan.constant_velocity_time_s, 0.0);
    }
}
