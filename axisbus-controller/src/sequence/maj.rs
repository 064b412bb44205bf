use axisbus_common::{
    constants::{controlword, statusword},
    pdo::{Rpdo1, Tpdo1},
    Register,
};

use super::{Request, Response, Transition};

/// The step a MAJ sequence is waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MajStep {
    /// profile velocity written
    ProfileVelocity,
    /// controlword <- 0x000F
    Enable,
    /// profile acceleration written
    ProfileAcceleration,
    /// RPDO1 sent, waiting for target reached
    Moving,
}

/// Move of one axis to a prepared target
///
/// The profile registers are written one at a time, then a single RPDO1 sets the mode, the target
/// and the start bits together. Completion is detected from the target reached bit, either in a
/// TPDO1 or in a polled statusword.
///
/// An idle drive holds target reached, so the bit only counts once the drive has taken the new
/// set-point: a statusword with set-point acknowledge set, or with target reached cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MajSequence {
    step: MajStep,
    profile_acceleration: u32,
    start: Rpdo1,
    setpoint_taken: bool,
}

impl MajSequence {
    /// Create a sequence, and return the first request to send
    pub fn start(profile_velocity: u32, profile_acceleration: u32, start: Rpdo1) -> (Self, Request) {
        let seq = Self {
            step: MajStep::ProfileVelocity,
            profile_acceleration,
            start,
            setpoint_taken: false,
        };
        let req = Request::Write {
            register: Register::ProfileVelocity,
            value: profile_velocity,
        };
        (seq, req)
    }

    /// The current step
    pub fn step(&self) -> MajStep {
        self.step
    }

    /// True once the start command has been sent
    pub fn is_moving(&self) -> bool {
        self.step == MajStep::Moving
    }

    /// The start command
    pub fn start_command(&self) -> Rpdo1 {
        self.start
    }

    /// True once a statusword has shown that the drive took the new set-point
    pub fn setpoint_taken(&self) -> bool {
        self.setpoint_taken
    }

    /// Evaluate a statusword received while moving
    fn on_statusword(&mut self, sw: u16) -> Transition {
        if sw & statusword::SETPOINT_ACKNOWLEDGE != 0 || sw & statusword::TARGET_REACHED == 0 {
            self.setpoint_taken = true;
        }
        if self.setpoint_taken && sw & statusword::TARGET_REACHED != 0 {
            Transition::Finished
        } else {
            Transition::AwaitPoll
        }
    }

    /// Advance on an SDO response
    pub fn on_response(&mut self, register: Register, response: Response) -> Transition {
        match (self.step, register, response) {
            (MajStep::Moving, Register::Statusword, Response::Value(sw)) => {
                self.on_statusword(sw as u16)
            }
            // Lost polls are retried by the next tick; liveness is covered by the heartbeat
            (MajStep::Moving, Register::Statusword, Response::TimedOut) => Transition::AwaitPoll,
            (MajStep::Moving, Register::Statusword, Response::Aborted(_)) => Transition::Failed,
            (MajStep::Moving, _, _) => Transition::Ignored,
            (step, register, _) if register != expected_register(step) => Transition::Ignored,
            (_, _, Response::Aborted(_)) | (_, _, Response::TimedOut) => Transition::Failed,
            (MajStep::ProfileVelocity, _, Response::Written) => {
                self.step = MajStep::Enable;
                Transition::Send(Request::Write {
                    register: Register::Controlword,
                    value: controlword::ENABLE_OPERATION as u32,
                })
            }
            (MajStep::Enable, _, Response::Written) => {
                self.step = MajStep::ProfileAcceleration;
                Transition::Send(Request::Write {
                    register: Register::ProfileAcceleration,
                    value: self.profile_acceleration,
                })
            }
            (MajStep::ProfileAcceleration, _, Response::Written) => {
                self.step = MajStep::Moving;
                Transition::Send(Request::Rpdo1(self.start))
            }
            // A value where an ack was expected
            _ => Transition::Failed,
        }
    }

    /// Check a TPDO1 broadcast for completion
    pub fn on_tpdo(&mut self, pdo: &Tpdo1) -> Transition {
        if self.step != MajStep::Moving {
            return Transition::Ignored;
        }
        match self.on_statusword(pdo.statusword) {
            Transition::AwaitPoll => Transition::Ignored,
            t => t,
        }
    }
}

fn expected_register(step: MajStep) -> Register {
    match step {
        MajStep::ProfileVelocity => Register::ProfileVelocity,
        MajStep::Enable => Register::Controlword,
        MajStep::ProfileAcceleration => Register::ProfileAcceleration,
        MajStep::Moving => Register::Statusword,
    }
}
