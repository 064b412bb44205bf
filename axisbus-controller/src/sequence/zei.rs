use axisbus_common::{
    constants::{controlword, modes, statusword, values},
    Register,
};

use super::{Request, Response, Transition};

/// Options for the ZEI sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeiSettings {
    /// Run the reference move after the key writes
    pub reference_move: bool,
    /// Maximum statusword reads waiting for target reached
    pub statusword_attempts: u8,
    /// Time between statusword reads
    pub poll_interval_ms: u64,
}

impl From<crate::config::ZeiConfig> for ZeiSettings {
    fn from(value: crate::config::ZeiConfig) -> Self {
        Self {
            reference_move: value.reference_move,
            statusword_attempts: value.statusword_attempts,
            poll_interval_ms: value.poll_interval_ms,
        }
    }
}

/// The step a ZEI sequence is waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeiStep {
    /// controlword <- 0x0000
    Disable,
    /// 0x260A <- 0xEA66
    FirstKey,
    /// 0x260A <- 0xEA70
    SecondKey,
    /// controlword <- 0x000F
    Enable,
    /// modes of operation <- profile position
    SetMode,
    /// read position actual value
    ReadPosition,
    /// controlword <- 0x002F
    ArmSetpoint,
    /// target position <- the position just read
    WriteTarget,
    /// read statusword until target reached
    PollStatus,
}

/// Zero-initialization of one axis
///
/// The base sequence writes the controlword and the two zeroing keys, then enables the drive. With
/// [`ZeiSettings::reference_move`] it then commands the drive to its current position and waits
/// for the target reached bit, reading the statusword at most
/// [`ZeiSettings::statusword_attempts`] times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeiSequence {
    settings: ZeiSettings,
    step: ZeiStep,
    reference_position: i32,
    attempts: u8,
    next_poll_ms: Option<u64>,
}

impl ZeiSequence {
    /// Create a sequence, and return the first request to send
    pub fn start(settings: ZeiSettings) -> (Self, Request) {
        let seq = Self {
            settings,
            step: ZeiStep::Disable,
            reference_position: 0,
            attempts: 0,
            next_poll_ms: None,
        };
        (seq, write(Register::Controlword, controlword::DISABLE as u32))
    }

    /// The current step
    pub fn step(&self) -> ZeiStep {
        self.step
    }

    /// Statusword reads issued so far
    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    /// The register whose response the current step waits for
    pub fn expected_register(&self) -> Register {
        match self.step {
            ZeiStep::Disable | ZeiStep::Enable | ZeiStep::ArmSetpoint => Register::Controlword,
            ZeiStep::FirstKey | ZeiStep::SecondKey => Register::ElectronicGearMolecules,
            ZeiStep::SetMode => Register::ModesOfOperation,
            ZeiStep::ReadPosition => Register::PositionActualValue,
            ZeiStep::WriteTarget => Register::TargetPosition,
            ZeiStep::PollStatus => Register::Statusword,
        }
    }

    /// Advance on a response
    pub fn on_response(&mut self, register: Register, response: Response, now_ms: u64) -> Transition {
        if register != self.expected_register() || self.next_poll_ms.is_some() {
            return Transition::Ignored;
        }

        match (self.step, response) {
            (_, Response::Aborted(_)) | (_, Response::TimedOut) => Transition::Failed,
            (ZeiStep::Disable, Response::Written) => {
                self.step = ZeiStep::FirstKey;
                Transition::Send(write(
                    Register::ElectronicGearMolecules,
                    values::ZERO_INIT_KEY_FIRST,
                ))
            }
            (ZeiStep::FirstKey, Response::Written) => {
                self.step = ZeiStep::SecondKey;
                Transition::Send(write(
                    Register::ElectronicGearMolecules,
                    values::ZERO_INIT_KEY_SECOND,
                ))
            }
            (ZeiStep::SecondKey, Response::Written) => {
                self.step = ZeiStep::Enable;
                Transition::Send(write(
                    Register::Controlword,
                    controlword::ENABLE_OPERATION as u32,
                ))
            }
            (ZeiStep::Enable, Response::Written) => {
                if !self.settings.reference_move {
                    return Transition::Finished;
                }
                self.step = ZeiStep::SetMode;
                Transition::Send(write(
                    Register::ModesOfOperation,
                    modes::PROFILE_POSITION as u8 as u32,
                ))
            }
            (ZeiStep::SetMode, Response::Written) => {
                self.step = ZeiStep::ReadPosition;
                Transition::Send(Request::Read {
                    register: Register::PositionActualValue,
                })
            }
            (ZeiStep::ReadPosition, Response::Value(position)) => {
                self.reference_position = position;
                self.step = ZeiStep::ArmSetpoint;
                Transition::Send(write(
                    Register::Controlword,
                    controlword::ARM_SETPOINT as u32,
                ))
            }
            (ZeiStep::ArmSetpoint, Response::Written) => {
                self.step = ZeiStep::WriteTarget;
                Transition::Send(write(
                    Register::TargetPosition,
                    self.reference_position as u32,
                ))
            }
            (ZeiStep::WriteTarget, Response::Written) => {
                self.step = ZeiStep::PollStatus;
                self.attempts = 1;
                Transition::Send(Request::Read {
                    register: Register::Statusword,
                })
            }
            (ZeiStep::PollStatus, Response::Value(sw)) => {
                if sw as u16 & statusword::TARGET_REACHED != 0 {
                    Transition::Finished
                } else if self.attempts >= self.settings.statusword_attempts {
                    log::warn!("Target not reached after {} statusword reads", self.attempts);
                    Transition::Failed
                } else {
                    self.next_poll_ms = Some(now_ms + self.settings.poll_interval_ms);
                    Transition::AwaitPoll
                }
            }
            // A read answered with an ack, or the reverse
            _ => Transition::Failed,
        }
    }

    /// Issue the next statusword read once the poll interval has elapsed
    pub fn poll(&mut self, now_ms: u64) -> Option<Request> {
        match self.next_poll_ms {
            Some(t) if now_ms >= t => {
                self.next_poll_ms = None;
                self.attempts += 1;
                Some(Request::Read {
                    register: Register::Statusword,
                })
            }
            _ => None,
        }
    }
}

fn write(register: Register, value: u32) -> Request {
    Request::Write { register, value }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(reference_move: bool) -> ZeiSettings {
        ZeiSettings {
            reference_move,
            statusword_attempts: 3,
            poll_interval_ms: 1000,
        }
    }

    /// Acknowledge whatever was requested, returning the next transition
    fn ack(seq: &mut ZeiSequence, req: Request, now: u64) -> Transition {
        match req {
            Request::Write { register, .. } => seq.on_response(register, Response::Written, now),
            Request::Read { register } => seq.on_response(register, Response::Value(0), now),
            Request::Rpdo1(_) => panic!("ZEI never sends a PDO"),
        }
    }

    #[test]
    fn test_base_sequence_order() {
        let (mut seq, mut req) = ZeiSequence::start(settings(false));
        let mut sent = vec![req];
        loop {
            match ack(&mut seq, req, 0) {
                Transition::Send(next) => {
                    sent.push(next);
                    req = next;
                }
                Transition::Finished => break,
                other => panic!("Unexpected {other:?}"),
            }
        }
        assert_eq!(
            vec![
                write(Register::Controlword, 0x0000),
                write(Register::ElectronicGearMolecules, 0xEA66),
                write(Register::ElectronicGearMolecules, 0xEA70),
                write(Register::Controlword, 0x000F),
            ],
            sent
        );
    }

    #[test]
    fn test_abort_fails_sequence() {
        let (mut seq, _) = ZeiSequence::start(settings(false));
        let t = seq.on_response(Register::Controlword, Response::Written, 0);
        assert!(matches!(t, Transition::Send(_)));
        let t = seq.on_response(
            Register::ElectronicGearMolecules,
            Response::Aborted(0x0601_0002),
            0,
        );
        assert_eq!(Transition::Failed, t);
    }

    #[test]
    fn test_response_for_other_register_ignored() {
        let (mut seq, _) = ZeiSequence::start(settings(false));
        assert_eq!(
            Transition::Ignored,
            seq.on_response(Register::TargetPosition, Response::Written, 0)
        );
        assert_eq!(ZeiStep::Disable, seq.step());
    }

    #[test]
    fn test_reference_move() {
        let (mut seq, req) = ZeiSequence::start(settings(true));
        let mut req = req;
        // Walk through the base writes and the mode write
        for _ in 0..5 {
            match ack(&mut seq, req, 0) {
                Transition::Send(next) => req = next,
                other => panic!("Unexpected {other:?}"),
            }
        }
        assert_eq!(
            Request::Read {
                register: Register::PositionActualValue
            },
            req
        );
        let t = seq.on_response(Register::PositionActualValue, Response::Value(-1234), 0);
        assert_eq!(Transition::Send(write(Register::Controlword, 0x2F)), t);
        let t = seq.on_response(Register::Controlword, Response::Written, 0);
        assert_eq!(
            Transition::Send(write(Register::TargetPosition, -1234i32 as u32)),
            t
        );
        let t = seq.on_response(Register::TargetPosition, Response::Written, 0);
        assert_eq!(
            Transition::Send(Request::Read {
                register: Register::Statusword
            }),
            t
        );
        assert_eq!(1, seq.attempts());

        // Not reached; wait for the poll interval
        let t = seq.on_response(Register::Statusword, Response::Value(0x0237), 100);
        assert_eq!(Transition::AwaitPoll, t);
        assert_eq!(None, seq.poll(500));
        assert!(seq.poll(1100).is_some());
        assert_eq!(2, seq.attempts());
        let t = seq.on_response(Register::Statusword, Response::Value(0x0637), 1200);
        assert_eq!(Transition::Finished, t);
    }

    #[test]
    fn test_statusword_attempts_exhausted() {
        let mut seq = ZeiSequence {
            settings: settings(true),
            step: ZeiStep::PollStatus,
            reference_position: 0,
            attempts: 1,
            next_poll_ms: None,
        };
        let mut now = 0;
        assert_eq!(
            Transition::AwaitPoll,
            seq.on_response(Register::Statusword, Response::Value(0), now)
        );
        now += 1000;
        assert!(seq.poll(now).is_some());
        assert_eq!(
            Transition::AwaitPoll,
            seq.on_response(Register::Statusword, Response::Value(0), now)
        );
        now += 1000;
        assert!(seq.poll(now).is_some());
        assert_eq!(3, seq.attempts());
        assert_eq!(
            Transition::Failed,
            seq.on_response(Register::Statusword, Response::Value(0), now)
        );
    }
}
