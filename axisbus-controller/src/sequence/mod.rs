//! Multi-step command sequences
//!
//! Each sequence is a state machine over the responses of a single axis. A step issues one
//! [`Request`], and the sequence does not advance until the response for that register is routed
//! back to it by the dispatcher. The state machines do no I/O themselves; the coordinator sends the
//! requests they return and feeds them the decoded responses.
use axisbus_common::{pdo::Rpdo1, Register};

mod maj;
mod zei;

pub use maj::{MajSequence, MajStep};
pub use zei::{ZeiSequence, ZeiSettings, ZeiStep};

/// A frame to be sent to an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Expedited SDO write
    Write {
        /// The target register
        register: Register,
        /// The value, as its bit pattern
        value: u32,
    },
    /// Expedited SDO read
    Read {
        /// The register to read
        register: Register,
    },
    /// The combined start command
    Rpdo1(Rpdo1),
}

impl Request {
    /// The register whose response this request waits for
    ///
    /// PDOs are not confirmed, so they occupy no response slot.
    pub fn register(&self) -> Option<Register> {
        match self {
            Request::Write { register, .. } => Some(*register),
            Request::Read { register } => Some(*register),
            Request::Rpdo1(_) => None,
        }
    }
}

/// The outcome of an SDO request, as seen by the owner of the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// The write was acknowledged
    Written,
    /// The read returned a value
    Value(i32),
    /// The drive aborted the transfer
    Aborted(u32),
    /// No response arrived in time
    TimedOut,
}

/// What a sequence wants to happen after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Send the next request
    Send(Request),
    /// Nothing to send now; the next request is issued by a periodic poll
    AwaitPoll,
    /// The sequence completed successfully
    Finished,
    /// The sequence failed
    Failed,
    /// The event did not belong to the current step
    Ignored,
}

/// The sequence currently running on an axis
///
/// An axis runs at most one sequence, which keeps ZEI and MAJ mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sequence {
    /// Zero-initialization
    Zei(ZeiSequence),
    /// Move
    Maj(MajSequence),
}
