//! Common traits

use std::error;

use crate::messages::CanMessage;

/// Error type for CAN send operations containing the failed message
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct CanSendError(pub CanMessage);

impl core::fmt::Display for CanSendError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Failed to send CAN message on {}", self.0.id())
    }
}

impl error::Error for CanSendError {}

/// A synchronous can sender
///
/// Sends are expected to queue and return; they must not wait for the frame to be acknowledged on
/// the bus.
pub trait CanSender {
    /// Send a message to the bus
    fn send(&mut self, msg: CanMessage) -> Result<(), CanSendError>;
}

impl<T: CanSender + ?Sized> CanSender for &mut T {
    fn send(&mut self, msg: CanMessage) -> Result<(), CanSendError> {
        (**self).send(msg)
    }
}

/// A synchronous can receiver
pub trait CanReceiver {
    /// Attempt to read a message from the receiver, and return None immediately if no message is
    /// available
    fn try_recv(&mut self) -> Option<CanMessage>;
}
