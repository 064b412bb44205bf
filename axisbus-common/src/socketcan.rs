use std::sync::Arc;

use crate::{
    messages::{CanId, CanMessage},
    traits::{CanReceiver, CanSendError, CanSender},
};

use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Id, Socket, StandardId};

fn socketcan_id_to_axisbus_id(id: Id) -> CanId {
    match id {
        Id::Standard(id) => CanId::std(id.as_raw()),
        Id::Extended(id) => CanId::extended(id.as_raw()),
    }
}

fn axisbus_id_to_socketcan_id(id: CanId) -> Option<Id> {
    match id {
        CanId::Extended(id) => ExtendedId::new(id).map(Id::from),
        CanId::Std(id) => StandardId::new(id).map(Id::from),
    }
}

fn socketcan_frame_to_axisbus_message(frame: CanFrame) -> Option<CanMessage> {
    match frame {
        CanFrame::Data(frame) => Some(CanMessage::new(
            socketcan_id_to_axisbus_id(frame.id()),
            frame.data(),
        )),
        CanFrame::Remote(_) => None,
        CanFrame::Error(frame) => {
            log::warn!("CAN error frame received: {frame:?}");
            None
        }
    }
}

fn axisbus_message_to_socket_frame(msg: &CanMessage) -> Option<CanFrame> {
    let id = axisbus_id_to_socketcan_id(msg.id())?;
    CanFrame::new(id, msg.data())
}

/// The receiving half of a socketcan interface
#[derive(Debug, Clone)]
pub struct SocketCanReceiver {
    socket: Arc<CanSocket>,
}

impl CanReceiver for SocketCanReceiver {
    fn try_recv(&mut self) -> Option<CanMessage> {
        loop {
            match self.socket.read_frame() {
                Ok(frame) => {
                    // Remote and error frames are skipped
                    if let Some(msg) = socketcan_frame_to_axisbus_message(frame) {
                        return Some(msg);
                    }
                }
                Err(e) => {
                    if e.kind() != std::io::ErrorKind::WouldBlock {
                        log::error!("Error reading from socketcan: {e}");
                    }
                    return None;
                }
            }
        }
    }
}

/// The sending half of a socketcan interface
#[derive(Debug, Clone)]
pub struct SocketCanSender {
    socket: Arc<CanSocket>,
}

impl CanSender for SocketCanSender {
    fn send(&mut self, msg: CanMessage) -> Result<(), CanSendError> {
        let frame = axisbus_message_to_socket_frame(&msg).ok_or(CanSendError(msg))?;
        self.socket.write_frame(&frame).map_err(|e| {
            log::debug!("socketcan write failed: {e}");
            CanSendError(msg)
        })
    }
}

/// Open a socketcan device and split it into a sender and receiver object
///
/// # Arguments
/// * `device` - The name of the socketcan device to open, e.g. "vcan0", or "can0"
///
/// The socket is put in non-blocking mode, so that [`CanReceiver::try_recv`] returns immediately
/// when no frame is queued. Because both halves share one socket, the receiver does not see frames
/// written by the sender.
#[cfg_attr(docsrs, doc(cfg(feature = "socketcan")))]
pub fn open_socketcan<S: AsRef<str>>(
    device: S,
) -> Result<(SocketCanSender, SocketCanReceiver), std::io::Error> {
    let socket = CanSocket::open(device.as_ref())?;
    socket.set_nonblocking(true)?;
    let socket = Arc::new(socket);
    let receiver = SocketCanReceiver {
        socket: socket.clone(),
    };
    let sender = SocketCanSender { socket };
    Ok((sender, receiver))
}
