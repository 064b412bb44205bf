//! CAN frames and the classification of frames produced by the drives
//!
//! Only the subset of CANopen needed to coordinate the axes is represented: heartbeats, expedited
//! SDO responses and TPDO1. Everything else on the bus is reported as
//! [`MessageError::UnrecognizedId`] so that callers can ignore it.
use snafu::Snafu;

use crate::{
    constants::cob,
    node_id::NodeId,
    pdo::Tpdo1,
    sdo::{SdoError, SdoResponse},
};

/// A CAN identifier
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CanId {
    /// An extended 29-bit identifier
    Extended(u32),
    /// A standard 11-bit identifier
    Std(u16),
}

impl CanId {
    /// Create a new extended ID
    pub const fn extended(id: u32) -> CanId {
        CanId::Extended(id)
    }

    /// Create a new standard ID
    pub const fn std(id: u16) -> CanId {
        CanId::Std(id)
    }

    /// Get the raw ID as a u32
    pub fn raw(&self) -> u32 {
        match self {
            CanId::Extended(id) => *id,
            CanId::Std(id) => *id as u32,
        }
    }
}

impl core::fmt::Display for CanId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CanId::Extended(id) => write!(f, "0x{id:08X}"),
            CanId::Std(id) => write!(f, "0x{id:03X}"),
        }
    }
}

/// The maximum payload of a classic CAN frame
pub const MAX_DATA_LENGTH: usize = 8;

/// A classic CAN data frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanMessage {
    /// The data bytes; only the first `dlc` are valid
    pub data: [u8; MAX_DATA_LENGTH],
    /// The number of valid bytes in `data`
    pub dlc: u8,
    /// The frame identifier
    pub id: CanId,
}

impl Default for CanMessage {
    fn default() -> Self {
        Self {
            data: [0; MAX_DATA_LENGTH],
            dlc: 0,
            id: CanId::Std(0),
        }
    }
}

impl CanMessage {
    /// Create a new frame
    ///
    /// Data beyond [`MAX_DATA_LENGTH`] bytes is discarded.
    pub fn new(id: CanId, data: &[u8]) -> Self {
        let dlc = data.len().min(MAX_DATA_LENGTH);
        let mut buf = [0u8; MAX_DATA_LENGTH];
        buf[0..dlc].copy_from_slice(&data[0..dlc]);

        Self {
            id,
            dlc: dlc as u8,
            data: buf,
        }
    }

    /// Get the identifier
    pub fn id(&self) -> CanId {
        self.id
    }

    /// Get the valid data bytes
    pub fn data(&self) -> &[u8] {
        &self.data[0..self.dlc as usize]
    }
}

/// The NMT state reported in a heartbeat
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HeartbeatState {
    /// 0x00, sent once after power up
    BootUp,
    /// 0x04, reported by the drives when a fault is latched
    Alarm,
    /// 0x05
    Operational,
    /// 0x7F
    PreOperational,
    /// Any other state byte
    Unknown(u8),
}

impl From<u8> for HeartbeatState {
    fn from(value: u8) -> Self {
        match value & 0x7F {
            0x00 => HeartbeatState::BootUp,
            0x04 => HeartbeatState::Alarm,
            0x05 => HeartbeatState::Operational,
            0x7F => HeartbeatState::PreOperational,
            other => HeartbeatState::Unknown(other),
        }
    }
}

impl From<HeartbeatState> for u8 {
    fn from(value: HeartbeatState) -> Self {
        match value {
            HeartbeatState::BootUp => 0x00,
            HeartbeatState::Alarm => 0x04,
            HeartbeatState::Operational => 0x05,
            HeartbeatState::PreOperational => 0x7F,
            HeartbeatState::Unknown(v) => v & 0x7F,
        }
    }
}

/// A heartbeat message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    /// The producing node
    pub node: NodeId,
    /// The reported state
    pub state: HeartbeatState,
}

impl From<Heartbeat> for CanMessage {
    fn from(value: Heartbeat) -> Self {
        CanMessage::new(
            CanId::Std(cob::HEARTBEAT_BASE | value.node.raw() as u16),
            &[value.state.into()],
        )
    }
}

/// The COB-ID bases used for the process data objects
///
/// SDO and heartbeat bases are fixed by the predefined connection set, but the PDO bases depend
/// on how the drives were configured.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CobLayout {
    /// Base for RPDO1 frames sent to the drives
    pub rpdo1_base: u16,
    /// Base for TPDO1 frames produced by the drives
    pub tpdo1_base: u16,
}

impl Default for CobLayout {
    fn default() -> Self {
        Self {
            rpdo1_base: cob::RPDO1_BASE,
            tpdo1_base: cob::TPDO1_BASE,
        }
    }
}

impl CobLayout {
    /// The COB-ID of an SDO request to `node`
    pub fn sdo_request_id(&self, node: NodeId) -> CanId {
        CanId::Std(cob::SDO_REQ_BASE + node.raw() as u16)
    }

    /// The COB-ID of an SDO response from `node`
    pub fn sdo_response_id(&self, node: NodeId) -> CanId {
        CanId::Std(cob::SDO_RESP_BASE + node.raw() as u16)
    }

    /// The COB-ID of RPDO1 for `node`
    pub fn rpdo1_id(&self, node: NodeId) -> CanId {
        CanId::Std(self.rpdo1_base + node.raw() as u16)
    }

    /// The COB-ID of TPDO1 from `node`
    pub fn tpdo1_id(&self, node: NodeId) -> CanId {
        CanId::Std(self.tpdo1_base + node.raw() as u16)
    }

    /// Classify a received frame
    pub fn classify(&self, msg: &CanMessage) -> Result<DriveMessage, MessageError> {
        let cob_id = msg.id();
        let raw = match cob_id {
            CanId::Std(raw) => raw,
            CanId::Extended(_) => return UnrecognizedIdSnafu { cob_id }.fail(),
        };
        let base = raw & cob::FUNCTION_MASK;
        let node_raw = (raw & cob::NODE_MASK) as u8;

        let is_known =
            base == cob::HEARTBEAT_BASE || base == cob::SDO_RESP_BASE || base == self.tpdo1_base;
        if !is_known {
            return UnrecognizedIdSnafu { cob_id }.fail();
        }
        let node = NodeId::new(node_raw).map_err(|_| MessageError::InvalidNodeId { cob_id })?;

        if base == cob::HEARTBEAT_BASE {
            let state = *msg.data().first().ok_or(MessageError::MessageTooShort { cob_id })?;
            Ok(DriveMessage::Heartbeat(Heartbeat {
                node,
                state: state.into(),
            }))
        } else if base == cob::SDO_RESP_BASE {
            let resp = SdoResponse::try_from(msg.data())
                .map_err(|source| MessageError::MalformedSdo { cob_id, source })?;
            Ok(DriveMessage::SdoResponse { node, resp })
        } else {
            let pdo = Tpdo1::try_from(msg.data())
                .map_err(|_| MessageError::MessageTooShort { cob_id })?;
            Ok(DriveMessage::Tpdo1 { node, pdo })
        }
    }
}

/// A frame produced by one of the drives
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveMessage {
    /// A heartbeat
    Heartbeat(Heartbeat),
    /// An expedited SDO response
    SdoResponse {
        /// The responding node
        node: NodeId,
        /// The decoded response
        resp: SdoResponse,
    },
    /// Cyclic statusword and position broadcast
    Tpdo1 {
        /// The producing node
        node: NodeId,
        /// The decoded payload
        pdo: Tpdo1,
    },
}

impl DriveMessage {
    /// The node which produced the message
    pub fn node(&self) -> NodeId {
        match self {
            DriveMessage::Heartbeat(hb) => hb.node,
            DriveMessage::SdoResponse { node, .. } => *node,
            DriveMessage::Tpdo1 { node, .. } => *node,
        }
    }
}

impl TryFrom<CanMessage> for DriveMessage {
    type Error = MessageError;

    /// Classify a message using the default PDO layout
    fn try_from(msg: CanMessage) -> Result<Self, Self::Error> {
        CobLayout::default().classify(&msg)
    }
}

/// Error returned when a frame cannot be classified
#[derive(Debug, Clone, Copy, PartialEq, Snafu)]
pub enum MessageError {
    /// The frame carries fewer bytes than its type requires
    #[snafu(display("Message on {cob_id} is too short"))]
    MessageTooShort {
        /// The frame identifier
        cob_id: CanId,
    },
    /// The frame is an SDO response which could not be decoded
    #[snafu(display("Malformed SDO response on {cob_id}: {source}"))]
    MalformedSdo {
        /// The frame identifier
        cob_id: CanId,
        /// The decode error
        source: SdoError,
    },
    /// The COB-ID does not carry a valid node ID
    #[snafu(display("Invalid node ID in {cob_id}"))]
    InvalidNodeId {
        /// The frame identifier
        cob_id: CanId,
    },
    /// The COB-ID is not one produced by a drive
    #[snafu(display("Unrecognized message ID {cob_id}"))]
    UnrecognizedId {
        /// The frame identifier
        cob_id: CanId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::Register;

    fn node(id: u8) -> NodeId {
        NodeId::new(id).unwrap()
    }

    #[test]
    fn test_heartbeat_classification() {
        let msg = CanMessage::new(CanId::Std(0x703), &[0x85]);
        let expected = DriveMessage::Heartbeat(Heartbeat {
            node: node(3),
            state: HeartbeatState::Operational,
        });
        assert_eq!(Ok(expected), DriveMessage::try_from(msg));

        let msg = CanMessage::new(CanId::Std(0x701), &[0x04]);
        match DriveMessage::try_from(msg).unwrap() {
            DriveMessage::Heartbeat(hb) => assert_eq!(HeartbeatState::Alarm, hb.state),
            other => panic!("Unexpected {other:?}"),
        }

        let empty = CanMessage::new(CanId::Std(0x701), &[]);
        assert!(matches!(
            DriveMessage::try_from(empty),
            Err(MessageError::MessageTooShort { .. })
        ));
    }

    #[test]
    fn test_node_zero_rejected() {
        let msg = CanMessage::new(CanId::Std(0x580), &[0x60, 0x40, 0x60, 0, 0, 0, 0, 0]);
        assert!(matches!(
            DriveMessage::try_from(msg),
            Err(MessageError::InvalidNodeId { .. })
        ));
    }

    #[test]
    fn test_sdo_ack_classification() {
        let msg = CanMessage::new(CanId::Std(0x581), &[0x60, 0x40, 0x60, 0x00, 0, 0, 0, 0]);
        match DriveMessage::try_from(msg).unwrap() {
            DriveMessage::SdoResponse { node: n, resp } => {
                assert_eq!(node(1), n);
                assert_eq!(
                    SdoResponse::ConfirmDownload {
                        index: Register::Controlword.index(),
                        sub: 0
                    },
                    resp
                );
            }
            other => panic!("Unexpected {other:?}"),
        }
    }

    #[test]
    fn test_tpdo_with_custom_base() {
        let layout = CobLayout {
            rpdo1_base: 0x300,
            tpdo1_base: 0x280,
        };
        let msg = CanMessage::new(CanId::Std(0x282), &[0x00, 0x04, 0xE8, 0x03, 0, 0]);
        match layout.classify(&msg).unwrap() {
            DriveMessage::Tpdo1 { node: n, pdo } => {
                assert_eq!(node(2), n);
                assert!(pdo.target_reached());
                assert_eq!(1000, pdo.position);
            }
            other => panic!("Unexpected {other:?}"),
        }
        // The default layout does not know this base
        assert!(matches!(
            DriveMessage::try_from(msg),
            Err(MessageError::UnrecognizedId { .. })
        ));
    }

    #[test]
    fn test_unrelated_traffic() {
        let sdo_request = CanMessage::new(CanId::Std(0x601), &[0x40, 0x64, 0x60, 0, 0, 0, 0, 0]);
        assert!(matches!(
            DriveMessage::try_from(sdo_request),
            Err(MessageError::UnrecognizedId { .. })
        ));
        let ext = CanMessage::new(CanId::Extended(0x701), &[0x05]);
        assert!(matches!(
            DriveMessage::try_from(ext),
            Err(MessageError::UnrecognizedId { .. })
        ));
    }

    #[test]
    fn test_message_truncates_long_data() {
        let msg = CanMessage::new(CanId::Std(1), &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(8, msg.data().len());
    }
}
