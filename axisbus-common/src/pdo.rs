//! Process data objects exchanged with the drives
//!
//! RPDO1 and TPDO1 use fixed mappings, configured on the drives ahead of time:
//!
//! - RPDO1: controlword (u16), modes of operation (i8), target position (i32)
//! - TPDO1: statusword (u16), position actual value (i32)
use crate::{
    constants::statusword,
    messages::{CanId, CanMessage},
};

/// The combined "set mode and start move" command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rpdo1 {
    /// Value for 0x6040
    pub controlword: u16,
    /// Value for 0x6060
    pub mode: i8,
    /// Value for 0x607A
    pub target_position: i32,
}

impl Rpdo1 {
    /// Payload size in bytes
    pub const SIZE: usize = 7;

    /// Serialize the payload
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0; Self::SIZE];
        buf[0..2].copy_from_slice(&self.controlword.to_le_bytes());
        buf[2] = self.mode as u8;
        buf[3..7].copy_from_slice(&self.target_position.to_le_bytes());
        buf
    }

    /// Create a CAN frame for this PDO
    pub fn to_can_message(self, id: CanId) -> CanMessage {
        CanMessage::new(id, &self.to_bytes())
    }
}

impl TryFrom<&[u8]> for Rpdo1 {
    type Error = ();

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() < Self::SIZE {
            return Err(());
        }
        Ok(Rpdo1 {
            controlword: u16::from_le_bytes([value[0], value[1]]),
            mode: value[2] as i8,
            target_position: i32::from_le_bytes([value[3], value[4], value[5], value[6]]),
        })
    }
}

/// Status broadcast by a drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tpdo1 {
    /// Value of 0x6041
    pub statusword: u16,
    /// Value of 0x6064
    pub position: i32,
}

impl Tpdo1 {
    /// Payload size in bytes
    pub const SIZE: usize = 6;

    /// True if the target reached bit is set
    pub fn target_reached(&self) -> bool {
        self.statusword & statusword::TARGET_REACHED != 0
    }

    /// Serialize the payload
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0; Self::SIZE];
        buf[0..2].copy_from_slice(&self.statusword.to_le_bytes());
        buf[2..6].copy_from_slice(&self.position.to_le_bytes());
        buf
    }

    /// Create a CAN frame for this PDO
    pub fn to_can_message(self, id: CanId) -> CanMessage {
        CanMessage::new(id, &self.to_bytes())
    }
}

impl TryFrom<&[u8]> for Tpdo1 {
    type Error = ();

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() < Self::SIZE {
            return Err(());
        }
        Ok(Tpdo1 {
            statusword: u16::from_le_bytes([value[0], value[1]]),
            position: i32::from_le_bytes([value[2], value[3], value[4], value[5]]),
        })
    }
}
