//! Constants defining COB-ID bases and special register values
//!
//!

/// Function code bases for the predefined connection set
///
/// The node ID is added to the base to form the COB-ID.
pub mod cob {
    /// Heartbeat / boot-up messages produced by a node
    pub const HEARTBEAT_BASE: u16 = 0x700;
    /// The default base ID for sending SDO requests (server node ID is added)
    pub const SDO_REQ_BASE: u16 = 0x600;
    /// The default base ID for sending SDO responses (server node ID is added)
    pub const SDO_RESP_BASE: u16 = 0x580;
    /// Default base for RPDO1 (controller -> drive)
    pub const RPDO1_BASE: u16 = 0x200;
    /// Default base for TPDO1 (drive -> controller)
    pub const TPDO1_BASE: u16 = 0x180;
    /// Mask selecting the function code bits of a standard COB-ID
    pub const FUNCTION_MASK: u16 = 0x780;
    /// Mask selecting the node ID bits of a standard COB-ID
    pub const NODE_MASK: u16 = 0x7F;
}

/// Controlword (0x6040) values written by the controller
pub mod controlword {
    /// Drive disabled, all command bits cleared
    pub const DISABLE: u16 = 0x0000;
    /// Switch on + enable voltage + quick stop inactive + enable operation
    pub const ENABLE_OPERATION: u16 = 0x000F;
    /// New set-point bit; the drive acknowledges it in the statusword
    pub const NEW_SETPOINT: u16 = 1 << 4;
    /// Enable operation with the "change set immediately" bit set (bit 5)
    pub const ARM_SETPOINT: u16 = 0x002F;
    /// Enable operation, new set-point (bit 4), change immediately (bit 5), absolute target
    pub const START_ABSOLUTE_MOVE: u16 = 0x003F;
}

/// Statusword (0x6041) bit masks
pub mod statusword {
    /// Target reached
    pub const TARGET_REACHED: u16 = 1 << 10;
    /// Set-point acknowledge, held while the new set-point bit of the controlword is set
    pub const SETPOINT_ACKNOWLEDGE: u16 = 1 << 12;
}

/// Modes of operation (0x6060) values
pub mod modes {
    /// Profile position mode
    pub const PROFILE_POSITION: i8 = 1;
}

/// Vendor specific values
pub mod values {
    /// First key written to the electronic gear molecules register to zero the encoder
    pub const ZERO_INIT_KEY_FIRST: u32 = 0xEA66;
    /// Second key written to the electronic gear molecules register to zero the encoder
    pub const ZERO_INIT_KEY_SECOND: u32 = 0xEA70;
}
