//! Object dictionary entries accessed on the drives
//!

/// The drive registers the controller reads and writes
///
/// Each register has a fixed size on the wire, which selects the expedited SDO command specifier
/// used to write it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum Register {
    /// Vendor specific register used as the zero-initialization key
    ElectronicGearMolecules = 0x260A,
    /// DS-402 controlword
    Controlword = 0x6040,
    /// DS-402 statusword
    Statusword = 0x6041,
    /// DS-402 modes of operation
    ModesOfOperation = 0x6060,
    /// Current position in steps
    PositionActualValue = 0x6064,
    /// Commanded position in steps
    TargetPosition = 0x607A,
    /// Profile velocity in RPM
    ProfileVelocity = 0x6081,
    /// Profile acceleration in RPM/s
    ProfileAcceleration = 0x6083,
}

impl Register {
    /// All registers with a dispatch slot
    pub const ALL: [Register; 8] = [
        Register::ElectronicGearMolecules,
        Register::Controlword,
        Register::Statusword,
        Register::ModesOfOperation,
        Register::PositionActualValue,
        Register::TargetPosition,
        Register::ProfileVelocity,
        Register::ProfileAcceleration,
    ];

    /// The object index
    pub const fn index(self) -> u16 {
        self as u16
    }

    /// All registers used here live at sub index 0
    pub const fn sub(self) -> u8 {
        0
    }

    /// The size of the register on the wire, in bytes
    pub const fn size(self) -> usize {
        match self {
            Register::ModesOfOperation => 1,
            Register::ElectronicGearMolecules | Register::Controlword | Register::Statusword => 2,
            Register::PositionActualValue
            | Register::TargetPosition
            | Register::ProfileVelocity
            | Register::ProfileAcceleration => 4,
        }
    }

    /// Look up a register by its object address
    pub fn from_object(index: u16, sub: u8) -> Option<Register> {
        if sub != 0 {
            return None;
        }
        Register::ALL.into_iter().find(|r| r.index() == index)
    }

    /// Encode a value as little endian bytes of the register size
    ///
    /// Signed values should be passed as their two's complement bit pattern, e.g. `pos as u32`.
    pub fn encode(self, value: u32) -> ([u8; 4], usize) {
        (value.to_le_bytes(), self.size())
    }
}

impl core::fmt::Display for Register {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:04X}", self.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_lookup() {
        assert_eq!(Some(Register::Controlword), Register::from_object(0x6040, 0));
        assert_eq!(Some(Register::ElectronicGearMolecules), Register::from_object(0x260A, 0));
        assert_eq!(None, Register::from_object(0x6040, 1));
        assert_eq!(None, Register::from_object(0x1000, 0));
    }

    #[test]
    fn test_register_sizes() {
        assert_eq!(1, Register::ModesOfOperation.size());
        assert_eq!(2, Register::Statusword.size());
        assert_eq!(4, Register::TargetPosition.size());
        assert_eq!("0x607A", Register::TargetPosition.to_string());
    }
}
