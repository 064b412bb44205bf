/// The highest node ID allowed by CANopen
pub const MAX_NODE_ID: u8 = 127;

/// A validated CANopen node ID, in the range 1..=127
///
/// Node 0 is reserved for broadcast and is never a valid axis address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u8);

impl NodeId {
    /// Create a node ID, failing if it is outside of 1..=127
    pub fn new(value: u8) -> Result<Self, InvalidNodeIdError> {
        if value > 0 && value <= MAX_NODE_ID {
            Ok(NodeId(value))
        } else {
            Err(InvalidNodeIdError { value })
        }
    }

    /// Get the raw node ID
    pub fn raw(&self) -> u8 {
        self.0
    }
}

/// Error returned when a value is not a valid node ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidNodeIdError {
    /// The rejected value
    pub value: u8,
}

impl core::fmt::Display for InvalidNodeIdError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Invalid node ID {}", self.value)
    }
}
impl core::error::Error for InvalidNodeIdError {}

impl TryFrom<u8> for NodeId {
    type Error = InvalidNodeIdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        NodeId::new(value)
    }
}

impl From<NodeId> for u8 {
    fn from(value: NodeId) -> Self {
        value.raw()
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_range() {
        assert!(NodeId::new(0).is_err());
        assert!(NodeId::new(128).is_err());
        assert!(NodeId::new(255).is_err());
        assert_eq!(1, NodeId::new(1).unwrap().raw());
        assert_eq!(127, NodeId::try_from(127).unwrap().raw());
        assert_eq!("Invalid node ID 0", NodeId::new(0).unwrap_err().to_string());
    }
}
