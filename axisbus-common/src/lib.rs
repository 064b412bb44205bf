//! Common functionality shared among other axisbus crates.
//!
//! This is the wire layer: CAN identifiers and frames, the subset of CANopen used to drive
//! DS-402 style motor drives (expedited SDO, RPDO1/TPDO1, heartbeat), and the transport traits the
//! controller is written against.
//!
//! Most users will have no reason to depend on this crate directly, as it is re-exported by
//! `axisbus-controller`.
#![warn(missing_docs, missing_copy_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod constants;
pub mod messages;
pub mod node_id;
pub mod objects;
pub mod pdo;
pub mod sdo;
pub mod traits;

#[cfg(feature = "socketcan")]
mod socketcan;

#[cfg(feature = "socketcan")]
#[cfg_attr(docsrs, doc(cfg(feature = "socketcan")))]
pub use socketcan::{open_socketcan, SocketCanReceiver, SocketCanSender};

pub use node_id::NodeId;

pub use messages::{CanId, CanMessage, DriveMessage};
pub use objects::Register;
