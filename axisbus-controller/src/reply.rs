//! Replies emitted to the host when commands complete
use core::fmt::Write;

use axisbus_common::NodeId;

use crate::{axis::InitStatus, funnel::CommandStatus, profile::MoveKind};

/// One axis in a status reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisReport {
    /// The node
    pub node: NodeId,
    /// Heartbeats are being received
    pub alive: bool,
    /// Zero-initialization status
    pub init_status: InitStatus,
}

/// A reply to a host command
///
/// The `Display` implementation renders the line sent to the host, e.g. `MAJ OK 1 2 |` or
/// `ZEI PF 1 3 |2 `.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// All-axes zero-initialization finished
    Zei {
        /// Overall status
        status: CommandStatus,
        /// Initialized axes
        succeeded: Vec<NodeId>,
        /// Failed axes
        failed: Vec<NodeId>,
    },
    /// Single axis zero-initialization finished
    ZeiSingle {
        /// Result status
        status: CommandStatus,
        /// The requested node number, which may be invalid
        node: u8,
    },
    /// A move finished
    Move {
        /// Absolute or relative
        kind: MoveKind,
        /// Overall status
        status: CommandStatus,
        /// Axes which reached their target
        succeeded: Vec<NodeId>,
        /// Axes which failed
        failed: Vec<NodeId>,
    },
    /// Status of all axes
    Status {
        /// Always OK when the report is produced
        status: CommandStatus,
        /// One entry per axis
        axes: Vec<AxisReport>,
    },
}

fn write_lists(f: &mut core::fmt::Formatter<'_>, ok: &[NodeId], failed: &[NodeId]) -> core::fmt::Result {
    for n in ok {
        write!(f, "{n} ")?;
    }
    f.write_char('|')?;
    for n in failed {
        write!(f, "{n} ")?;
    }
    Ok(())
}

impl core::fmt::Display for Reply {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Reply::Zei {
                status,
                succeeded,
                failed,
            } => {
                write!(f, "ZEI {status} ")?;
                write_lists(f, succeeded, failed)
            }
            Reply::ZeiSingle { status, node } => write!(f, "ZEI {status} {node}"),
            Reply::Move {
                kind,
                status,
                succeeded,
                failed,
            } => {
                write!(f, "{} {status} ", kind.prefix())?;
                write_lists(f, succeeded, failed)
            }
            Reply::Status { status, axes } => {
                write!(f, "RMS {status} ")?;
                for (i, a) in axes.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{}:{},{}", a.node, a.alive as u8, a.init_status.code())?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u8) -> NodeId {
        NodeId::new(id).unwrap()
    }

    #[test]
    fn test_move_reply_format() {
        let reply = Reply::Move {
            kind: MoveKind::Absolute,
            status: CommandStatus::Ok,
            succeeded: vec![node(1)],
            failed: vec![],
        };
        assert_eq!("MAJ OK 1 |", reply.to_string());

        let reply = Reply::Move {
            kind: MoveKind::Relative,
            status: CommandStatus::FullFail,
            succeeded: vec![],
            failed: vec![node(1), node(2)],
        };
        assert_eq!("MRJ FF |1 2 ", reply.to_string());
    }

    #[test]
    fn test_zei_reply_format() {
        let reply = Reply::Zei {
            status: CommandStatus::PartialFail,
            succeeded: vec![node(1), node(3)],
            failed: vec![node(2)],
        };
        assert_eq!("ZEI PF 1 3 |2 ", reply.to_string());

        let reply = Reply::ZeiSingle {
            status: CommandStatus::InvalidNode,
            node: 9,
        };
        assert_eq!("ZEI IN 9", reply.to_string());
    }

    #[test]
    fn test_status_reply_format() {
        let reply = Reply::Status {
            status: CommandStatus::Ok,
            axes: vec![
                AxisReport {
                    node: node(1),
                    alive: true,
                    init_status: InitStatus::Finished,
                },
                AxisReport {
                    node: node(2),
                    alive: false,
                    init_status: InitStatus::None,
                },
            ],
        };
        assert_eq!("RMS OK 1:1,3; 2:0,0", reply.to_string());
    }
}
