//! Aggregation of per-axis outcomes into one command result
use axisbus_common::NodeId;

/// Where an axis is in the command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not yet terminal
    Pending,
    /// Terminal, succeeded
    Succeeded,
    /// Terminal, failed
    Failed,
}

/// Overall command status, rendered as the two letter reply token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Every axis succeeded
    Ok,
    /// Some axes failed
    PartialFail,
    /// Every axis failed
    FullFail,
    /// The command addressed a node that does not exist
    InvalidNode,
    /// Anything else
    UnknownError,
}

impl CommandStatus {
    /// The reply token
    pub fn token(&self) -> &'static str {
        match self {
            CommandStatus::Ok => "OK",
            CommandStatus::PartialFail => "PF",
            CommandStatus::FullFail => "FF",
            CommandStatus::InvalidNode => "IN",
            CommandStatus::UnknownError => "UE",
        }
    }
}

impl core::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.token())
    }
}

/// The result of a completed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// The overall status
    pub status: CommandStatus,
    /// Axes which succeeded, in the order given
    pub succeeded: Vec<NodeId>,
    /// Axes which failed, in the order given
    pub failed: Vec<NodeId>,
}

/// Summarize a command, or return None while any axis is still pending
pub fn summarize<I>(outcomes: I) -> Option<Summary>
where
    I: IntoIterator<Item = (NodeId, Outcome)>,
{
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    for (node, outcome) in outcomes {
        match outcome {
            Outcome::Pending => return None,
            Outcome::Succeeded => succeeded.push(node),
            Outcome::Failed => failed.push(node),
        }
    }
    let status = match (succeeded.is_empty(), failed.is_empty()) {
        (_, true) => CommandStatus::Ok,
        (true, false) => CommandStatus::FullFail,
        (false, false) => CommandStatus::PartialFail,
    };
    Some(Summary {
        status,
        succeeded,
        failed,
    })
}
