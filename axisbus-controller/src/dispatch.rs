//! Routing of SDO responses to the requests which are waiting for them
//!
//! Every (node, register) pair has at most one pending request. The slot is consumed with
//! [`Dispatcher::take`] before the response is evaluated, so a late duplicate response finds the
//! slot empty instead of re-triggering a sequence which has already moved on.
use std::collections::HashMap;

use axisbus_common::{sdo::SdoResponse, NodeId, Register};

use crate::sequence::Response;

/// Who is waiting for a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOwner {
    /// A zero-initialization sequence
    Zei,
    /// A move sequence
    Maj,
    /// A periodic mirror refresh
    Refresh,
}

/// A request waiting for its response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    /// The owner of the request
    pub owner: SlotOwner,
    /// When the request was sent
    pub sent_at_ms: u64,
}

/// Pending response slots for all nodes
#[derive(Debug, Default)]
pub struct Dispatcher {
    pending: HashMap<(NodeId, Register), PendingRequest>,
}

impl Dispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a slot, returning the request it replaces
    pub fn install(
        &mut self,
        node: NodeId,
        register: Register,
        owner: SlotOwner,
        now_ms: u64,
    ) -> Option<PendingRequest> {
        let replaced = self.pending.insert(
            (node, register),
            PendingRequest {
                owner,
                sent_at_ms: now_ms,
            },
        );
        if let Some(old) = replaced {
            log::debug!(
                "Node {node}: {:?} request on {register} replaced by {owner:?}",
                old.owner
            );
        }
        replaced
    }

    /// Consume the slot for a response
    pub fn take(&mut self, node: NodeId, register: Register) -> Option<PendingRequest> {
        self.pending.remove(&(node, register))
    }

    /// Get the slot without consuming it
    pub fn get(&self, node: NodeId, register: Register) -> Option<&PendingRequest> {
        self.pending.get(&(node, register))
    }

    /// True if a request is waiting on this slot
    pub fn is_pending(&self, node: NodeId, register: Register) -> bool {
        self.pending.contains_key(&(node, register))
    }

    /// Drop every slot of a node, e.g. when it stops responding
    pub fn clear_node(&mut self, node: NodeId) {
        self.pending.retain(|(n, _), _| *n != node);
    }

    /// Drop the slots of a node held by one owner
    pub fn clear_owned(&mut self, node: NodeId, owner: SlotOwner) {
        self.pending
            .retain(|(n, _), p| !(*n == node && p.owner == owner));
    }

    /// Remove and return all slots older than `timeout_ms`, ordered by node and register
    pub fn take_expired(
        &mut self,
        now_ms: u64,
        timeout_ms: u64,
    ) -> Vec<(NodeId, Register, PendingRequest)> {
        let mut expired: Vec<_> = self
            .pending
            .iter()
            .filter(|(_, p)| now_ms.saturating_sub(p.sent_at_ms) >= timeout_ms)
            .map(|((n, r), p)| (*n, *r, *p))
            .collect();
        expired.sort_by_key(|(n, r, _)| (*n, *r));
        for (n, r, _) in &expired {
            self.pending.remove(&(*n, *r));
        }
        expired
    }

    /// Number of pending slots
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if no requests are pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Split an SDO response into the register it addresses and the outcome
///
/// Returns None for objects which are not one of the known registers.
pub fn decode_response(resp: &SdoResponse) -> Option<(Register, Response)> {
    let (index, sub) = resp.object();
    let register = Register::from_object(index, sub)?;
    let response = match resp {
        SdoResponse::ConfirmDownload { .. } => Response::Written,
        SdoResponse::ConfirmUpload { .. } => Response::Value(resp.value()?),
        SdoResponse::Abort { abort_code, .. } => Response::Aborted(*abort_code),
    };
    Some((register, response))
}
