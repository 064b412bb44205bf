//! Periodic supervision: timeouts, polls, liveness and mirror refresh
use axisbus_common::{traits::CanSender, NodeId, Register};

use super::MotionCoordinator;
use crate::{
    axis::{AxisStatus, InitStatus},
    dispatch::SlotOwner,
    sequence::{Request, Response, Sequence},
};

impl<S: CanSender> MotionCoordinator<S> {
    /// The fast supervision tick, nominally every 100 ms
    ///
    /// Expires SDO requests which have waited longer than `sdo_timeout_ms`, issues ZEI statusword
    /// polls whose interval has elapsed, and polls the statusword of moving axes which have not
    /// reported a recent TPDO.
    pub fn tick_100(&mut self, now_ms: u64) {
        self.expire_requests(now_ms);
        self.poll_zei(now_ms);
        self.poll_moving(now_ms);
    }

    /// The slow supervision tick, nominally every 500 ms
    ///
    /// Checks heartbeats, and refreshes the position mirror of idle axes.
    pub fn tick_500(&mut self, now_ms: u64) {
        self.check_heartbeats(now_ms);
        self.refresh_positions(now_ms);
    }

    fn expire_requests(&mut self, now_ms: u64) {
        let timeout = self.config.sdo_timeout_ms;
        if timeout == 0 {
            return;
        }
        for (node, register, pending) in self.dispatcher.take_expired(now_ms, timeout) {
            match pending.owner {
                SlotOwner::Zei | SlotOwner::Maj => {
                    log::warn!("Node {node}: no response on {register} within {timeout} ms");
                    self.advance_sequence(node, register, Response::TimedOut, now_ms);
                }
                SlotOwner::Refresh => {
                    log::debug!("Node {node}: refresh read of {register} timed out")
                }
            }
        }
    }

    fn poll_zei(&mut self, now_ms: u64) {
        let due: Vec<(NodeId, Request)> = self
            .sequences
            .iter_mut()
            .filter_map(|(node, seq)| match seq {
                Sequence::Zei(zei) => zei.poll(now_ms).map(|req| (*node, req)),
                Sequence::Maj(_) => None,
            })
            .collect();
        for (node, req) in due {
            if let Some(Sequence::Zei(zei)) = self.sequences.get(&node) {
                let attempts = zei.attempts();
                if let Some(axis) = self.axes.get_mut(&node) {
                    axis.statusword_read_attempts = attempts;
                }
            }
            if let Err(e) = self.send_request(node, req, SlotOwner::Zei, now_ms) {
                log::warn!("{e}");
                self.finish_sequence(node, false);
            }
        }
    }

    fn poll_moving(&mut self, now_ms: u64) {
        let interval = self.config.status_poll_interval_ms;
        let due: Vec<NodeId> = self
            .sequences
            .iter()
            .filter_map(|(node, seq)| match seq {
                Sequence::Maj(maj) if maj.is_moving() => Some(*node),
                _ => None,
            })
            .filter(|node| !self.dispatcher.is_pending(*node, Register::Statusword))
            .filter(|node| {
                self.axes.get(node).is_some_and(|axis| {
                    let recent = |t: Option<u64>| {
                        t.is_some_and(|t| now_ms.saturating_sub(t) < interval)
                    };
                    !recent(axis.last_tpdo_ms) && !recent(axis.last_statusword_request_ms)
                })
            })
            .collect();
        for node in due {
            let req = Request::Read {
                register: Register::Statusword,
            };
            // A lost poll is retried on a later tick
            if let Err(e) = self.send_request(node, req, SlotOwner::Maj, now_ms) {
                log::warn!("{e}");
            }
        }
    }

    fn check_heartbeats(&mut self, now_ms: u64) {
        let timeout = self.config.heartbeat_timeout_ms;
        let mut lost = Vec::new();
        for (node, axis) in self.axes.iter_mut() {
            let elapsed = now_ms.saturating_sub(axis.last_heartbeat_ms);
            if axis.is_alive && elapsed > timeout {
                log::warn!("Node {node}: no heartbeat for {elapsed} ms");
                axis.is_alive = false;
                if axis.status != AxisStatus::MoveFinished {
                    axis.status = AxisStatus::Failed;
                }
                lost.push(*node);
            } else if !axis.is_alive && elapsed <= timeout {
                log::info!("Node {node}: heartbeat restored");
                axis.is_alive = true;
                axis.status = AxisStatus::Operational;
            }
        }

        for node in lost {
            self.dispatcher.clear_node(node);
            let Some(seq) = self.sequences.remove(&node) else {
                continue;
            };
            if let Some(axis) = self.axes.get_mut(&node) {
                match seq {
                    Sequence::Zei(_) => axis.init_status = InitStatus::Failed,
                    Sequence::Maj(_) => axis.status = AxisStatus::MoveFailed,
                }
            }
        }
        self.run_zei_funnels();
        self.run_move_funnel();
    }

    fn refresh_positions(&mut self, now_ms: u64) {
        let interval = self.config.position_refresh_interval_ms;
        let due: Vec<NodeId> = self
            .axes
            .iter()
            .filter(|(node, axis)| {
                axis.is_alive
                    && !axis.status.is_in_move()
                    && !self.sequences.contains_key(*node)
                    && !self
                        .dispatcher
                        .is_pending(**node, Register::PositionActualValue)
                    && axis
                        .last_position_request_ms
                        .map_or(true, |t| now_ms.saturating_sub(t) >= interval)
            })
            .map(|(node, _)| *node)
            .collect();
        for node in due {
            let req = Request::Read {
                register: Register::PositionActualValue,
            };
            if let Err(e) = self.send_request(node, req, SlotOwner::Refresh, now_ms) {
                log::debug!("{e}");
            }
        }
    }
}
