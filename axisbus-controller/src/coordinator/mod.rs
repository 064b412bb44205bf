//! The top level controller
//!
//! [`MotionCoordinator`] owns the axes, the outbound link and the pending response slots. It has
//! no thread or timer of its own: the host feeds it received frames with
//! [`MotionCoordinator::handle_message`] and calls [`MotionCoordinator::tick_100`] and
//! [`MotionCoordinator::tick_500`] on a steady schedule. Every time-based transition happens in
//! one of the ticks.
use std::collections::{BTreeMap, VecDeque};

use axisbus_common::{
    messages::{CobLayout, DriveMessage, Heartbeat, HeartbeatState, MessageError},
    pdo::{Rpdo1, Tpdo1},
    sdo::{AbortCode, SdoError, SdoRequest, SdoResponse},
    traits::{CanReceiver, CanSendError, CanSender},
    CanMessage, NodeId, Register,
};
use snafu::{ResultExt, Snafu};

use crate::{
    axis::{Axis, AxisError, AxisStatus, InitStatus},
    config::{ConfigError, ControllerConfig},
    dispatch::{decode_response, Dispatcher, SlotOwner},
    funnel::{summarize, CommandStatus, Outcome},
    profile::{plan_profile, MoveCommand, MoveKind, ProfileError, ProfileInput},
    reply::{AxisReport, Reply},
    sequence::{MajSequence, Request, Response, Sequence, Transition, ZeiSequence, ZeiSettings},
};

mod supervisor;

/// Error returned by coordinator operations
#[derive(Debug, Snafu)]
pub enum CoordinatorError {
    /// At least one axis must be configured
    #[snafu(display("At least one axis is required"))]
    NoAxes,
    /// The configuration failed validation
    #[snafu(display("Invalid configuration: {source}"))]
    Config {
        /// The validation error
        source: ConfigError,
    },
    /// The node is not one of the configured axes
    #[snafu(display("Node {node} is not a configured axis"))]
    InvalidNode {
        /// The requested node number
        node: u8,
    },
    /// A ZEI sequence is running
    #[snafu(display("Zero initialization in progress on node {node}"))]
    ZeiInProgress {
        /// The first busy node
        node: NodeId,
    },
    /// A move is running
    #[snafu(display("A move is in progress"))]
    MoveInProgress,
    /// The position of an axis has not been read yet
    #[snafu(display("Position of node {node} is unknown"))]
    PositionUnknown {
        /// The first axis without a position
        node: NodeId,
    },
    /// The move could not be prepared; nothing was sent
    #[snafu(display("Cannot prepare move: {source}"))]
    Profile {
        /// The profile error
        source: ProfileError,
    },
    /// An axis rejected a value
    #[snafu(display("Axis error on node {node}: {source}"))]
    Axis {
        /// The node
        node: NodeId,
        /// The axis error
        source: AxisError,
    },
    /// A request could not be encoded
    #[snafu(display("Cannot encode request for node {node}: {source}"))]
    Encode {
        /// The node
        node: NodeId,
        /// The codec error
        source: SdoError,
    },
    /// The link refused a frame
    #[snafu(display("Send to node {node} failed: {source}"))]
    Send {
        /// The node
        node: NodeId,
        /// The send error
        source: CanSendError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZeiScope {
    All,
    Single(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ZeiCommand {
    scope: ZeiScope,
    nodes: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveMove {
    kind: MoveKind,
    nodes: Vec<NodeId>,
}

/// Coordinates a fixed set of axes over one CAN link
#[derive(Debug)]
pub struct MotionCoordinator<S: CanSender> {
    link: S,
    config: ControllerConfig,
    layout: CobLayout,
    zei_settings: ZeiSettings,
    axes: BTreeMap<NodeId, Axis>,
    dispatcher: Dispatcher,
    sequences: BTreeMap<NodeId, Sequence>,
    zei_commands: Vec<ZeiCommand>,
    active_move: Option<ActiveMove>,
    replies: VecDeque<Reply>,
}

impl<S: CanSender> MotionCoordinator<S> {
    /// Create a coordinator for nodes 1..=`config.axis_count`
    ///
    /// All axes start out alive, as if a heartbeat had been received at `now_ms`.
    pub fn start(link: S, config: ControllerConfig, now_ms: u64) -> Result<Self, CoordinatorError> {
        if config.axis_count == 0 {
            log::error!("Cannot start without axes");
            return NoAxesSnafu.fail();
        }
        config.validate().context(ConfigSnafu)?;

        let mut axes = BTreeMap::new();
        for raw in 1..=config.axis_count {
            let node = NodeId::new(raw).map_err(|_| CoordinatorError::InvalidNode { node: raw })?;
            let mut axis = Axis::new(node, config.calibration_for(node));
            axis.is_alive = true;
            axis.last_heartbeat_ms = now_ms;
            axes.insert(node, axis);
        }
        log::info!("Coordinator started with {} axes", axes.len());

        Ok(Self {
            link,
            layout: config.cob_layout(),
            zei_settings: config.zei.into(),
            config,
            axes,
            dispatcher: Dispatcher::new(),
            sequences: BTreeMap::new(),
            zei_commands: Vec::new(),
            active_move: None,
            replies: VecDeque::new(),
        })
    }

    /// The configuration in use
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Access the link
    pub fn link(&self) -> &S {
        &self.link
    }

    /// Mutable access to the link
    pub fn link_mut(&mut self) -> &mut S {
        &mut self.link
    }

    /// Iterate over all axes in node order
    pub fn axes(&self) -> impl Iterator<Item = &Axis> {
        self.axes.values()
    }

    /// Get one axis
    pub fn axis(&self, node: NodeId) -> Option<&Axis> {
        self.axes.get(&node)
    }

    /// Number of SDO requests waiting for a response
    pub fn pending_requests(&self) -> usize {
        self.dispatcher.len()
    }

    /// True if no ZEI or move command is in progress
    pub fn is_idle(&self) -> bool {
        self.zei_commands.is_empty() && self.active_move.is_none()
    }

    /// Take the oldest queued reply
    pub fn pop_reply(&mut self) -> Option<Reply> {
        self.replies.pop_front()
    }

    /// Take all queued replies
    pub fn drain_replies(&mut self) -> Vec<Reply> {
        self.replies.drain(..).collect()
    }

    fn push_reply(&mut self, reply: Reply) {
        log::info!("Reply: {reply}");
        self.replies.push_back(reply);
    }

    fn lookup(&self, node: u8) -> Result<NodeId, CoordinatorError> {
        NodeId::new(node)
            .ok()
            .filter(|n| self.axes.contains_key(n))
            .ok_or(CoordinatorError::InvalidNode { node })
    }

    /// Overwrite the mirrored position of an axis, without any bus traffic
    pub fn set_current_position_in_steps(&mut self, node: u8, steps: i32) -> Result<(), CoordinatorError> {
        let node = self.lookup(node)?;
        if let Some(axis) = self.axes.get_mut(&node) {
            axis.set_current_position_in_steps(steps)
                .context(AxisSnafu { node })?;
        }
        Ok(())
    }

    /// Overwrite the mirrored position of an axis in units, without any bus traffic
    pub fn set_current_position_in_units(&mut self, node: u8, units: f64) -> Result<(), CoordinatorError> {
        let node = self.lookup(node)?;
        if let Some(axis) = self.axes.get_mut(&node) {
            axis.set_current_position_in_units(units)
                .context(AxisSnafu { node })?;
        }
        Ok(())
    }

    /// True once every axis has a position, from the drive or set explicitly
    pub fn positions_known(&self) -> bool {
        self.axes.values().all(|a| a.is_position_known())
    }

    /// Read the position of every axis which is not running a sequence
    ///
    /// Moves are rejected until every position is known, so a host calls this after
    /// [`start`](Self::start) and waits for [`positions_known`](Self::positions_known).
    pub fn refresh_all_positions(&mut self, now_ms: u64) -> Result<(), CoordinatorError> {
        let due: Vec<NodeId> = self
            .axes
            .keys()
            .filter(|node| {
                !self.sequences.contains_key(*node)
                    && !self
                        .dispatcher
                        .is_pending(**node, Register::PositionActualValue)
            })
            .copied()
            .collect();
        for node in due {
            let req = Request::Read {
                register: Register::PositionActualValue,
            };
            self.send_request(node, req, SlotOwner::Refresh, now_ms)?;
        }
        Ok(())
    }

    /// Queue a status report of all axes
    pub fn request_status(&mut self) {
        let axes = self
            .axes
            .iter()
            .map(|(node, axis)| AxisReport {
                node: *node,
                alive: axis.is_alive,
                init_status: axis.init_status,
            })
            .collect();
        self.push_reply(Reply::Status {
            status: CommandStatus::Ok,
            axes,
        });
    }

    /// Process every frame currently queued in a receiver
    pub fn process_rx<R: CanReceiver>(&mut self, rx: &mut R, now_ms: u64) {
        while let Some(msg) = rx.try_recv() {
            self.handle_message(&msg, now_ms);
        }
    }

    /// Process one received frame
    pub fn handle_message(&mut self, msg: &CanMessage, now_ms: u64) {
        let msg = match self.layout.classify(msg) {
            Ok(m) => m,
            Err(MessageError::UnrecognizedId { .. }) => return,
            Err(e) => {
                log::warn!("Dropping frame: {e}");
                return;
            }
        };
        let node = msg.node();
        if !self.axes.contains_key(&node) {
            log::debug!("Dropping frame from unconfigured node {node}");
            return;
        }
        match msg {
            DriveMessage::Heartbeat(hb) => self.handle_heartbeat(hb, now_ms),
            DriveMessage::SdoResponse { node, resp } => self.handle_sdo_response(node, resp, now_ms),
            DriveMessage::Tpdo1 { node, pdo } => self.handle_tpdo(node, pdo, now_ms),
        }
    }

    fn handle_heartbeat(&mut self, hb: Heartbeat, now_ms: u64) {
        let Some(axis) = self.axes.get_mut(&hb.node) else {
            return;
        };
        axis.last_heartbeat_ms = now_ms;
        if axis.nmt_state != Some(hb.state) {
            match hb.state {
                HeartbeatState::Alarm => log::warn!("Node {} reports alarm", hb.node),
                HeartbeatState::BootUp => log::info!("Node {} booted", hb.node),
                state => log::info!("Node {} is {state:?}", hb.node),
            }
        }
        axis.nmt_state = Some(hb.state);
    }

    fn handle_tpdo(&mut self, node: NodeId, pdo: Tpdo1, now_ms: u64) {
        if let Some(axis) = self.axes.get_mut(&node) {
            axis.last_tpdo_ms = Some(now_ms);
            axis.record_statusword(pdo.statusword);
            // Position updates only fail for uninitialized axes, which are never stored here
            axis.set_current_position_in_steps(pdo.position).ok();
        }
        let transition = match self.sequences.get_mut(&node) {
            Some(Sequence::Maj(seq)) => seq.on_tpdo(&pdo),
            _ => return,
        };
        self.apply_transition(node, transition, now_ms);
    }

    fn handle_sdo_response(&mut self, node: NodeId, resp: SdoResponse, now_ms: u64) {
        let Some((register, response)) = decode_response(&resp) else {
            log::debug!("Node {node}: response for unhandled object {:?}", resp.object());
            return;
        };
        // The slot is consumed before anything else looks at the response
        let slot = self.dispatcher.take(node, register);

        if let Response::Aborted(code) = response {
            log::warn!(
                "Node {node}: SDO abort on {register}: 0x{code:08X} {:?}",
                AbortCode::from_raw(code)
            );
        }
        if let Response::Value(value) = response {
            self.update_mirror(node, register, value);
        }

        match slot.map(|s| s.owner) {
            Some(SlotOwner::Zei) | Some(SlotOwner::Maj) => {
                self.advance_sequence(node, register, response, now_ms)
            }
            Some(SlotOwner::Refresh) => (),
            None => log::debug!("Node {node}: unsolicited {response:?} on {register}"),
        }
    }

    fn update_mirror(&mut self, node: NodeId, register: Register, value: i32) {
        let Some(axis) = self.axes.get_mut(&node) else {
            return;
        };
        match register {
            Register::PositionActualValue => {
                axis.set_current_position_in_steps(value).ok();
            }
            Register::Statusword => axis.record_statusword(value as u16),
            _ => (),
        }
    }

    fn advance_sequence(&mut self, node: NodeId, register: Register, response: Response, now_ms: u64) {
        let transition = match self.sequences.get_mut(&node) {
            Some(Sequence::Zei(seq)) => {
                let t = seq.on_response(register, response, now_ms);
                let attempts = seq.attempts();
                if let Some(axis) = self.axes.get_mut(&node) {
                    axis.statusword_read_attempts = attempts;
                }
                t
            }
            Some(Sequence::Maj(seq)) => seq.on_response(register, response),
            None => {
                log::debug!("Node {node}: {response:?} on {register} with no sequence running");
                return;
            }
        };
        if transition == Transition::Ignored {
            log::debug!("Node {node}: {response:?} on {register} ignored by sequence");
        }
        self.apply_transition(node, transition, now_ms);
    }

    fn sequence_owner(&self, node: NodeId) -> Option<SlotOwner> {
        match self.sequences.get(&node)? {
            Sequence::Zei(_) => Some(SlotOwner::Zei),
            Sequence::Maj(_) => Some(SlotOwner::Maj),
        }
    }

    fn apply_transition(&mut self, node: NodeId, transition: Transition, now_ms: u64) {
        match transition {
            Transition::Send(req) => {
                let Some(owner) = self.sequence_owner(node) else {
                    return;
                };
                match self.send_request(node, req, owner, now_ms) {
                    Ok(()) => {
                        if let (Request::Rpdo1(_), Some(axis)) = (req, self.axes.get_mut(&node)) {
                            axis.status = AxisStatus::Moving;
                        }
                    }
                    Err(e) => {
                        log::warn!("{e}");
                        self.finish_sequence(node, false);
                    }
                }
            }
            Transition::AwaitPoll | Transition::Ignored => (),
            Transition::Finished => self.finish_sequence(node, true),
            Transition::Failed => self.finish_sequence(node, false),
        }
    }

    /// Encode and send a request, installing its response slot
    fn send_request(
        &mut self,
        node: NodeId,
        req: Request,
        owner: SlotOwner,
        now_ms: u64,
    ) -> Result<(), CoordinatorError> {
        let msg = match req {
            Request::Write { register, value } => {
                let (bytes, len) = register.encode(value);
                SdoRequest::expedited_download(register.index(), register.sub(), &bytes[..len])
                    .context(EncodeSnafu { node })?
                    .to_can_message(self.layout.sdo_request_id(node))
            }
            Request::Read { register } => SdoRequest::initiate_upload(register.index(), register.sub())
                .to_can_message(self.layout.sdo_request_id(node)),
            Request::Rpdo1(pdo) => pdo.to_can_message(self.layout.rpdo1_id(node)),
        };

        if let Some(register) = req.register() {
            self.dispatcher.install(node, register, owner, now_ms);
        }
        if let Err(e) = self.link.send(msg) {
            if let Some(register) = req.register() {
                self.dispatcher.take(node, register);
            }
            return Err(e).context(SendSnafu { node });
        }
        log::debug!("Node {node}: sent {req:?}");

        if let Some(axis) = self.axes.get_mut(&node) {
            match req {
                Request::Write {
                    register: Register::Controlword,
                    value,
                } => axis.record_controlword(value as u16),
                Request::Write {
                    register: Register::ModesOfOperation,
                    value,
                } => axis.record_mode(value as u8 as i8),
                Request::Read {
                    register: Register::Statusword,
                } => axis.last_statusword_request_ms = Some(now_ms),
                Request::Read {
                    register: Register::PositionActualValue,
                } => axis.last_position_request_ms = Some(now_ms),
                Request::Rpdo1(Rpdo1 {
                    controlword, mode, ..
                }) => {
                    axis.record_controlword(controlword);
                    axis.record_mode(mode);
                }
                _ => (),
            }
        }
        Ok(())
    }

    /// End the sequence on a node and run the funnel of its command
    fn finish_sequence(&mut self, node: NodeId, success: bool) {
        let Some(seq) = self.sequences.remove(&node) else {
            return;
        };
        let Some(axis) = self.axes.get_mut(&node) else {
            return;
        };
        match seq {
            Sequence::Zei(_) => {
                self.dispatcher.clear_owned(node, SlotOwner::Zei);
                if success {
                    log::info!("Node {node}: zero initialization finished");
                    axis.init_status = InitStatus::Finished;
                } else {
                    log::warn!("Node {node}: zero initialization failed");
                    axis.init_status = InitStatus::Failed;
                }
                self.run_zei_funnels();
            }
            Sequence::Maj(_) => {
                self.dispatcher.clear_owned(node, SlotOwner::Maj);
                if success {
                    log::info!("Node {node}: move finished");
                    axis.status = AxisStatus::MoveFinished;
                } else {
                    log::warn!("Node {node}: move failed");
                    axis.status = AxisStatus::MoveFailed;
                }
                self.run_move_funnel();
            }
        }
    }

    fn zei_outcome(&self, node: NodeId) -> Outcome {
        match self.axes.get(&node).map(|a| a.init_status) {
            Some(InitStatus::Ongoing) => Outcome::Pending,
            Some(InitStatus::Finished) => Outcome::Succeeded,
            _ => Outcome::Failed,
        }
    }

    fn move_outcome(&self, node: NodeId) -> Outcome {
        match self.axes.get(&node).map(|a| a.status) {
            Some(AxisStatus::PreparedForMove) | Some(AxisStatus::Moving) => Outcome::Pending,
            Some(AxisStatus::MoveFinished) => Outcome::Succeeded,
            _ => Outcome::Failed,
        }
    }

    /// Emit a reply for every ZEI command whose axes are all terminal
    fn run_zei_funnels(&mut self) {
        let mut i = 0;
        while i < self.zei_commands.len() {
            let summary = summarize(
                self.zei_commands[i]
                    .nodes
                    .iter()
                    .map(|n| (*n, self.zei_outcome(*n))),
            );
            let Some(summary) = summary else {
                i += 1;
                continue;
            };
            let cmd = self.zei_commands.remove(i);
            let reply = match cmd.scope {
                ZeiScope::All => Reply::Zei {
                    status: summary.status,
                    succeeded: summary.succeeded,
                    failed: summary.failed,
                },
                ZeiScope::Single(node) => Reply::ZeiSingle {
                    status: summary.status,
                    node: node.raw(),
                },
            };
            self.push_reply(reply);
        }
    }

    /// Emit the move reply once every axis is terminal, and return the axes to steady state
    fn run_move_funnel(&mut self) {
        let Some(active) = &self.active_move else {
            return;
        };
        let Some(summary) = summarize(active.nodes.iter().map(|n| (*n, self.move_outcome(*n))))
        else {
            return;
        };
        let Some(active) = self.active_move.take() else {
            return;
        };
        for node in &active.nodes {
            if let Some(axis) = self.axes.get_mut(node) {
                axis.status = if axis.is_alive {
                    AxisStatus::Operational
                } else {
                    AxisStatus::Failed
                };
            }
        }
        self.push_reply(Reply::Move {
            kind: active.kind,
            status: summary.status,
            succeeded: summary.succeeded,
            failed: summary.failed,
        });
    }

    fn ongoing_zei(&self) -> Option<NodeId> {
        self.axes
            .iter()
            .find(|(_, a)| a.init_status == InitStatus::Ongoing)
            .map(|(n, _)| *n)
    }

    /// Begin ZEI on one axis, without running the funnel
    fn begin_zei(&mut self, node: NodeId, now_ms: u64) {
        let Some(axis) = self.axes.get_mut(&node) else {
            return;
        };
        if axis.init_status == InitStatus::Finished {
            log::info!("Node {node}: already zero initialized");
            return;
        }
        axis.statusword_read_attempts = 0;
        if !axis.is_alive {
            log::warn!("Node {node}: not alive, zero initialization failed");
            axis.init_status = InitStatus::Failed;
            return;
        }
        axis.init_status = InitStatus::Ongoing;

        let (seq, req) = ZeiSequence::start(self.zei_settings);
        self.sequences.insert(node, Sequence::Zei(seq));
        if let Err(e) = self.send_request(node, req, SlotOwner::Zei, now_ms) {
            log::warn!("Failed to start zero initialization: {e}");
            self.sequences.remove(&node);
            if let Some(axis) = self.axes.get_mut(&node) {
                axis.init_status = InitStatus::Failed;
            }
        }
    }

    /// Start zero initialization of every axis
    ///
    /// Axes which are already initialized count as succeeded without any traffic, and axes which
    /// are not alive fail immediately. The result is queued as a [`Reply::Zei`].
    pub fn start_zero_initialization_all_axes(&mut self, now_ms: u64) -> Result<(), CoordinatorError> {
        if self.active_move.is_some() {
            return MoveInProgressSnafu.fail();
        }
        if let Some(node) = self.ongoing_zei() {
            return ZeiInProgressSnafu { node }.fail();
        }
        let nodes: Vec<NodeId> = self.axes.keys().copied().collect();
        self.zei_commands.push(ZeiCommand {
            scope: ZeiScope::All,
            nodes: nodes.clone(),
        });
        for node in nodes {
            self.begin_zei(node, now_ms);
        }
        self.run_zei_funnels();
        Ok(())
    }

    /// Start zero initialization of one axis
    ///
    /// An invalid node queues a `ZEI IN <node>` reply as well as returning an error. The result is
    /// queued as a [`Reply::ZeiSingle`].
    pub fn start_zero_initialization_single_axis(
        &mut self,
        node: u8,
        now_ms: u64,
    ) -> Result<(), CoordinatorError> {
        let node_id = match self.lookup(node) {
            Ok(n) => n,
            Err(e) => {
                self.push_reply(Reply::ZeiSingle {
                    status: CommandStatus::InvalidNode,
                    node,
                });
                return Err(e);
            }
        };
        if self.active_move.is_some() {
            return MoveInProgressSnafu.fail();
        }
        if self.zei_outcome(node_id) == Outcome::Pending {
            return ZeiInProgressSnafu { node: node_id }.fail();
        }
        self.zei_commands.push(ZeiCommand {
            scope: ZeiScope::Single(node_id),
            nodes: vec![node_id],
        });
        self.begin_zei(node_id, now_ms);
        self.run_zei_funnels();
        Ok(())
    }

    /// Prepare and start a synchronized move of all axes
    ///
    /// Returns once the first frame of every axis has been sent. The result is queued as a
    /// [`Reply::Move`] when every axis has finished or failed. If the profile cannot be prepared,
    /// nothing is sent. The profile is computed from the mirrored positions, so every axis
    /// position must be known.
    pub fn move_axes(&mut self, cmd: MoveCommand, now_ms: u64) -> Result<(), CoordinatorError> {
        if self.active_move.is_some() {
            return MoveInProgressSnafu.fail();
        }
        if let Some(node) = self.ongoing_zei() {
            return ZeiInProgressSnafu { node }.fail();
        }
        if cmd.movement_units.len() != self.axes.len() {
            return Err(ProfileError::WrongAxisCount {
                expected: self.axes.len(),
                actual: cmd.movement_units.len(),
            })
            .context(ProfileSnafu);
        }
        if let Some(node) = self
            .axes
            .iter()
            .find(|(_, a)| !a.is_position_known())
            .map(|(n, _)| *n)
        {
            log::error!("Move rejected: position of node {node} was never read");
            return PositionUnknownSnafu { node }.fail();
        }

        let mut inputs = Vec::with_capacity(self.axes.len());
        for ((node, axis), units) in self.axes.iter_mut().zip(&cmd.movement_units) {
            let node = *node;
            let calibration = *axis.calibration();
            match cmd.kind {
                MoveKind::Absolute => axis
                    .set_target_position_in_units(*units)
                    .context(AxisSnafu { node })?,
                MoveKind::Relative => {
                    let current = axis.current_position_in_steps().unwrap_or(0);
                    let target = current.saturating_add(calibration.units_to_steps(*units));
                    axis.set_target_position_in_steps(target)
                        .context(AxisSnafu { node })?
                }
            }
            inputs.push(ProfileInput {
                node,
                calibration,
                relative_steps: axis.relative_movement_in_steps().unwrap_or(0),
            });
        }

        let plan = match plan_profile(&inputs, cmd.speed, cmd.acceleration) {
            Ok(plan) => plan,
            Err(e) => {
                log::error!("Move rejected: {e}");
                if let Some(axis) = e.lead().and_then(|lead| self.axes.get_mut(&lead)) {
                    axis.status = AxisStatus::MoveFailed;
                }
                return Err(e).context(ProfileSnafu);
            }
        };
        log::info!(
            "Move planned: lead {}, ta {:.3}s, tc {:.3}s, total {:.3}s",
            plan.lead,
            plan.acceleration_time_s,
            plan.constant_velocity_time_s,
            plan.full_time_s
        );

        for p in &plan.axes {
            if let Some(axis) = self.axes.get_mut(&p.node) {
                axis.set_profile_velocity_in_rpm(p.profile_velocity)
                    .context(AxisSnafu { node: p.node })?;
                axis.set_profile_acceleration_in_rpm_per_sec(p.profile_acceleration)
                    .context(AxisSnafu { node: p.node })?;
                if p.node == plan.lead {
                    axis.set_regular_motion(cmd.speed, cmd.acceleration);
                } else {
                    let cal = *axis.calibration();
                    axis.set_regular_motion(
                        cal.rpm_to_units_per_sec(p.velocity_rpm),
                        cal.rpm_to_units_per_sec(p.acceleration_rpm_per_sec),
                    );
                }
            }
        }

        let nodes: Vec<NodeId> = self.axes.keys().copied().collect();
        self.active_move = Some(ActiveMove {
            kind: cmd.kind,
            nodes: nodes.clone(),
        });
        for node in nodes {
            self.begin_maj(node, now_ms);
        }
        self.run_move_funnel();
        Ok(())
    }

    /// Begin MAJ on one axis, without running the funnel
    fn begin_maj(&mut self, node: NodeId, now_ms: u64) {
        let Some(axis) = self.axes.get_mut(&node) else {
            return;
        };
        if !axis.is_alive {
            log::warn!("Node {node}: not alive, move failed");
            axis.status = AxisStatus::MoveFailed;
            return;
        }
        axis.status = AxisStatus::PreparedForMove;
        let start = Rpdo1 {
            controlword: self.config.motion.start_controlword,
            mode: self.config.motion.profile_position_mode,
            target_position: axis.target_position_in_steps().unwrap_or(0),
        };
        let (seq, req) = MajSequence::start(
            axis.profile_velocity_in_rpm().unwrap_or(0),
            axis.profile_acceleration_in_rpm_per_sec().unwrap_or(0),
            start,
        );
        self.sequences.insert(node, Sequence::Maj(seq));
        if let Err(e) = self.send_request(node, req, SlotOwner::Maj, now_ms) {
            log::warn!("Failed to start move: {e}");
            self.sequences.remove(&node);
            if let Some(axis) = self.axes.get_mut(&node) {
                axis.status = AxisStatus::MoveFailed;
            }
        }
    }
}
