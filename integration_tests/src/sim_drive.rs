//! A minimal simulated stepper drive
//!
//! Answers expedited SDO reads and writes on the registers the controller uses, executes profile
//! moves commanded via RPDO1, and produces heartbeats and TPDO1. Faults can be injected with the
//! public knobs.
use std::collections::HashMap;

use axisbus_common::{
    constants::{cob, controlword, statusword, values},
    messages::{CanId, Heartbeat, HeartbeatState},
    pdo::{Rpdo1, Tpdo1},
    sdo::{AbortCode, SdoRequest, SdoResponse},
    CanMessage, NodeId, Register,
};

/// Interval between heartbeats
pub const HEARTBEAT_PERIOD_MS: u64 = 100;

#[derive(Debug, Clone, Copy)]
struct ActiveMove {
    start_ms: u64,
    duration_ms: u64,
    from: i32,
    to: i32,
}

/// A simulated drive
#[derive(Debug)]
pub struct SimDrive {
    node: NodeId,
    steps_per_rev: u32,
    registers: HashMap<Register, i32>,
    key_stage: u8,
    motion: Option<ActiveMove>,
    last_heartbeat_ms: Option<u64>,
    /// Send heartbeats
    pub heartbeat: bool,
    /// Answer SDO requests
    pub respond: bool,
    /// Broadcast TPDO1 when a move completes
    pub tpdo: bool,
    /// Abort any SDO access to this register
    pub abort_on: Option<Register>,
    /// The drive loses track of the target and never reports it reached
    pub stall: bool,
    /// Frames received by this drive
    pub received: Vec<CanMessage>,
}

impl SimDrive {
    /// Create a drive whose motor has `steps_per_rev` steps per revolution
    pub fn new(node: u8, steps_per_rev: u32) -> Self {
        let mut registers = HashMap::new();
        for r in Register::ALL {
            registers.insert(r, 0);
        }
        registers.insert(Register::Statusword, statusword::TARGET_REACHED as i32);
        Self {
            node: NodeId::new(node).expect("invalid sim node id"),
            steps_per_rev,
            registers,
            key_stage: 0,
            motion: None,
            last_heartbeat_ms: None,
            heartbeat: true,
            respond: true,
            tpdo: true,
            abort_on: None,
            stall: false,
            received: Vec::new(),
        }
    }

    /// The node ID
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Read a register
    pub fn register(&self, r: Register) -> i32 {
        self.registers.get(&r).copied().unwrap_or(0)
    }

    /// Force the position, e.g. to start a test away from zero
    pub fn set_position(&mut self, steps: i32) {
        self.registers.insert(Register::PositionActualValue, steps);
    }

    /// The current position
    pub fn position(&self) -> i32 {
        self.register(Register::PositionActualValue)
    }

    /// True while a move is executing
    pub fn is_moving(&self) -> bool {
        self.motion.is_some()
    }

    fn set_status_bit(&mut self, mask: u16, set: bool) {
        let mut sw = self.register(Register::Statusword) as u16;
        if set {
            sw |= mask;
        } else {
            sw &= !mask;
        }
        self.registers.insert(Register::Statusword, sw as i32);
    }

    fn set_target_reached(&mut self, reached: bool) {
        self.set_status_bit(statusword::TARGET_REACHED, reached);
    }

    /// Set-point acknowledge follows the new set-point bit of the controlword
    fn set_setpoint_acknowledge(&mut self, controlword: u16) {
        let ack = controlword & controlword::NEW_SETPOINT != 0;
        self.set_status_bit(statusword::SETPOINT_ACKNOWLEDGE, ack);
    }

    /// Trapezoidal move time, in ms, for the stored profile
    fn move_duration_ms(&self, distance: i32) -> u64 {
        let v = self.register(Register::ProfileVelocity) as f64;
        let a = self.register(Register::ProfileAcceleration) as f64;
        if v <= 0.0 || a <= 0.0 || self.steps_per_rev == 0 {
            return 0;
        }
        let revs = (distance as f64 / self.steps_per_rev as f64).abs();
        let seconds = revs * 60.0 / v + v / a;
        (seconds * 1000.0).round() as u64
    }

    /// Handle a frame from the bus, pushing any response into `out`
    pub fn handle_message(&mut self, msg: &CanMessage, now_ms: u64, out: &mut Vec<CanMessage>) {
        let CanId::Std(id) = msg.id() else {
            return;
        };
        let node = self.node.raw() as u16;
        if id == cob::SDO_REQ_BASE + node {
            self.received.push(*msg);
            if !self.respond {
                return;
            }
            if let Ok(req) = SdoRequest::try_from(msg.data()) {
                let resp = self.handle_sdo(req, now_ms);
                out.push(resp.to_can_message(CanId::Std(cob::SDO_RESP_BASE + node)));
            }
        } else if id == cob::RPDO1_BASE + node {
            self.received.push(*msg);
            if let Ok(pdo) = Rpdo1::try_from(msg.data()) {
                self.handle_rpdo(pdo, now_ms);
            }
        }
    }

    fn handle_sdo(&mut self, req: SdoRequest, now_ms: u64) -> SdoResponse {
        let (index, sub) = req.object();
        let Some(register) = Register::from_object(index, sub) else {
            return SdoResponse::abort(index, sub, AbortCode::NoSuchObject as u32);
        };
        if self.abort_on == Some(register) {
            return SdoResponse::abort(index, sub, AbortCode::GeneralError as u32);
        }
        match req {
            SdoRequest::InitiateUpload { .. } => {
                let value = self.register(register).to_le_bytes();
                match SdoResponse::expedited_upload(index, sub, &value[..register.size()]) {
                    Ok(resp) => resp,
                    Err(_) => SdoResponse::abort(index, sub, AbortCode::GeneralError as u32),
                }
            }
            SdoRequest::InitiateDownload { len, data, .. } => {
                let mut buf = [0u8; 4];
                buf[..len as usize].copy_from_slice(&data[..len as usize]);
                let value = i32::from_le_bytes(buf);
                self.write(register, value, now_ms);
                SdoResponse::download_acknowledge(index, sub)
            }
        }
    }

    fn write(&mut self, register: Register, value: i32, _now_ms: u64) {
        self.registers.insert(register, value);
        match register {
            Register::ElectronicGearMolecules => {
                let value = value as u32;
                self.key_stage = match (self.key_stage, value) {
                    (_, values::ZERO_INIT_KEY_FIRST) => 1,
                    (1, values::ZERO_INIT_KEY_SECOND) => {
                        self.set_position(0);
                        0
                    }
                    _ => 0,
                };
            }
            Register::Controlword => self.set_setpoint_acknowledge(value as u16),
            Register::TargetPosition => {
                let reached = !self.stall && value == self.position();
                self.set_target_reached(reached);
            }
            _ => (),
        }
    }

    fn handle_rpdo(&mut self, pdo: Rpdo1, now_ms: u64) {
        self.registers
            .insert(Register::Controlword, pdo.controlword as i32);
        self.registers
            .insert(Register::ModesOfOperation, pdo.mode as i32);
        self.registers
            .insert(Register::TargetPosition, pdo.target_position);
        self.set_setpoint_acknowledge(pdo.controlword);
        if pdo.controlword & controlword::NEW_SETPOINT == 0
            || pdo.controlword & controlword::ENABLE_OPERATION == 0
        {
            return;
        }
        let from = self.position();
        self.motion = Some(ActiveMove {
            start_ms: now_ms,
            duration_ms: self.move_duration_ms(pdo.target_position.wrapping_sub(from)),
            from,
            to: pdo.target_position,
        });
        self.set_target_reached(false);
    }

    /// Advance time, pushing any produced frames into `out`
    pub fn process(&mut self, now_ms: u64, out: &mut Vec<CanMessage>) {
        let node = self.node.raw() as u16;
        if self.heartbeat
            && self
                .last_heartbeat_ms
                .map_or(true, |t| now_ms.saturating_sub(t) >= HEARTBEAT_PERIOD_MS)
        {
            self.last_heartbeat_ms = Some(now_ms);
            out.push(
                Heartbeat {
                    node: self.node,
                    state: HeartbeatState::Operational,
                }
                .into(),
            );
        }

        let Some(m) = self.motion else {
            return;
        };
        if self.stall {
            return;
        }
        let elapsed = now_ms.saturating_sub(m.start_ms);
        if elapsed >= m.duration_ms {
            self.motion = None;
            self.set_position(m.to);
            self.set_target_reached(true);
        } else {
            let fraction = elapsed as f64 / m.duration_ms as f64;
            let pos = m.from as f64 + (m.to as f64 - m.from as f64) * fraction;
            self.set_position(pos as i32);
        }
        if self.tpdo {
            let pdo = Tpdo1 {
                statusword: self.register(Register::Statusword) as u16,
                position: self.position(),
            };
            out.push(pdo.to_can_message(CanId::Std(cob::TPDO1_BASE + node)));
        }
    }
}
