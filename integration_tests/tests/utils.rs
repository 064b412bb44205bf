#![allow(dead_code)]
use axisbus_common::{sdo::SdoRequest, CanId, CanMessage};
use axisbus_controller::{
    config::ControllerConfig, Calibration, MotionCoordinator, Reply,
};
use integration_tests::{
    sim_bus::{SimBus, SimBusReceiver, SimBusSender},
    sim_drive::SimDrive,
};

/// Simulation step
pub const STEP_MS: u64 = 10;

/// 100 steps per output revolution of 360 units, so 1 step is 3.6 units
pub fn calibration() -> Calibration {
    Calibration {
        steps_per_motor_rev: 100,
        gear_ratio: 1.0,
        units_per_output_rev: 360.0,
    }
}

pub fn config(axes: u8) -> ControllerConfig {
    ControllerConfig {
        axis_count: axes,
        calibration: calibration(),
        ..Default::default()
    }
}

/// A controller wired to simulated drives
pub struct Rig {
    pub bus: SimBus,
    pub coordinator: MotionCoordinator<SimBusSender>,
    pub rx: SimBusReceiver,
    pub now_ms: u64,
}

impl Rig {
    pub fn new(axes: u8) -> Self {
        Self::with_config(config(axes))
    }

    /// A rig whose coordinator has read every drive position
    pub fn with_config(config: ControllerConfig) -> Self {
        let mut rig = Self::unprimed(config);
        rig.coordinator.refresh_all_positions(rig.now_ms).unwrap();
        rig.coordinator.process_rx(&mut rig.rx, rig.now_ms);
        assert!(rig.coordinator.positions_known());
        rig.bus.take_log();
        rig
    }

    /// A rig straight after start, with no position read yet
    pub fn unprimed(config: ControllerConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let drives = (1..=config.axis_count)
            .map(|n| SimDrive::new(n, config.calibration.steps_per_motor_rev))
            .collect();
        let bus = SimBus::new(drives);
        let (tx, rx) = bus.controller_pair();
        let coordinator = MotionCoordinator::start(tx, config, 0).unwrap();
        Self {
            bus,
            coordinator,
            rx,
            now_ms: 0,
        }
    }

    /// Advance the simulation by one step, running the supervision ticks on their schedule
    pub fn step(&mut self) {
        self.now_ms += STEP_MS;
        self.bus.process(self.now_ms);
        self.coordinator.process_rx(&mut self.rx, self.now_ms);
        if self.now_ms % 100 == 0 {
            self.coordinator.tick_100(self.now_ms);
        }
        if self.now_ms % 500 == 0 {
            self.coordinator.tick_500(self.now_ms);
        }
    }

    /// Run for a fixed time
    pub fn run_for(&mut self, duration_ms: u64) {
        let end = self.now_ms + duration_ms;
        while self.now_ms < end {
            self.step();
        }
    }

    /// Step until a reply is queued, or panic after `limit_ms`
    pub fn run_until_reply(&mut self, limit_ms: u64) -> Reply {
        let end = self.now_ms + limit_ms;
        loop {
            if let Some(reply) = self.coordinator.pop_reply() {
                return reply;
            }
            if self.now_ms >= end {
                panic!("No reply within {limit_ms} ms");
            }
            self.step();
        }
    }
}

/// Decode the SDO requests in a frame log, with the node each was addressed to
pub fn sdo_requests(log: &[CanMessage]) -> Vec<(u8, SdoRequest)> {
    log.iter()
        .filter_map(|msg| match msg.id() {
            CanId::Std(id) if (0x601..0x680).contains(&id) => {
                let req = SdoRequest::try_from(msg.data()).ok()?;
                Some(((id - 0x600) as u8, req))
            }
            _ => None,
        })
        .collect()
}
