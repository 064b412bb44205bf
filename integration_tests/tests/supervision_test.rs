use axisbus_common::{NodeId, Register};
use axisbus_controller::{AxisStatus, InitStatus, MoveCommand, MoveKind};

mod utils;
use utils::{sdo_requests, Rig};

fn node(id: u8) -> NodeId {
    NodeId::new(id).unwrap()
}

#[test]
fn test_status_report() {
    let mut rig = Rig::new(3);
    rig.coordinator
        .start_zero_initialization_single_axis(1, rig.now_ms)
        .unwrap();
    rig.run_until_reply(1000);
    rig.bus.drive(2).heartbeat = false;
    rig.run_for(1000);

    rig.coordinator.request_status();
    assert_eq!(
        "RMS OK 1:1,3; 2:1,0; 3:0,0",
        rig.coordinator.pop_reply().unwrap().to_string()
    );
}

#[test]
fn test_heartbeat_loss_during_move() {
    let mut rig = Rig::new(2);
    let cmd = MoveCommand {
        kind: MoveKind::Absolute,
        movement_units: vec![720.0, 720.0],
        speed: 360.0,
        acceleration: 720.0,
    };
    rig.coordinator.move_axes(cmd, rig.now_ms).unwrap();
    rig.run_for(200);
    {
        let mut drive = rig.bus.drive(1);
        drive.heartbeat = false;
        drive.stall = true;
    }

    assert_eq!("MAJ PF 1 |2 ", rig.run_until_reply(4000).to_string());
    let axis = rig.coordinator.axis(node(2)).unwrap();
    assert!(!axis.is_alive());
    assert_eq!(AxisStatus::Failed, axis.status());
    assert_eq!(
        AxisStatus::Operational,
        rig.coordinator.axis(node(1)).unwrap().status()
    );
}

#[test]
fn test_heartbeat_recovery() {
    let mut rig = Rig::new(2);
    rig.bus.drive(0).heartbeat = false;
    rig.run_for(1000);
    assert!(!rig.coordinator.axis(node(1)).unwrap().is_alive());

    // A dead axis fails immediately and generates no traffic
    rig.bus.take_log();
    rig.coordinator.start_zero_initialization_all_axes(rig.now_ms).unwrap();
    assert_eq!("ZEI PF 2 |1 ", rig.run_until_reply(1000).to_string());
    assert!(sdo_requests(&rig.bus.take_log())
        .iter()
        .all(|(n, _)| *n != 1));

    rig.bus.drive(0).heartbeat = true;
    rig.run_for(600);
    let axis = rig.coordinator.axis(node(1)).unwrap();
    assert!(axis.is_alive());
    assert_eq!(AxisStatus::Operational, axis.status());

    rig.coordinator
        .start_zero_initialization_single_axis(1, rig.now_ms)
        .unwrap();
    assert_eq!("ZEI OK 1", rig.run_until_reply(1000).to_string());
    assert_eq!(
        InitStatus::Finished,
        rig.coordinator.axis(node(1)).unwrap().init_status()
    );
}

#[test]
fn test_position_mirror_refresh() {
    let mut rig = Rig::new(2);
    rig.bus.drive(1).set_position(-321);
    rig.run_for(520);
    assert_eq!(
        Some(-321),
        rig.coordinator.axis(node(2)).unwrap().current_position_in_steps()
    );

    // Reads are rate limited to the refresh interval
    rig.bus.take_log();
    rig.run_for(1000);
    let reads = sdo_requests(&rig.bus.take_log())
        .iter()
        .filter(|(n, req)| *n == 2 && req.object().0 == Register::PositionActualValue.index())
        .count();
    assert_eq!(2, reads);
}

#[test]
fn test_silent_drive_does_not_block_refresh() {
    let mut rig = Rig::new(1);
    rig.bus.drive(0).respond = false;
    rig.run_for(3000);
    // One read per refresh interval, each expiring before the next
    let reads = sdo_requests(&rig.bus.take_log()).len();
    assert!((3..=6).contains(&reads), "{reads} reads");
    assert!(rig.coordinator.axis(node(1)).unwrap().is_alive());
}
