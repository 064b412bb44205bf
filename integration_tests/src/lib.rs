//! Simulated drives and bus for exercising the controller without hardware
pub mod sim_bus;
pub mod sim_drive;
