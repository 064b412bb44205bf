//! Command-line utilities for axisbus
//!
//! Tools for driving a set of stepper axes via a socketcan interface on linux.
//!
//! # axisbus
//!
//! Runs a single command against the configured axes, prints the reply line, and exits.
//!
//! Usage examples:
//!
//! - `axisbus can0 zei`
//! - `axisbus can0 zei --node 2`
//! - `axisbus -c axes.toml can0 move --kind rel --speed 90 --accel 180 -- 45 -10 0`
//! - `axisbus can0 status`
//!
//! # axisbusdump
//!
//! Monitors a bus and prints each frame, decoding heartbeats, SDO responses and TPDO1 from the
//! drives.
//!
//! Usage example: `axisbusdump can0`

pub mod command;
