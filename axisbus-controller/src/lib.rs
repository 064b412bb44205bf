//! Coordination of multiple CANopen stepper drives
//!
//! The crate drives a fixed set of axes (nodes 1..=N) over a single CAN link:
//!
//! - [Zero initialization](MotionCoordinator::start_zero_initialization_all_axes) of one or all
//!   drives, via a short SDO write sequence and an optional reference move
//! - [Synchronized moves](MotionCoordinator::move_axes), where every axis gets a trapezoidal
//!   profile scaled so that all axes finish together
//! - Liveness tracking from heartbeats, and a mirror of each drive's position and status
//!
//! The [`MotionCoordinator`] does no I/O scheduling of its own. The host passes in received frames
//! and calls the supervision ticks; replies to completed commands are queued and retrieved with
//! [`MotionCoordinator::pop_reply`].
#![warn(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod axis;
pub mod config;
mod coordinator;
pub mod dispatch;
pub mod funnel;
pub mod profile;
pub mod reply;
pub mod sequence;
pub use axisbus_common as common;

pub use axis::{Axis, AxisStatus, Calibration, InitStatus};
pub use config::{ConfigError, ControllerConfig};
pub use coordinator::{CoordinatorError, MotionCoordinator};
pub use funnel::CommandStatus;
pub use profile::{MoveCommand, MoveKind};
pub use reply::Reply;
