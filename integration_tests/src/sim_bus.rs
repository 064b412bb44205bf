//! An in-memory bus connecting the controller to a set of simulated drives
//!
//! Frames sent by the controller are delivered to every drive synchronously; frames produced by
//! the drives are queued for the controller's receiver. The bus also keeps a log of every frame
//! the controller sent, for asserting on traffic.
use std::{
    cell::{RefCell, RefMut},
    collections::VecDeque,
    rc::Rc,
};

use axisbus_common::{
    traits::{CanReceiver, CanSendError, CanSender},
    CanMessage,
};

use crate::sim_drive::SimDrive;

type SharedDrives = Rc<RefCell<Vec<SimDrive>>>;
type SharedQueue = Rc<RefCell<VecDeque<CanMessage>>>;

/// The controller side transmitter
#[derive(Debug)]
pub struct SimBusSender {
    drives: SharedDrives,
    inbox: SharedQueue,
    log: Rc<RefCell<Vec<CanMessage>>>,
    now_ms: Rc<RefCell<u64>>,
    connected: Rc<RefCell<bool>>,
}

impl CanSender for SimBusSender {
    fn send(&mut self, msg: CanMessage) -> Result<(), CanSendError> {
        if !*self.connected.borrow() {
            return Err(CanSendError(msg));
        }
        self.log.borrow_mut().push(msg);
        let now_ms = *self.now_ms.borrow();
        let mut responses = Vec::new();
        for drive in self.drives.borrow_mut().iter_mut() {
            drive.handle_message(&msg, now_ms, &mut responses);
        }
        self.inbox.borrow_mut().extend(responses);
        Ok(())
    }
}

/// The controller side receiver
#[derive(Debug)]
pub struct SimBusReceiver {
    inbox: SharedQueue,
}

impl CanReceiver for SimBusReceiver {
    fn try_recv(&mut self) -> Option<CanMessage> {
        self.inbox.borrow_mut().pop_front()
    }
}

/// A simulated bus with some drives on it
#[derive(Debug)]
pub struct SimBus {
    drives: SharedDrives,
    inbox: SharedQueue,
    log: Rc<RefCell<Vec<CanMessage>>>,
    now_ms: Rc<RefCell<u64>>,
    connected: Rc<RefCell<bool>>,
}

impl SimBus {
    /// Create a bus with the given drives
    pub fn new(drives: Vec<SimDrive>) -> Self {
        Self {
            drives: Rc::new(RefCell::new(drives)),
            inbox: Rc::new(RefCell::new(VecDeque::new())),
            log: Rc::new(RefCell::new(Vec::new())),
            now_ms: Rc::new(RefCell::new(0)),
            connected: Rc::new(RefCell::new(true)),
        }
    }

    /// Create the controller's end of the bus
    pub fn controller_pair(&self) -> (SimBusSender, SimBusReceiver) {
        let sender = SimBusSender {
            drives: self.drives.clone(),
            inbox: self.inbox.clone(),
            log: self.log.clone(),
            now_ms: self.now_ms.clone(),
            connected: self.connected.clone(),
        };
        let receiver = SimBusReceiver {
            inbox: self.inbox.clone(),
        };
        (sender, receiver)
    }

    /// Advance the drives to `now_ms`
    pub fn process(&self, now_ms: u64) {
        *self.now_ms.borrow_mut() = now_ms;
        let mut produced = Vec::new();
        for drive in self.drives.borrow_mut().iter_mut() {
            drive.process(now_ms, &mut produced);
        }
        self.inbox.borrow_mut().extend(produced);
    }

    /// Accessor to allow tests to access drives while they are owned by the bus
    pub fn drive(&self, index: usize) -> RefMut<'_, SimDrive> {
        RefMut::map(self.drives.borrow_mut(), |d| &mut d[index])
    }

    /// When false, every send fails
    pub fn set_connected(&self, connected: bool) {
        *self.connected.borrow_mut() = connected;
    }

    /// Take the log of frames sent by the controller
    pub fn take_log(&self) -> Vec<CanMessage> {
        std::mem::take(&mut *self.log.borrow_mut())
    }
}
