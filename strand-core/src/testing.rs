//! Recording transport used by unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::comm::{Address, Comm, Message};
use crate::{Result, Worker, WorkerConfig};

/// Shared view of a test transport's traffic.
#[derive(Clone, Default)]
pub(crate) struct Wire {
    sent: Arc<Mutex<Vec<(Address, Message)>>>,
    incoming: Arc<Mutex<VecDeque<Message>>>,
}

impl Wire {
    pub(crate) fn take_sent(&self) -> Vec<(Address, Message)> {
        self.sent.lock().unwrap().drain(..).collect()
    }

    pub(crate) fn push_incoming(&self, msg: Message) {
        self.incoming.lock().unwrap().push_back(msg);
    }
}

pub(crate) struct TestComm {
    addr: Address,
    remotes: Vec<Address>,
    wire: Wire,
}

impl Comm for TestComm {
    fn address(&self) -> Address {
        self.addr
    }

    fn remote_endpoints(&self) -> Vec<Address> {
        self.remotes.clone()
    }

    fn send(&mut self, dest: &Address, msg: Message) -> Result<()> {
        self.wire.sent.lock().unwrap().push((*dest, msg));
        Ok(())
    }

    fn recv(&mut self) -> Result<Option<Message>> {
        Ok(self.wire.incoming.lock().unwrap().pop_front())
    }
}

pub(crate) fn test_comm_at(id: u32, remotes: &[u32]) -> (TestComm, Wire) {
    let wire = Wire::default();
    let comm = TestComm {
        addr: Address::new(id),
        remotes: remotes.iter().map(|r| Address::new(*r)).collect(),
        wire: wire.clone(),
    };
    (comm, wire)
}

/// Transport at address 0, with a single remote endpoint at address 1.
pub(crate) fn test_comm() -> (TestComm, Wire) {
    test_comm_at(0, &[1])
}

pub(crate) fn test_worker_at(id: u32, remotes: &[u32]) -> (Worker, Wire) {
    let (comm, wire) = test_comm_at(id, remotes);
    let config = WorkerConfig {
        seed: Some(id as u64),
        ..WorkerConfig::default()
    };
    (Worker::new(Box::new(comm), config), wire)
}

pub(crate) fn test_worker_with_wire() -> (Worker, Wire) {
    test_worker_at(0, &[1])
}

pub(crate) fn test_worker() -> Worker {
    test_worker_with_wire().0
}
