//! Transport abstraction and message framing.

use std::fmt;

use rand::seq::SliceRandom;
use rand::RngCore;
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::{Result, Value};

/// Address of a single worker within a cluster.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address {
    pub id: u32,
}

impl Address {
    pub fn new(id: u32) -> Self {
        Address { id }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.id)
    }
}

/// Enumerates all kinds of messages exchanged between workers.
///
/// Payload carried by each kind:
///
/// | kind            | payload                       |
/// |-----------------|-------------------------------|
/// | `Task`          | `Closure`                     |
/// | `Steal`         | `Address` of the thief        |
/// | `StealResponse` | `Vec<Closure>`                |
/// | `Fulfill`       | `(IVarId, Vec<Value>)`        |
/// | `AddTrigger`    | `(IVarId, Closure)`           |
/// | `DecRef`        | `(IVarId, RefToken)`          |
/// | `Introduce`     | `(Address, Vec<Address>)`     |
/// | `Shutdown`      | `()`                          |
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum MessageKind {
    Task = 0,
    Steal = 1,
    StealResponse = 2,
    Fulfill = 3,
    AddTrigger = 4,
    DecRef = 5,
    Introduce = 6,
    Shutdown = 7,
}

/// Single message: an integer kind tag followed by the payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: Value,
}

impl Message {
    pub fn new(kind: MessageKind, payload: Value) -> Self {
        Message { kind, payload }
    }

    /// Serialize into bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Message> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Capabilities required from a transport.
///
/// Delivery between any ordered pair of workers is expected to preserve
/// order. Nothing else is assumed.
pub trait Comm: Send {
    /// Address of the local endpoint.
    fn address(&self) -> Address;

    /// Addresses of all other endpoints reachable through this transport.
    fn remote_endpoints(&self) -> Vec<Address>;

    fn send(&mut self, dest: &Address, msg: Message) -> Result<()>;

    /// Returns the next incoming message, if any. Never blocks.
    fn recv(&mut self) -> Result<Option<Message>>;

    /// Sends the message to one remote endpoint chosen uniformly at random.
    ///
    /// Returns `false` if there are no remote endpoints.
    fn send_random(&mut self, rng: &mut dyn RngCore, msg: Message) -> Result<bool> {
        let remotes = self.remote_endpoints();
        match remotes.choose(rng) {
            Some(dest) => {
                self.send(dest, msg)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
