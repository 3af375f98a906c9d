//! In-process transport.
//!
//! Workers living on different threads of the same process exchange messages
//! through a set of unbounded channels, one queue per worker.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use strand_core::{Address, Comm, Message, MessageKind, Value};

use crate::encoding::{pack, unpack, Encoding};
use crate::error::{Error, Result};

enum Frame {
    Message(Message),
    Bytes(Vec<u8>),
}

/// Queues shared by all the workers of a local cluster.
#[derive(Clone)]
pub struct LocalQueues {
    senders: Vec<Sender<Frame>>,
    receivers: Vec<Receiver<Frame>>,
}

impl LocalQueues {
    pub fn new(n: usize) -> Self {
        let (senders, receivers) = (0..n).map(|_| unbounded()).unzip();
        LocalQueues { senders, receivers }
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// Asks the worker at `dest` to stop, without going through a worker.
    pub fn request_shutdown(&self, dest: Address) -> Result<()> {
        let sender = self.senders.get(dest.id as usize).ok_or_else(|| {
            Error::InvalidConfig(format!("no endpoint at {}", dest))
        })?;
        sender
            .send(Frame::Message(Message::new(MessageKind::Shutdown, Value::unit())))
            .map_err(|_| {
                Error::from(strand_core::Error::Disconnected(format!(
                    "queue of {} closed",
                    dest
                )))
            })
    }
}

/// Endpoint of a single worker on top of [`LocalQueues`].
///
/// With an encoding set, every outgoing message is encoded into bytes and
/// decoded again on the receiving side. Workers then only ever see values
/// that went through serialization, same as they would when talking over a
/// network.
pub struct LocalComm {
    addr: Address,
    queues: LocalQueues,
    encoding: Option<Encoding>,
}

impl LocalComm {
    pub fn new(queues: LocalQueues, index: usize, encoding: Option<Encoding>) -> Result<Self> {
        if index >= queues.len() {
            return Err(Error::InvalidConfig(format!(
                "endpoint index {} out of range, only {} queues available",
                index,
                queues.len()
            )));
        }
        if let Some(e) = encoding {
            if !e.is_available() {
                return Err(Error::EncodingUnavailable(e));
            }
        }
        Ok(LocalComm {
            addr: Address::new(index as u32),
            queues,
            encoding,
        })
    }

    fn decode(&self, frame: Frame) -> Result<Message> {
        match (frame, &self.encoding) {
            (Frame::Message(msg), _) => Ok(msg),
            (Frame::Bytes(bytes), Some(encoding)) => unpack(&bytes, encoding),
            (Frame::Bytes(bytes), None) => Ok(Message::from_bytes(&bytes)?),
        }
    }
}

impl Comm for LocalComm {
    fn address(&self) -> Address {
        self.addr
    }

    fn remote_endpoints(&self) -> Vec<Address> {
        (0..self.queues.len() as u32)
            .map(Address::new)
            .filter(|a| *a != self.addr)
            .collect()
    }

    fn send(&mut self, dest: &Address, msg: Message) -> strand_core::Result<()> {
        let sender = self
            .queues
            .senders
            .get(dest.id as usize)
            .ok_or_else(|| strand_core::Error::Disconnected(format!("no endpoint at {}", dest)))?;
        let frame = match &self.encoding {
            Some(encoding) => Frame::Bytes(pack(&msg, encoding)?),
            None => Frame::Message(msg),
        };
        sender
            .send(frame)
            .map_err(|_| strand_core::Error::Disconnected(format!("queue of {} closed", dest)))
    }

    fn recv(&mut self) -> strand_core::Result<Option<Message>> {
        let receiver = &self.queues.receivers[self.addr.id as usize];
        match receiver.try_recv() {
            Ok(frame) => Ok(Some(self.decode(frame)?)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(strand_core::Error::Disconnected(format!(
                "queue of {} closed",
                self.addr
            ))),
        }
    }
}
