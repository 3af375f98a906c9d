//! Worker facade driving a single scheduler.

use std::collections::BTreeSet;
use std::time::Duration;

use fnv::FnvHashMap;

use crate::comm::{Address, Comm, Message, MessageKind};
use crate::ivar::{IVarId, IVarRef, IVarTracker};
use crate::refcount::RefToken;
use crate::task::{Loc, Stats, TaskCollection};
use crate::{Closure, Error, Result, Value, WorkerConfig};

/// Function handling the payload of one kind of incoming message.
pub type Handler = fn(&mut Worker, Value) -> Result<()>;

/// Single worker of a cluster.
///
/// Owns the task collection, the ivar tracker and the transport endpoint.
/// A worker is driven by a single thread, which calls [`Worker::run`] or
/// repeatedly [`Worker::one_step`]. Every task and trigger gets a mutable
/// reference to the worker it runs on, which is how it can submit more work
/// or interact with ivars.
pub struct Worker {
    comm: Box<dyn Comm>,
    tasks: TaskCollection,
    ivars: IVarTracker,
    handlers: FnvHashMap<MessageKind, Handler>,
    config: WorkerConfig,
    stopped: bool,
}

impl Worker {
    /// Creates a new worker on top of the given transport endpoint, with
    /// handlers for all the protocol messages installed.
    pub fn new(comm: Box<dyn Comm>, config: WorkerConfig) -> Self {
        let addr = comm.address();
        let mut worker = Worker {
            comm,
            tasks: TaskCollection::new(&config),
            ivars: IVarTracker::new(addr),
            handlers: FnvHashMap::default(),
            config,
            stopped: false,
        };
        worker.add_handler(MessageKind::Task, handle_task);
        worker.add_handler(MessageKind::Steal, handle_steal);
        worker.add_handler(MessageKind::StealResponse, handle_steal_response);
        worker.add_handler(MessageKind::Fulfill, handle_fulfill);
        worker.add_handler(MessageKind::AddTrigger, handle_add_trigger);
        worker.add_handler(MessageKind::DecRef, handle_dec_ref);
        worker.add_handler(MessageKind::Introduce, handle_introduce);
        worker.add_handler(MessageKind::Shutdown, handle_shutdown);
        worker
    }

    /// Installs a handler for the given message kind, replacing the
    /// previous one.
    pub fn add_handler(&mut self, kind: MessageKind, handler: Handler) {
        self.handlers.insert(kind, handler);
    }

    pub fn address(&self) -> Address {
        self.comm.address()
    }

    /// Number of workers in the cluster, including this one.
    pub fn n_workers(&self) -> usize {
        self.comm.remote_endpoints().len() + 1
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn tasks(&self) -> &TaskCollection {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut TaskCollection {
        &mut self.tasks
    }

    pub fn ivars(&self) -> &IVarTracker {
        &self.ivars
    }

    pub fn stats(&self) -> &Stats {
        self.tasks.stats()
    }

    fn send(&mut self, dest: Address, kind: MessageKind, payload: Value) -> Result<()> {
        trace!("{} -> {}: {:?}", self.address(), dest, kind);
        self.comm.send(&dest, Message::new(kind, payload))
    }

    /// Submits a task to run at the given location.
    pub fn submit(&mut self, loc: Loc, task: Closure) -> Result<()> {
        self.tasks.add_task_at(&mut *self.comm, loc, task)
    }

    /// Runs the most recently submitted task, returning its output.
    ///
    /// # Panics
    ///
    /// Panics if there are no tasks queued.
    pub fn run_next(&mut self) -> Value {
        let task = self.tasks.take_next();
        let out = task.call(self);
        self.tasks.task_finished();
        out
    }

    /// Creates a new ivar owned by this worker.
    pub fn new_ivar(&mut self) -> IVarRef {
        self.ivars.create()
    }

    /// Fulfills the ivar with the given values, firing its triggers.
    ///
    /// Triggers of ivars owned by this worker fire synchronously, within
    /// this call. Ivars owned elsewhere are fulfilled by their owner once
    /// the request arrives there.
    ///
    /// Every trigger, and every [`get_vals`](Worker::get_vals) caller, gets
    /// its own copy of the values. Copying an [`IVarRef`] derives a new
    /// reference, so when the values hold `IVarRef`s each receiver of a copy
    /// takes over the duty of giving those references back with
    /// [`dec_ref`](Worker::dec_ref). The references stored in the ivar
    /// itself are never given back, which keeps the ivars they point to
    /// alive for good.
    pub fn fulfill(&mut self, ivar: &IVarRef, vals: Vec<Value>) -> Result<()> {
        let id = ivar.id();
        if self.ivars.is_owner(&id) {
            self.fulfill_owned(id, vals);
            Ok(())
        } else {
            self.send(id.owner, MessageKind::Fulfill, Value::new((id, vals)))
        }
    }

    /// Registers a trigger to be fired with the values of the ivar.
    ///
    /// The trigger is called with a single argument holding `Vec<Value>`.
    /// If the ivar is owned here and already fulfilled, the trigger fires
    /// immediately, before this call returns.
    pub fn add_trigger(&mut self, ivar: &IVarRef, trigger: Closure) -> Result<()> {
        let id = ivar.id();
        if self.ivars.is_owner(&id) {
            self.add_trigger_owned(id, trigger);
            Ok(())
        } else {
            self.send(id.owner, MessageKind::AddTrigger, Value::new((id, trigger)))
        }
    }

    /// Gives back a reference to an ivar.
    pub fn dec_ref(&mut self, ivar: IVarRef) -> Result<()> {
        let (id, token) = ivar.into_parts();
        if self.ivars.is_owner(&id) {
            self.dec_ref_owned(id, token);
            Ok(())
        } else {
            self.send(id.owner, MessageKind::DecRef, Value::new((id, token)))
        }
    }

    pub fn is_fulfilled_here(&self, ivar: &IVarRef) -> bool {
        self.ivars.is_fulfilled_here(&ivar.id())
    }

    /// Returns copies of the ivar's values, if they are present here.
    ///
    /// `IVarRef`s inside the copies are new references owned by the caller,
    /// see [`fulfill`](Worker::fulfill).
    pub fn get_vals(&self, ivar: &IVarRef) -> Option<Vec<Value>> {
        self.ivars.get_vals(&ivar.id()).map(|v| v.to_vec())
    }

    fn fulfill_owned(&mut self, id: IVarId, vals: Vec<Value>) {
        let fired = self.ivars.fulfill(id, vals);
        trace!("fulfilled ivar {}, firing {} triggers", id, fired.len());
        for (trigger, vals) in fired {
            trigger.call_with(self, Value::new(vals));
        }
    }

    fn add_trigger_owned(&mut self, id: IVarId, trigger: Closure) {
        if let Some((trigger, vals)) = self.ivars.add_trigger(id, trigger) {
            trigger.call_with(self, Value::new(vals));
        }
    }

    fn dec_ref_owned(&mut self, id: IVarId, token: RefToken) {
        if self.ivars.dec_ref(id, token) {
            trace!("released ivar {}", id);
        }
    }

    /// Adds a peer to the ring and tells it about all the peers known here.
    pub fn introduce(&mut self, addr: Address) -> Result<()> {
        self.ivars.introduce(addr);
        let payload = (self.address(), self.ivars.ring_members().to_vec());
        self.send(addr, MessageKind::Introduce, Value::new(payload))
    }

    /// Passes the message to the handler registered for its kind.
    pub fn dispatch(&mut self, msg: Message) -> Result<()> {
        let handler = *self
            .handlers
            .get(&msg.kind)
            .ok_or(Error::NoHandler(msg.kind))?;
        handler(self, msg.payload)
    }

    /// Handles all pending messages, then runs a single task. If there are
    /// no tasks, tries stealing some instead and idles for a while.
    pub fn one_step(&mut self) -> Result<()> {
        while let Some(msg) = self.comm.recv()? {
            self.dispatch(msg)?;
        }
        if self.stopped {
            return Ok(());
        }
        if !self.tasks.is_empty() {
            self.run_next();
        } else {
            self.tasks
                .steal(&mut *self.comm, self.ivars.ring_members())?;
            if self.config.idle_sleep_us > 0 {
                std::thread::sleep(Duration::from_micros(self.config.idle_sleep_us));
            } else {
                std::thread::yield_now();
            }
        }
        Ok(())
    }

    /// Keeps processing messages and tasks until stopped.
    pub fn run(&mut self) -> Result<()> {
        debug!("worker {} running", self.address());
        while !self.stopped {
            self.one_step()?;
        }
        debug!(
            "worker {} stopped: {:?}, {} ivars still owned",
            self.address(),
            self.stats(),
            self.ivars.n_owned()
        );
        Ok(())
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Tells every known worker to stop, then stops this one.
    pub fn shutdown(&mut self) -> Result<()> {
        let mut targets = self
            .ivars
            .ring_members()
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>();
        targets.extend(self.comm.remote_endpoints());
        info!("worker {} shutting down {} workers", self.address(), targets.len());
        for dest in targets {
            self.send(dest, MessageKind::Shutdown, Value::unit())?;
        }
        self.stop();
        Ok(())
    }
}

fn handle_task(worker: &mut Worker, payload: Value) -> Result<()> {
    worker.tasks.add_task(payload.into_inner::<Closure>());
    Ok(())
}

fn handle_steal(worker: &mut Worker, payload: Value) -> Result<()> {
    let thief = payload.into_inner::<Address>();
    let stolen = worker.tasks.victimized();
    worker.send(thief, MessageKind::StealResponse, Value::new(stolen))
}

fn handle_steal_response(worker: &mut Worker, payload: Value) -> Result<()> {
    worker.tasks.receive_tasks(payload.into_inner::<Vec<Closure>>());
    Ok(())
}

fn handle_fulfill(worker: &mut Worker, payload: Value) -> Result<()> {
    let (id, vals) = payload.into_inner::<(IVarId, Vec<Value>)>();
    worker.fulfill_owned(id, vals);
    Ok(())
}

fn handle_add_trigger(worker: &mut Worker, payload: Value) -> Result<()> {
    let (id, trigger) = payload.into_inner::<(IVarId, Closure)>();
    worker.add_trigger_owned(id, trigger);
    Ok(())
}

fn handle_dec_ref(worker: &mut Worker, payload: Value) -> Result<()> {
    let (id, token) = payload.into_inner::<(IVarId, RefToken)>();
    worker.dec_ref_owned(id, token);
    Ok(())
}

fn handle_introduce(worker: &mut Worker, payload: Value) -> Result<()> {
    let (from, members) = payload.into_inner::<(Address, Vec<Address>)>();
    let is_new = worker.ivars.introduce(from);
    for member in members {
        worker.ivars.introduce(member);
    }
    if is_new {
        let reply = (worker.address(), worker.ivars.ring_members().to_vec());
        worker.send(from, MessageKind::Introduce, Value::new(reply))?;
    }
    Ok(())
}

fn handle_shutdown(worker: &mut Worker, _: Value) -> Result<()> {
    debug!("worker {} got shutdown request", worker.address());
    worker.stop();
    Ok(())
}
