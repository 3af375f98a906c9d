//! Single-assignment distributed futures.
//!
//! An ivar is owned by the worker that created it. The owner keeps the
//! fulfilled values, the triggers waiting for them and the reference count
//! deciding when all of that can be released. Other workers only hold
//! [`IVarRef`]s and forward their operations to the owner, see
//! [`Worker`](../worker/struct.Worker.html).

use std::fmt;

use fnv::FnvHashMap;

use crate::comm::Address;
use crate::refcount::{RefCount, RefToken};
use crate::{Closure, Value};

/// Cluster-wide identifier of an ivar.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IVarId {
    pub owner: Address,
    pub seq: u64,
}

impl fmt::Display for IVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.seq)
    }
}

/// Counted reference to an ivar.
///
/// Cloning derives a new reference token from this one. Every reference,
/// including clones, has to be given back with `Worker::dec_ref` exactly
/// once, otherwise the ivar is never released. Moving a reference to another
/// worker, inside a closure or a value, moves the obligation with it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IVarRef {
    id: IVarId,
    token: RefToken,
}

impl IVarRef {
    pub fn id(&self) -> IVarId {
        self.id
    }

    pub(crate) fn into_parts(self) -> (IVarId, RefToken) {
        (self.id, self.token)
    }
}

struct IVarData {
    vals: Option<Vec<Value>>,
    triggers: Vec<Closure>,
    refs: RefCount,
}

/// Bookkeeping for all the ivars owned by a single worker, along with the
/// ring of known peers.
pub struct IVarTracker {
    addr: Address,
    next_seq: u64,
    owned: FnvHashMap<IVarId, IVarData>,
    ring: Vec<Address>,
}

impl IVarTracker {
    pub fn new(addr: Address) -> Self {
        IVarTracker {
            addr,
            next_seq: 0,
            owned: FnvHashMap::default(),
            ring: Vec::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    /// Creates a new ivar owned by this tracker, returning the first
    /// reference to it.
    pub fn create(&mut self) -> IVarRef {
        let id = IVarId {
            owner: self.addr,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        let (refs, token) = RefCount::new(id.seq);
        self.owned.insert(
            id,
            IVarData {
                vals: None,
                triggers: Vec::new(),
                refs,
            },
        );
        IVarRef { id, token }
    }

    pub fn is_owner(&self, id: &IVarId) -> bool {
        id.owner == self.addr
    }

    /// Adds a peer to the ring. Returns `false` if it was already known.
    pub fn introduce(&mut self, addr: Address) -> bool {
        if addr == self.addr || self.ring.contains(&addr) {
            return false;
        }
        self.ring.push(addr);
        self.ring.sort();
        true
    }

    /// Known peers, not including this worker.
    pub fn ring_members(&self) -> &[Address] {
        &self.ring
    }

    fn data_mut(&mut self, id: &IVarId) -> &mut IVarData {
        let addr = self.addr;
        match self.owned.get_mut(id) {
            Some(data) => data,
            None => panic!("ivar {} is not live on {}", id, addr),
        }
    }

    /// Sets the values of an owned ivar.
    ///
    /// Returns the triggers that were waiting for it, in registration order,
    /// each paired with its own copy of the values.
    ///
    /// # Panics
    ///
    /// Panics if the ivar was already fulfilled or is not live here.
    pub fn fulfill(&mut self, id: IVarId, vals: Vec<Value>) -> Vec<(Closure, Vec<Value>)> {
        let data = self.data_mut(&id);
        assert!(data.vals.is_none(), "ivar {} fulfilled twice", id);
        let triggers = std::mem::replace(&mut data.triggers, Vec::new());
        let fired = triggers
            .into_iter()
            .map(|t| (t, vals.clone()))
            .collect::<Vec<_>>();
        data.vals = Some(vals);
        fired
    }

    /// Registers a trigger on an owned ivar.
    ///
    /// If the ivar is already fulfilled the trigger is handed back together
    /// with a copy of the values, to be fired right away.
    pub fn add_trigger(&mut self, id: IVarId, trigger: Closure) -> Option<(Closure, Vec<Value>)> {
        let data = self.data_mut(&id);
        match &data.vals {
            Some(vals) => Some((trigger, vals.clone())),
            None => {
                data.triggers.push(trigger);
                None
            }
        }
    }

    /// Retires a reference token of an owned ivar. Returns `true` if that
    /// was the last one and the ivar got released.
    pub fn dec_ref(&mut self, id: IVarId, token: RefToken) -> bool {
        let data = self.data_mut(&id);
        data.refs.retire(token);
        if data.refs.is_dead() {
            if !data.triggers.is_empty() {
                warn!(
                    "ivar {} released with {} triggers that never fired",
                    id,
                    data.triggers.len()
                );
            }
            self.owned.remove(&id);
            return true;
        }
        false
    }

    /// Checks whether the ivar is fulfilled and its values live here. Always
    /// `false` for ivars owned elsewhere.
    pub fn is_fulfilled_here(&self, id: &IVarId) -> bool {
        self.owned
            .get(id)
            .map(|data| data.vals.is_some())
            .unwrap_or(false)
    }

    pub fn get_vals(&self, id: &IVarId) -> Option<&[Value]> {
        self.owned.get(id).and_then(|data| data.vals.as_deref())
    }

    /// Number of live ivars owned here.
    pub fn n_owned(&self) -> usize {
        self.owned.len()
    }

    /// Number of triggers waiting across all owned ivars.
    pub fn n_triggers_here(&self) -> usize {
        self.owned.values().map(|d| d.triggers.len()).sum()
    }

    /// Number of fulfilled values held across all owned ivars.
    pub fn n_vals_here(&self) -> usize {
        self.owned
            .values()
            .filter_map(|d| d.vals.as_ref())
            .map(|v| v.len())
            .sum()
    }
}
